//! Resource registry for the aural audio graph engine.
//!
//! This crate provides the lookup side of the engine's resource contract:
//! sample buffers and input-stream metadata are registered under numeric ids
//! by the control thread, and resolved by the graph compiler when it builds
//! render nodes. Resolved buffers are shared as `Arc` snapshots — the render
//! thread only ever reads them.
//!
//! # Example
//!
//! ```rust
//! use aural_registry::{ResourceRegistry, SampleBuffer};
//!
//! let mut registry = ResourceRegistry::new();
//! let id = registry.insert_buffer(SampleBuffer::from_mono(vec![0.0, 0.5, 1.0], 48_000.0));
//!
//! let buffer = registry.buffer(id).unwrap();
//! assert_eq!(buffer.frames(), 3);
//! ```
//!
//! Lookups return `Option` — a missing resource is not an error at this
//! layer. The compiler degrades a node with an unresolvable resource to
//! silence instead of failing compilation; [`RegistryError`] exists for
//! front ends (such as the CLI) that want to surface a missing id eagerly.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

/// Identifier for a registered resource (sample buffer or stream).
pub type ResourceId = u64;

/// Error surfaced by front ends that require a resource to exist.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No sample buffer is registered under the given id.
    #[error("no sample buffer registered under id {0}")]
    UnknownBuffer(ResourceId),
    /// No stream is registered under the given id.
    #[error("no stream registered under id {0}")]
    UnknownStream(ResourceId),
}

/// An immutable multi-channel sample buffer.
///
/// Channels are stored planar (one `Vec<f32>` per channel, equal lengths).
/// Once registered, a buffer is never mutated; the registry hands out `Arc`
/// clones so render nodes can hold it without copying.
#[derive(Debug)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: f32,
}

impl SampleBuffer {
    /// Creates a buffer from planar channel data.
    ///
    /// All channels must have the same length; trailing channels are
    /// truncated to the shortest if they do not.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: f32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in &mut channels {
            channel.truncate(frames);
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// Creates a single-channel buffer.
    pub fn from_mono(samples: Vec<f32>, sample_rate: f32) -> Self {
        Self::new(vec![samples], sample_rate)
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Returns the number of frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Returns the buffer's native sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Returns the samples of one channel.
    ///
    /// Returns an empty slice if the channel index is out of range.
    pub fn channel(&self, index: usize) -> &[f32] {
        self.channels.get(index).map_or(&[], Vec::as_slice)
    }
}

/// Metadata describing a registered input stream.
///
/// Device capture itself lives outside the engine; the graph compiler only
/// needs the channel layout and rate to size a stream-source node's output.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Number of channels the stream delivers.
    pub channel_count: usize,
    /// Stream sample rate in Hz.
    pub sample_rate: f32,
    /// Human-readable source label (device name, track title).
    pub label: String,
}

/// Registry of shared resources referenced by graph descriptions.
///
/// Owned and populated by the control thread before (or alongside) the
/// topology update that references a new id. The compiler resolves ids at
/// build time; the render thread never touches the registry.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    buffers: HashMap<ResourceId, Arc<SampleBuffer>>,
    streams: HashMap<ResourceId, StreamInfo>,
    next_id: ResourceId,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sample buffer and returns its id.
    pub fn insert_buffer(&mut self, buffer: SampleBuffer) -> ResourceId {
        let id = self.allocate_id();
        self.buffers.insert(id, Arc::new(buffer));
        id
    }

    /// Registers a sample buffer under a caller-chosen id.
    ///
    /// Replaces any buffer previously registered under that id. Graphs
    /// already compiled keep their old `Arc` snapshot.
    pub fn insert_buffer_with_id(&mut self, id: ResourceId, buffer: SampleBuffer) {
        self.next_id = self.next_id.max(id + 1);
        self.buffers.insert(id, Arc::new(buffer));
    }

    /// Looks up a sample buffer. Returns `None` for unknown ids.
    pub fn buffer(&self, id: ResourceId) -> Option<Arc<SampleBuffer>> {
        self.buffers.get(&id).cloned()
    }

    /// Looks up a sample buffer, surfacing a missing id as an error.
    pub fn require_buffer(&self, id: ResourceId) -> Result<Arc<SampleBuffer>, RegistryError> {
        self.buffer(id).ok_or(RegistryError::UnknownBuffer(id))
    }

    /// Registers stream metadata and returns its id.
    pub fn insert_stream(&mut self, info: StreamInfo) -> ResourceId {
        let id = self.allocate_id();
        self.streams.insert(id, info);
        id
    }

    /// Registers stream metadata under a caller-chosen id.
    pub fn insert_stream_with_id(&mut self, id: ResourceId, info: StreamInfo) {
        self.next_id = self.next_id.max(id + 1);
        self.streams.insert(id, info);
    }

    /// Looks up stream metadata. Returns `None` for unknown ids.
    pub fn stream(&self, id: ResourceId) -> Option<&StreamInfo> {
        self.streams.get(&id)
    }

    /// Looks up stream metadata, surfacing a missing id as an error.
    pub fn require_stream(&self, id: ResourceId) -> Result<&StreamInfo, RegistryError> {
        self.stream(id).ok_or(RegistryError::UnknownStream(id))
    }

    /// Removes a buffer. Existing `Arc` snapshots stay alive.
    pub fn remove_buffer(&mut self, id: ResourceId) -> Option<Arc<SampleBuffer>> {
        self.buffers.remove(&id)
    }

    /// Removes stream metadata.
    pub fn remove_stream(&mut self, id: ResourceId) -> Option<StreamInfo> {
        self.streams.remove(&id)
    }

    /// Number of registered buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of registered streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn allocate_id(&mut self) -> ResourceId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
