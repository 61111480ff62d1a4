//! Multi-channel audio buses.
//!
//! An [`AudioBus`] is a planar block of `f32` samples: one `Vec<f32>` per
//! channel, all the same length. Buses are allocated once (at compile or
//! node-construction time) with a fixed channel *capacity*; the *active*
//! channel count can then change per quantum without reallocating, which is
//! what the channel up/down-mixing rules require on the render thread.

/// Hard cap on the channel count of any bus.
///
/// Bounds the size of every pre-allocated mix bus regardless of what a
/// description declares.
pub const MAX_CHANNELS: usize = 32;

/// A planar multi-channel sample buffer with a fixed channel capacity.
pub struct AudioBus {
    channels: Vec<Vec<f32>>,
    active: usize,
    frames: usize,
}

impl AudioBus {
    /// Creates a bus with `channel_count` active channels and the same
    /// capacity.
    pub fn new(channel_count: usize, frames: usize) -> Self {
        Self::with_capacity(channel_count, frames, channel_count.max(1))
    }

    /// Creates a bus with `channel_count` active channels and room to grow
    /// to `capacity` channels without reallocating.
    pub fn with_capacity(channel_count: usize, frames: usize, capacity: usize) -> Self {
        let capacity = capacity.max(channel_count).max(1).min(MAX_CHANNELS);
        let channels = (0..capacity).map(|_| vec![0.0; frames]).collect();
        Self {
            channels,
            active: channel_count.min(capacity),
            frames,
        }
    }

    /// Number of samples per channel.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Active channel count. May be zero (a silent, channel-less bus).
    pub fn channel_count(&self) -> usize {
        self.active
    }

    /// Maximum channel count this bus can hold without reallocating.
    pub fn channel_capacity(&self) -> usize {
        self.channels.len()
    }

    /// Sets the active channel count, clamped to the capacity. No
    /// allocation takes place.
    pub fn set_channel_count(&mut self, count: usize) {
        self.active = count.min(self.channels.len());
    }

    /// Returns the samples of an active channel.
    ///
    /// Returns an empty slice for out-of-range indices, so callers can
    /// treat missing channels as silence.
    pub fn channel(&self, index: usize) -> &[f32] {
        if index < self.active {
            &self.channels[index]
        } else {
            &[]
        }
    }

    /// Returns the samples of an active channel mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        assert!(index < self.active, "channel {index} out of range");
        &mut self.channels[index]
    }

    /// Fills every channel (up to capacity) with silence.
    pub fn zero(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Copies another bus's active channels and channel count.
    ///
    /// Source channels beyond this bus's capacity are dropped; frame counts
    /// must match.
    pub fn copy_from(&mut self, source: &AudioBus) {
        debug_assert_eq!(self.frames, source.frames);
        self.set_channel_count(source.channel_count());
        for index in 0..self.active {
            self.channels[index].copy_from_slice(source.channel(index));
        }
    }
}
