//! Real-time audio graph execution engine.
//!
//! aural-engine turns a declarative [`GraphDescription`] — nodes, audio
//! connections, parameter-modulation edges and automation timelines —
//! into per-quantum sample output, while accepting structural and
//! parameter edits from a non-real-time control thread without blocking,
//! locking or allocating on the render path.
//!
//! # Architecture
//!
//! The engine uses a **two-object split**:
//!
//! - [`GraphController`] — owned by the control thread. Holds the current
//!   description, diffs edits ([`classify_update`]), compiles new
//!   [`Topology`] snapshots and parameter batches, and publishes them.
//! - [`GraphExecutor`] — owned by the render thread. Holds the live,
//!   self-contained [`Topology`] (render nodes, dependency-ordered
//!   entries, wiring, scratch buses, automation state) and produces one
//!   quantum per [`begin_quantum`](GraphExecutor::begin_quantum) /
//!   [`ensure_processed`](GraphExecutor::ensure_processed) cycle.
//!
//! The only shared state is a pair of single-slot pending mailboxes with
//! bounded retired-slot reclamation ([`mailbox::UpdateMailbox`]): updates
//! install atomically at quantum boundaries, displaced structures travel
//! back to the control thread for disposal, and a full retired array
//! delays an edit instead of blocking the render callback.
//!
//! # Example
//!
//! ```rust
//! use aural_engine::{
//!     ConstantSourceDesc, Connection, DestinationDesc, GraphController,
//!     GraphDescription, NodeDescription, NodeId,
//! };
//! use aural_registry::ResourceRegistry;
//!
//! let mut description = GraphDescription {
//!     destination_node_id: NodeId(2),
//!     ..GraphDescription::default()
//! };
//! description.nodes.insert(
//!     NodeId(1),
//!     NodeDescription::ConstantSource(ConstantSourceDesc {
//!         offset: 0.5,
//!         start_frame: Some(0),
//!         stop_frame: None,
//!     }),
//! );
//! description.nodes.insert(
//!     NodeId(2),
//!     NodeDescription::Destination(DestinationDesc { channel_count: 2 }),
//! );
//! description.connections.push(Connection {
//!     source: NodeId(1),
//!     destination: NodeId(2),
//!     source_output_index: 0,
//!     destination_input_index: 0,
//! });
//!
//! let registry = ResourceRegistry::new();
//! let (_controller, mut executor) =
//!     GraphController::create(description, 48_000.0, 128, &registry).unwrap();
//!
//! let output = executor.render_quantum(0);
//! assert_eq!(output.channel(0)[0], 0.5);
//! ```

pub mod automation;
pub mod bus;
pub mod compiler;
pub mod description;
pub mod executor;
pub mod mailbox;
pub mod mixing;
pub mod nodes;
pub mod topology;

pub use automation::{AutomationState, evaluate_segment};
pub use bus::{AudioBus, MAX_CHANNELS};
pub use compiler::{CompileError, GraphUpdateKind, build_topology, classify_update};
pub use description::{
    AnalyserDesc, AutomationRate, AutomationSegment, BiquadFilterDesc, BufferSourceDesc,
    ChannelCountMode, ChannelInterpretation, ChannelMergerDesc, ChannelSettings,
    ChannelSplitterDesc, CompressorDesc, Connection, ConstantSourceDesc, DelayDesc,
    DestinationDesc, FilterKind, GainDesc, GraphDescription, NodeDescription, NodeId, NodeKind,
    OscillatorDesc, ParamAutomation, ParamConnection, SegmentShape, StereoPannerDesc,
    StreamSourceDesc, ValidationError, Waveform, params,
};
pub use executor::{GraphController, GraphExecutor, UpdateError};
pub use nodes::{RenderContext, RenderNode};
pub use topology::Topology;
