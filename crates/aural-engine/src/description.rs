//! Declarative graph descriptions.
//!
//! A [`GraphDescription`] is an immutable value snapshot of the whole audio
//! graph: nodes, audio connections, parameter-modulation connections and
//! parameter automation timelines. The control thread owns and edits
//! descriptions; the compiler turns them into render-thread topologies.
//!
//! Node configuration is a closed tagged enum ([`NodeDescription`]) — one
//! variant per node type, carrying only plain data. Every dispatch over it
//! matches exhaustively, so adding a node type forces each site to be
//! revisited.
//!
//! Parameter index spaces are fixed per node type (see [`params`]); no node
//! type in this catalog has a caller-defined parameter set.

use serde::{Deserialize, Serialize};

use aural_registry::ResourceId;

/// Opaque identifier of a node within one description snapshot.
///
/// Stable across description revisions that do not delete the node.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u64);

/// How a node's mixed-input channel count is derived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCountMode {
    /// Use the widest connected input.
    #[default]
    Max,
    /// Use the widest connected input, clamped to the declared count.
    ClampedMax,
    /// Always use the declared count.
    Explicit,
}

/// How multiple input buses are combined channel-wise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelInterpretation {
    /// Standard speaker-layout up/down-mix matrices.
    #[default]
    Speakers,
    /// Channel-index-aligned sum; unmatched channels stay silent.
    Discrete,
}

/// Per-node channel mixing configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Declared channel count (floored at 1, capped at the bus limit).
    pub count: usize,
    /// Count derivation mode.
    pub mode: ChannelCountMode,
    /// Mixing interpretation.
    pub interpretation: ChannelInterpretation,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            count: 2,
            mode: ChannelCountMode::Max,
            interpretation: ChannelInterpretation::Speakers,
        }
    }
}

/// Update frequency of an automated parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationRate {
    /// Audio rate: evaluated every sample frame.
    #[default]
    ARate,
    /// Control rate: evaluated once per quantum and held.
    KRate,
}

/// Interpolation rule of one automation segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentShape {
    /// Hold `start_value` for the whole interval.
    Constant,
    /// Linear interpolation from `start_value` to `end_value`.
    LinearRamp,
    /// Geometric interpolation; degenerates to `end_value` when either
    /// endpoint is non-positive.
    ExponentialRamp,
    /// Exponential approach toward a target value.
    Target {
        /// Approach time constant in seconds.
        time_constant: f64,
        /// Value being approached.
        target: f32,
    },
    /// Piecewise-linear lookup into a fixed sample array.
    ValueCurve {
        /// Curve sample values.
        samples: Vec<f32>,
        /// Curve start time in seconds.
        start_time: f64,
        /// Curve duration in seconds.
        duration: f64,
    },
}

/// One timed interpolation rule in a parameter's automation timeline.
///
/// Segments in one timeline are time-ordered and non-overlapping. Frames are
/// the precomputed `[start_frame, end_frame)` interval at the engine sample
/// rate (floor of the start, ceil of the end, so fractional segments still
/// cover at least one sample).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationSegment {
    /// Interpolation rule.
    pub shape: SegmentShape,
    /// Interval start in continuous seconds.
    pub start_time: f64,
    /// Interval end in continuous seconds (exclusive).
    pub end_time: f64,
    /// Interval start frame at the engine sample rate.
    pub start_frame: u64,
    /// Interval end frame at the engine sample rate (exclusive).
    pub end_frame: u64,
    /// Value at (or before) the interval start.
    pub start_value: f32,
    /// Value at (or after) the interval end.
    pub end_value: f32,
}

impl AutomationSegment {
    /// Builds a segment, deriving the frame interval from the times.
    pub fn new(
        shape: SegmentShape,
        start_time: f64,
        end_time: f64,
        start_value: f32,
        end_value: f32,
        sample_rate: f64,
    ) -> Self {
        Self {
            shape,
            start_time,
            end_time,
            start_frame: seconds_to_frame_floor(start_time, sample_rate),
            end_frame: seconds_to_frame_ceil(end_time, sample_rate),
            start_value,
            end_value,
        }
    }
}

/// Converts seconds to a frame index, rounding down.
pub fn seconds_to_frame_floor(seconds: f64, sample_rate: f64) -> u64 {
    (seconds.max(0.0) * sample_rate).floor() as u64
}

/// Converts seconds to a frame index, rounding up so a fractional end still
/// covers its last sample.
pub fn seconds_to_frame_ceil(seconds: f64, sample_rate: f64) -> u64 {
    (seconds.max(0.0) * sample_rate).ceil() as u64
}

/// Automation timeline and value envelope of one modulated parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamAutomation {
    /// Node whose parameter is automated.
    pub destination: NodeId,
    /// Parameter index within the node's fixed layout.
    pub destination_param_index: usize,
    /// Intrinsic (value-setter) parameter value underneath the timeline.
    pub intrinsic_value: f32,
    /// Replacement value when evaluation produces NaN.
    pub default_value: f32,
    /// Lower clamp bound of the computed value.
    pub min_value: f32,
    /// Upper clamp bound of the computed value.
    pub max_value: f32,
    /// a-rate or k-rate evaluation.
    #[serde(default)]
    pub rate: AutomationRate,
    /// Time-ordered, non-overlapping segments.
    #[serde(default)]
    pub segments: Vec<AutomationSegment>,
}

/// One audio connection between two node endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Source node.
    pub source: NodeId,
    /// Destination node.
    pub destination: NodeId,
    /// Output index on the source node.
    #[serde(default)]
    pub source_output_index: usize,
    /// Input slot index on the destination node.
    #[serde(default)]
    pub destination_input_index: usize,
}

/// One audio-rate modulation connection into a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamConnection {
    /// Source node.
    pub source: NodeId,
    /// Destination node whose parameter is modulated.
    pub destination: NodeId,
    /// Output index on the source node.
    #[serde(default)]
    pub source_output_index: usize,
    /// Parameter index within the destination node's fixed layout.
    pub destination_param_index: usize,
}

/// Oscillator waveform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    /// Sine wave.
    #[default]
    Sine,
    /// Square wave.
    Square,
    /// Rising sawtooth.
    Sawtooth,
    /// Triangle wave.
    Triangle,
}

/// Biquad filter response type (RBJ cookbook).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Low-pass.
    #[default]
    Lowpass,
    /// High-pass.
    Highpass,
    /// Band-pass (constant peak gain).
    Bandpass,
    /// Notch.
    Notch,
    /// Peaking EQ (uses the gain parameter).
    Peaking,
}

/// Periodic source configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OscillatorDesc {
    /// Waveform shape.
    #[serde(default)]
    pub waveform: Waveform,
    /// Frequency in Hz (intrinsic value of the `frequency` parameter).
    pub frequency: f32,
    /// Detune in cents (intrinsic value of the `detune` parameter).
    #[serde(default)]
    pub detune_cents: f32,
    /// Frame at which the source starts producing, if scheduled.
    #[serde(default)]
    pub start_frame: Option<u64>,
    /// Frame at which the source stops, if scheduled.
    #[serde(default)]
    pub stop_frame: Option<u64>,
}

/// Constant (DC offset) source configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantSourceDesc {
    /// Output level (intrinsic value of the `offset` parameter).
    pub offset: f32,
    /// Frame at which the source starts producing, if scheduled.
    #[serde(default)]
    pub start_frame: Option<u64>,
    /// Frame at which the source stops, if scheduled.
    #[serde(default)]
    pub stop_frame: Option<u64>,
}

/// Sample-buffer playback source configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BufferSourceDesc {
    /// Registry id of the buffer to play. `None` (or an unknown id) renders
    /// silence.
    #[serde(default)]
    pub buffer: Option<ResourceId>,
    /// Playback rate multiplier (intrinsic value of `playback_rate`).
    #[serde(default = "default_playback_rate")]
    pub playback_rate: f32,
    /// Detune in cents (intrinsic value of `detune`).
    #[serde(default)]
    pub detune_cents: f32,
    /// Whether playback loops.
    #[serde(default)]
    pub looping: bool,
    /// Loop start in buffer frames.
    #[serde(default)]
    pub loop_start_frame: u64,
    /// Loop end in buffer frames (exclusive; 0 means the buffer end).
    #[serde(default)]
    pub loop_end_frame: u64,
    /// Frame at which playback starts, if scheduled.
    #[serde(default)]
    pub start_frame: Option<u64>,
    /// Frame at which playback stops, if scheduled.
    #[serde(default)]
    pub stop_frame: Option<u64>,
}

fn default_playback_rate() -> f32 {
    1.0
}

/// Input-stream source configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamSourceDesc {
    /// Registry id of the stream. `None` (or an unknown id) renders silence
    /// on a mono bus.
    #[serde(default)]
    pub stream: Option<ResourceId>,
}

/// Gain stage configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GainDesc {
    /// Gain multiplier (intrinsic value of the `gain` parameter).
    pub gain: f32,
    /// Input channel mixing.
    #[serde(default)]
    pub channels: ChannelSettings,
}

/// Delay line configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelayDesc {
    /// Delay time in seconds (intrinsic value of the `delay_time` parameter).
    pub delay_time: f64,
    /// Maximum delay time in seconds; sizes the ring buffer.
    pub max_delay_time: f64,
    /// Input channel mixing. The ring buffer is sized to the declared
    /// count, so the effective count mode is clamped to it.
    #[serde(default)]
    pub channels: ChannelSettings,
}

/// Biquad filter configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiquadFilterDesc {
    /// Response type.
    #[serde(default)]
    pub kind: FilterKind,
    /// Corner/center frequency in Hz (intrinsic value of `frequency`).
    pub frequency: f32,
    /// Quality factor (intrinsic value of `q`).
    #[serde(default = "default_q")]
    pub q: f32,
    /// Peaking gain in dB (intrinsic value of `gain_db`).
    #[serde(default)]
    pub gain_db: f32,
    /// Input channel mixing.
    #[serde(default)]
    pub channels: ChannelSettings,
}

fn default_q() -> f32 {
    std::f32::consts::FRAC_1_SQRT_2
}

/// Equal-power stereo panner configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoPannerDesc {
    /// Pan position in `[-1, 1]` (intrinsic value of the `pan` parameter).
    pub pan: f32,
    /// Input channel mixing.
    #[serde(default = "stereo_panner_channels")]
    pub channels: ChannelSettings,
}

fn stereo_panner_channels() -> ChannelSettings {
    ChannelSettings {
        count: 2,
        mode: ChannelCountMode::ClampedMax,
        interpretation: ChannelInterpretation::Speakers,
    }
}

/// Dynamics compressor configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompressorDesc {
    /// Threshold in dB above which compression starts.
    pub threshold_db: f32,
    /// Soft-knee width in dB.
    #[serde(default = "default_knee")]
    pub knee_db: f32,
    /// Compression ratio (input dB per output dB above the knee).
    #[serde(default = "default_ratio")]
    pub ratio: f32,
    /// Attack time in seconds.
    #[serde(default = "default_attack")]
    pub attack: f32,
    /// Release time in seconds.
    #[serde(default = "default_release")]
    pub release: f32,
    /// Input channel mixing.
    #[serde(default)]
    pub channels: ChannelSettings,
}

fn default_knee() -> f32 {
    30.0
}
fn default_ratio() -> f32 {
    12.0
}
fn default_attack() -> f32 {
    0.003
}
fn default_release() -> f32 {
    0.25
}

/// Analysis probe configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyserDesc {
    /// FFT size; a power of two in `[32, 32768]`.
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// Exponential smoothing constant for frequency data in `[0, 1)`.
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    /// Input channel mixing.
    #[serde(default)]
    pub channels: ChannelSettings,
}

fn default_fft_size() -> usize {
    2048
}
fn default_smoothing() -> f32 {
    0.8
}

/// Channel splitter configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelSplitterDesc {
    /// Number of mono outputs.
    pub outputs: usize,
}

/// Channel merger configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelMergerDesc {
    /// Number of mono input slots.
    pub inputs: usize,
}

/// Destination (final mix) configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DestinationDesc {
    /// Output channel count (explicit).
    pub channel_count: usize,
}

/// Closed set of node configurations — one variant per node type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeDescription {
    /// Periodic waveform source.
    Oscillator(OscillatorDesc),
    /// Constant (DC) source.
    ConstantSource(ConstantSourceDesc),
    /// Sample-buffer playback source.
    BufferSource(BufferSourceDesc),
    /// Input-stream source.
    StreamSource(StreamSourceDesc),
    /// Gain stage.
    Gain(GainDesc),
    /// Delay line (cycle-capable).
    Delay(DelayDesc),
    /// Biquad filter.
    BiquadFilter(BiquadFilterDesc),
    /// Equal-power stereo panner.
    StereoPanner(StereoPannerDesc),
    /// Dynamics compressor with gain-reduction readout.
    Compressor(CompressorDesc),
    /// Analysis probe (time/frequency snapshots).
    Analyser(AnalyserDesc),
    /// One input fanned out to N mono outputs.
    ChannelSplitter(ChannelSplitterDesc),
    /// N mono inputs merged into one N-channel output.
    ChannelMerger(ChannelMergerDesc),
    /// Final mix capture.
    Destination(DestinationDesc),
}

/// Fieldless tag identifying a node type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Periodic waveform source.
    Oscillator,
    /// Constant (DC) source.
    ConstantSource,
    /// Sample-buffer playback source.
    BufferSource,
    /// Input-stream source.
    StreamSource,
    /// Gain stage.
    Gain,
    /// Delay line.
    Delay,
    /// Biquad filter.
    BiquadFilter,
    /// Stereo panner.
    StereoPanner,
    /// Dynamics compressor.
    Compressor,
    /// Analysis probe.
    Analyser,
    /// Channel splitter.
    ChannelSplitter,
    /// Channel merger.
    ChannelMerger,
    /// Final mix capture.
    Destination,
}

/// Fixed parameter indices per node type.
///
/// These layouts are part of the wire contract: `destination_param_index`
/// in connections and automations addresses them. They never change for the
/// life of a snapshot.
pub mod params {
    /// Oscillator parameters.
    pub mod oscillator {
        /// Frequency in Hz.
        pub const FREQUENCY: usize = 0;
        /// Detune in cents.
        pub const DETUNE: usize = 1;
    }
    /// Constant-source parameters.
    pub mod constant_source {
        /// Output level.
        pub const OFFSET: usize = 0;
    }
    /// Buffer-source parameters.
    pub mod buffer_source {
        /// Playback-rate multiplier.
        pub const PLAYBACK_RATE: usize = 0;
        /// Detune in cents.
        pub const DETUNE: usize = 1;
    }
    /// Gain parameters.
    pub mod gain {
        /// Gain multiplier.
        pub const GAIN: usize = 0;
    }
    /// Delay parameters.
    pub mod delay {
        /// Delay time in seconds.
        pub const DELAY_TIME: usize = 0;
    }
    /// Biquad filter parameters.
    pub mod biquad {
        /// Corner/center frequency in Hz.
        pub const FREQUENCY: usize = 0;
        /// Quality factor.
        pub const Q: usize = 1;
        /// Peaking gain in dB.
        pub const GAIN_DB: usize = 2;
    }
    /// Stereo panner parameters.
    pub mod stereo_panner {
        /// Pan position in [-1, 1].
        pub const PAN: usize = 0;
    }
    /// Compressor parameters.
    pub mod compressor {
        /// Threshold in dB.
        pub const THRESHOLD: usize = 0;
        /// Knee width in dB.
        pub const KNEE: usize = 1;
        /// Compression ratio.
        pub const RATIO: usize = 2;
        /// Attack time in seconds.
        pub const ATTACK: usize = 3;
        /// Release time in seconds.
        pub const RELEASE: usize = 4;
    }
}

impl NodeDescription {
    /// Returns the node's type tag.
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeDescription::Oscillator(_) => NodeKind::Oscillator,
            NodeDescription::ConstantSource(_) => NodeKind::ConstantSource,
            NodeDescription::BufferSource(_) => NodeKind::BufferSource,
            NodeDescription::StreamSource(_) => NodeKind::StreamSource,
            NodeDescription::Gain(_) => NodeKind::Gain,
            NodeDescription::Delay(_) => NodeKind::Delay,
            NodeDescription::BiquadFilter(_) => NodeKind::BiquadFilter,
            NodeDescription::StereoPanner(_) => NodeKind::StereoPanner,
            NodeDescription::Compressor(_) => NodeKind::Compressor,
            NodeDescription::Analyser(_) => NodeKind::Analyser,
            NodeDescription::ChannelSplitter(_) => NodeKind::ChannelSplitter,
            NodeDescription::ChannelMerger(_) => NodeKind::ChannelMerger,
            NodeDescription::Destination(_) => NodeKind::Destination,
        }
    }

    /// Number of automatable parameters in the node's fixed layout.
    pub fn param_count(&self) -> usize {
        match self {
            NodeDescription::Oscillator(_) | NodeDescription::BufferSource(_) => 2,
            NodeDescription::ConstantSource(_)
            | NodeDescription::Gain(_)
            | NodeDescription::Delay(_)
            | NodeDescription::StereoPanner(_) => 1,
            NodeDescription::BiquadFilter(_) => 3,
            NodeDescription::Compressor(_) => 5,
            NodeDescription::StreamSource(_)
            | NodeDescription::Analyser(_)
            | NodeDescription::ChannelSplitter(_)
            | NodeDescription::ChannelMerger(_)
            | NodeDescription::Destination(_) => 0,
        }
    }

    /// Seeds per-parameter automation state from the description: calls
    /// `set(param_index, intrinsic, min, max)` for each parameter.
    pub fn initialize_param_state(&self, set: &mut dyn FnMut(usize, f32, f32, f32)) {
        match self {
            NodeDescription::Oscillator(desc) => {
                set(params::oscillator::FREQUENCY, desc.frequency, 0.0, f32::MAX);
                set(params::oscillator::DETUNE, desc.detune_cents, f32::MIN, f32::MAX);
            }
            NodeDescription::ConstantSource(desc) => {
                set(params::constant_source::OFFSET, desc.offset, f32::MIN, f32::MAX);
            }
            NodeDescription::BufferSource(desc) => {
                set(params::buffer_source::PLAYBACK_RATE, desc.playback_rate, 0.0, f32::MAX);
                set(params::buffer_source::DETUNE, desc.detune_cents, f32::MIN, f32::MAX);
            }
            NodeDescription::Gain(desc) => {
                set(params::gain::GAIN, desc.gain, f32::MIN, f32::MAX);
            }
            NodeDescription::Delay(desc) => {
                set(
                    params::delay::DELAY_TIME,
                    desc.delay_time as f32,
                    0.0,
                    desc.max_delay_time.max(0.0) as f32,
                );
            }
            NodeDescription::BiquadFilter(desc) => {
                set(params::biquad::FREQUENCY, desc.frequency, 0.0, f32::MAX);
                set(params::biquad::Q, desc.q, 1.0e-4, 1000.0);
                set(params::biquad::GAIN_DB, desc.gain_db, -40.0, 40.0);
            }
            NodeDescription::StereoPanner(desc) => {
                set(params::stereo_panner::PAN, desc.pan, -1.0, 1.0);
            }
            NodeDescription::Compressor(desc) => {
                set(params::compressor::THRESHOLD, desc.threshold_db, -100.0, 0.0);
                set(params::compressor::KNEE, desc.knee_db, 0.0, 40.0);
                set(params::compressor::RATIO, desc.ratio, 1.0, 20.0);
                set(params::compressor::ATTACK, desc.attack, 0.0, 1.0);
                set(params::compressor::RELEASE, desc.release, 0.0, 1.0);
            }
            NodeDescription::StreamSource(_)
            | NodeDescription::Analyser(_)
            | NodeDescription::ChannelSplitter(_)
            | NodeDescription::ChannelMerger(_)
            | NodeDescription::Destination(_) => {}
        }
    }

    /// Number of output buses the node exposes.
    pub fn output_count(&self) -> usize {
        match self {
            NodeDescription::ChannelSplitter(desc) => desc.outputs.max(1),
            _ => 1,
        }
    }

    /// Number of input slots the node exposes.
    pub fn input_count(&self) -> usize {
        match self {
            NodeDescription::Oscillator(_)
            | NodeDescription::ConstantSource(_)
            | NodeDescription::BufferSource(_)
            | NodeDescription::StreamSource(_) => 0,
            NodeDescription::ChannelMerger(desc) => desc.inputs.max(1),
            _ => 1,
        }
    }
}

/// Structural validation failure of a [`GraphDescription`].
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The destination node id is not in the node map.
    #[error("destination node {0:?} is not in the description")]
    MissingDestination(NodeId),
    /// A connection endpoint does not exist.
    #[error("connection references unknown node {0:?}")]
    UnknownNode(NodeId),
    /// A connection addresses an input slot the node does not have.
    #[error("node {node:?} has no input slot {input}")]
    InputOutOfRange {
        /// Destination node.
        node: NodeId,
        /// Offending input index.
        input: usize,
    },
    /// A param connection or automation addresses a parameter index outside
    /// the node's layout.
    #[error("node {node:?} has no parameter index {param}")]
    ParamOutOfRange {
        /// Destination node.
        node: NodeId,
        /// Offending parameter index.
        param: usize,
    },
}

/// An immutable value snapshot of the whole graph.
///
/// Node iteration order is `NodeId`-ascending (`BTreeMap`), which makes
/// compiled node indices deterministic for a given snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    /// All nodes by id.
    pub nodes: std::collections::BTreeMap<NodeId, NodeDescription>,
    /// The node whose output is the engine's output.
    pub destination_node_id: NodeId,
    /// Audio connections, in creation order.
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Parameter-modulation connections, in creation order.
    #[serde(default)]
    pub param_connections: Vec<ParamConnection>,
    /// Automation timelines, one per modulated parameter.
    #[serde(default)]
    pub param_automations: Vec<ParamAutomation>,
}

impl GraphDescription {
    /// Cheap structural sanity pass for front ends.
    ///
    /// The engine itself does not require this: compilation of any snapshot
    /// succeeds (unresolvable resources degrade to silence), except for the
    /// unresolvable-cycle contract violation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.nodes.contains_key(&self.destination_node_id) {
            return Err(ValidationError::MissingDestination(self.destination_node_id));
        }
        for connection in &self.connections {
            let destination = self
                .nodes
                .get(&connection.destination)
                .ok_or(ValidationError::UnknownNode(connection.destination))?;
            if !self.nodes.contains_key(&connection.source) {
                return Err(ValidationError::UnknownNode(connection.source));
            }
            if connection.destination_input_index >= destination.input_count() {
                return Err(ValidationError::InputOutOfRange {
                    node: connection.destination,
                    input: connection.destination_input_index,
                });
            }
        }
        for connection in &self.param_connections {
            let destination = self
                .nodes
                .get(&connection.destination)
                .ok_or(ValidationError::UnknownNode(connection.destination))?;
            if !self.nodes.contains_key(&connection.source) {
                return Err(ValidationError::UnknownNode(connection.source));
            }
            if connection.destination_param_index >= destination.param_count() {
                return Err(ValidationError::ParamOutOfRange {
                    node: connection.destination,
                    param: connection.destination_param_index,
                });
            }
        }
        for automation in &self.param_automations {
            let destination = self
                .nodes
                .get(&automation.destination)
                .ok_or(ValidationError::UnknownNode(automation.destination))?;
            if automation.destination_param_index >= destination.param_count() {
                return Err(ValidationError::ParamOutOfRange {
                    node: automation.destination,
                    param: automation.destination_param_index,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gain_node(gain: f32) -> NodeDescription {
        NodeDescription::Gain(GainDesc {
            gain,
            channels: ChannelSettings::default(),
        })
    }

    fn minimal_description() -> GraphDescription {
        let mut description = GraphDescription {
            destination_node_id: NodeId(1),
            ..GraphDescription::default()
        };
        description.nodes.insert(
            NodeId(1),
            NodeDescription::Destination(DestinationDesc { channel_count: 2 }),
        );
        description
    }

    #[test]
    fn param_counts_match_layouts() {
        assert_eq!(gain_node(1.0).param_count(), 1);
        assert_eq!(
            NodeDescription::Oscillator(OscillatorDesc {
                waveform: Waveform::Sine,
                frequency: 440.0,
                detune_cents: 0.0,
                start_frame: None,
                stop_frame: None,
            })
            .param_count(),
            2
        );
        assert_eq!(
            NodeDescription::Destination(DestinationDesc { channel_count: 2 }).param_count(),
            0
        );
    }

    #[test]
    fn initialize_param_state_reports_every_param() {
        let node = NodeDescription::Compressor(CompressorDesc {
            threshold_db: -24.0,
            knee_db: 30.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
            channels: ChannelSettings::default(),
        });
        let mut seen = Vec::new();
        node.initialize_param_state(&mut |index, intrinsic, min, max| {
            seen.push((index, intrinsic, min, max));
        });
        assert_eq!(seen.len(), node.param_count());
        assert_eq!(seen[0], (params::compressor::THRESHOLD, -24.0, -100.0, 0.0));
    }

    #[test]
    fn delay_param_max_tracks_description() {
        let node = NodeDescription::Delay(DelayDesc {
            delay_time: 0.25,
            max_delay_time: 1.0,
            channels: ChannelSettings::default(),
        });
        let mut max_seen = 0.0;
        node.initialize_param_state(&mut |_, _, _, max| max_seen = max);
        assert_eq!(max_seen, 1.0);
    }

    #[test]
    fn validate_rejects_missing_destination() {
        let description = GraphDescription::default();
        assert!(matches!(
            description.validate(),
            Err(ValidationError::MissingDestination(_))
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_param_index() {
        let mut description = minimal_description();
        description.nodes.insert(NodeId(2), gain_node(0.5));
        description.param_connections.push(ParamConnection {
            source: NodeId(2),
            destination: NodeId(2),
            source_output_index: 0,
            destination_param_index: 3,
        });
        assert!(matches!(
            description.validate(),
            Err(ValidationError::ParamOutOfRange { .. })
        ));
    }

    #[test]
    fn validate_accepts_wired_graph() {
        let mut description = minimal_description();
        description.nodes.insert(NodeId(2), gain_node(0.5));
        description.connections.push(Connection {
            source: NodeId(2),
            destination: NodeId(1),
            source_output_index: 0,
            destination_input_index: 0,
        });
        assert!(description.validate().is_ok());
    }

    #[test]
    fn description_json_roundtrip() {
        let mut description = minimal_description();
        description.nodes.insert(
            NodeId(2),
            NodeDescription::Oscillator(OscillatorDesc {
                waveform: Waveform::Sawtooth,
                frequency: 220.0,
                detune_cents: 12.0,
                start_frame: Some(0),
                stop_frame: None,
            }),
        );
        description.connections.push(Connection {
            source: NodeId(2),
            destination: NodeId(1),
            source_output_index: 0,
            destination_input_index: 0,
        });
        description.param_automations.push(ParamAutomation {
            destination: NodeId(2),
            destination_param_index: params::oscillator::FREQUENCY,
            intrinsic_value: 220.0,
            default_value: 220.0,
            min_value: 0.0,
            max_value: 20_000.0,
            rate: AutomationRate::ARate,
            segments: vec![AutomationSegment::new(
                SegmentShape::LinearRamp,
                0.0,
                1.0,
                220.0,
                440.0,
                48_000.0,
            )],
        });

        let json = serde_json::to_string(&description).unwrap();
        let back: GraphDescription = serde_json::from_str(&json).unwrap();
        assert_eq!(back, description);
    }

    #[test]
    fn segment_frames_cover_fractional_intervals() {
        let segment = AutomationSegment::new(
            SegmentShape::Constant,
            0.0,
            0.5000001,
            1.0,
            1.0,
            10.0,
        );
        assert_eq!(segment.start_frame, 0);
        assert_eq!(segment.end_frame, 6);
    }
}
