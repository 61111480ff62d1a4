//! Render-node catalog.
//!
//! One processing unit per node type, collected in the closed [`RenderNode`]
//! enum. Every dispatch point matches exhaustively — adding a node type
//! will not compile until each site handles it.
//!
//! Nodes own their output buses. `process` receives the already-mixed input
//! buses (one per input slot) and the computed parameter buses (mono, one
//! per parameter in the node's fixed layout); processing order guarantees
//! sources ran first, except across the delay writer/reader split, which
//! reads the previous quantum by design.

mod analyser;
mod channel;
mod delay;
mod destination;
mod dynamics;
mod filter;
mod gain;
mod panner;
mod source;

pub use analyser::AnalyserNode;
pub use channel::{ChannelMergerNode, ChannelSplitterNode};
pub use delay::DelayNode;
pub use destination::DestinationNode;
pub use dynamics::CompressorNode;
pub use filter::BiquadFilterNode;
pub use gain::GainNode;
pub use panner::StereoPannerNode;
pub use source::{BufferSourceNode, ConstantSourceNode, OscillatorNode, StreamSourceNode};

use crate::bus::AudioBus;
use crate::description::NodeDescription;

/// Per-quantum processing context shared by every node.
#[derive(Clone, Copy, Debug)]
pub struct RenderContext {
    /// Engine sample rate in Hz.
    pub sample_rate: f32,
    /// Frames per quantum.
    pub quantum_size: usize,
    /// Absolute frame index of the quantum's first sample.
    pub current_frame: u64,
}

/// Start/stop scheduling shared by the source nodes.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Scheduling {
    start: Option<u64>,
    stop: Option<u64>,
}

impl Scheduling {
    pub(crate) fn new(start: Option<u64>, stop: Option<u64>) -> Self {
        Self { start, stop }
    }

    /// Schedules the start; `None` means "now".
    pub(crate) fn start_at(&mut self, frame: Option<u64>, now: u64) {
        self.start = Some(frame.unwrap_or(now));
    }

    /// Schedules the stop; `None` means "now".
    pub(crate) fn stop_at(&mut self, frame: Option<u64>, now: u64) {
        self.stop = Some(frame.unwrap_or(now));
    }

    /// True if the source produces sound at the given frame.
    pub(crate) fn is_active(&self, frame: u64) -> bool {
        match self.start {
            Some(start) if frame >= start => self.stop.is_none_or(|stop| frame < stop),
            _ => false,
        }
    }
}

/// Returns the mixed input bus for a slot, or `None` when the slot is
/// unconnected or carries no channels this quantum.
pub(crate) fn connected_input(inputs: &[AudioBus], slot: usize) -> Option<&AudioBus> {
    inputs.get(slot).filter(|bus| bus.channel_count() > 0)
}

/// Returns the computed-value samples of a parameter bus.
pub(crate) fn param_values(params: &[AudioBus], index: usize) -> &[f32] {
    params.get(index).map_or(&[], |bus| bus.channel(0))
}

/// A processing unit — one variant per node type.
pub enum RenderNode {
    /// Periodic waveform source.
    Oscillator(OscillatorNode),
    /// Constant (DC) source.
    ConstantSource(ConstantSourceNode),
    /// Sample-buffer playback source.
    BufferSource(BufferSourceNode),
    /// Input-stream source.
    StreamSource(StreamSourceNode),
    /// Gain stage.
    Gain(GainNode),
    /// Delay line.
    Delay(DelayNode),
    /// Biquad filter.
    BiquadFilter(BiquadFilterNode),
    /// Equal-power stereo panner.
    StereoPanner(StereoPannerNode),
    /// Dynamics compressor.
    Compressor(CompressorNode),
    /// Analysis probe.
    Analyser(AnalyserNode),
    /// Channel splitter.
    ChannelSplitter(ChannelSplitterNode),
    /// Channel merger.
    ChannelMerger(ChannelMergerNode),
    /// Final mix capture.
    Destination(DestinationNode),
}

impl RenderNode {
    /// Number of output buses.
    pub fn output_count(&self) -> usize {
        match self {
            RenderNode::ChannelSplitter(node) => node.output_count(),
            RenderNode::Oscillator(_)
            | RenderNode::ConstantSource(_)
            | RenderNode::BufferSource(_)
            | RenderNode::StreamSource(_)
            | RenderNode::Gain(_)
            | RenderNode::Delay(_)
            | RenderNode::BiquadFilter(_)
            | RenderNode::StereoPanner(_)
            | RenderNode::Compressor(_)
            | RenderNode::Analyser(_)
            | RenderNode::ChannelMerger(_)
            | RenderNode::Destination(_) => 1,
        }
    }

    /// The output bus at `index` (clamped to the valid range).
    pub fn output(&self, index: usize) -> &AudioBus {
        match self {
            RenderNode::Oscillator(node) => node.output(),
            RenderNode::ConstantSource(node) => node.output(),
            RenderNode::BufferSource(node) => node.output(),
            RenderNode::StreamSource(node) => node.output(),
            RenderNode::Gain(node) => node.output(),
            RenderNode::Delay(node) => node.output(),
            RenderNode::BiquadFilter(node) => node.output(),
            RenderNode::StereoPanner(node) => node.output(),
            RenderNode::Compressor(node) => node.output(),
            RenderNode::Analyser(node) => node.output(),
            RenderNode::ChannelSplitter(node) => node.output(index),
            RenderNode::ChannelMerger(node) => node.output(),
            RenderNode::Destination(node) => node.output(),
        }
    }

    /// Processes one quantum.
    pub fn process(&mut self, ctx: &RenderContext, inputs: &[AudioBus], params: &[AudioBus]) {
        match self {
            RenderNode::Oscillator(node) => node.process(ctx, params),
            RenderNode::ConstantSource(node) => node.process(ctx, params),
            RenderNode::BufferSource(node) => node.process(ctx, params),
            RenderNode::StreamSource(node) => node.process(ctx),
            RenderNode::Gain(node) => node.process(ctx, inputs, params),
            RenderNode::Delay(node) => node.process(ctx, inputs, params),
            RenderNode::BiquadFilter(node) => node.process(ctx, inputs, params),
            RenderNode::StereoPanner(node) => node.process(ctx, inputs, params),
            RenderNode::Compressor(node) => node.process(ctx, inputs, params),
            RenderNode::Analyser(node) => node.process(ctx, inputs),
            RenderNode::ChannelSplitter(node) => node.process(ctx, inputs),
            RenderNode::ChannelMerger(node) => node.process(ctx, inputs),
            RenderNode::Destination(node) => node.process(ctx, inputs),
        }
    }

    /// Delay-split writer step: consume this quantum's input into the ring.
    ///
    /// No-op for every node type but `Delay`; the compiler only emits
    /// writer entries for delay nodes.
    pub fn process_cycle_writer(&mut self, ctx: &RenderContext, inputs: &[AudioBus]) {
        if let RenderNode::Delay(node) = self {
            node.process_cycle_writer(ctx, inputs);
        } else {
            debug_assert!(false, "cycle writer dispatched to a non-delay node");
        }
    }

    /// Delay-split reader step: produce output from the ring (previous
    /// quanta), with the effective delay floored at one quantum.
    pub fn process_cycle_reader(&mut self, ctx: &RenderContext, params: &[AudioBus]) {
        if let RenderNode::Delay(node) = self {
            node.process_cycle_reader(ctx, params);
        } else {
            debug_assert!(false, "cycle reader dispatched to a non-delay node");
        }
    }

    /// Applies a parameter-class description update on the render thread.
    ///
    /// Mismatched variants are ignored — the enqueue path guarantees the
    /// node set is unchanged for parameter batches.
    pub fn apply_description(&mut self, desc: &NodeDescription) {
        match (self, desc) {
            (RenderNode::Oscillator(node), NodeDescription::Oscillator(d)) => node.apply(d),
            (RenderNode::ConstantSource(node), NodeDescription::ConstantSource(d)) => node.apply(d),
            (RenderNode::BufferSource(node), NodeDescription::BufferSource(d)) => node.apply(d),
            (RenderNode::StreamSource(_), NodeDescription::StreamSource(_)) => {}
            (RenderNode::Gain(_), NodeDescription::Gain(_)) => {}
            (RenderNode::Delay(_), NodeDescription::Delay(_)) => {}
            (RenderNode::BiquadFilter(node), NodeDescription::BiquadFilter(d)) => node.apply(d),
            (RenderNode::StereoPanner(_), NodeDescription::StereoPanner(_)) => {}
            (RenderNode::Compressor(_), NodeDescription::Compressor(_)) => {}
            (RenderNode::Analyser(node), NodeDescription::Analyser(d)) => node.apply(d),
            (RenderNode::ChannelSplitter(_), NodeDescription::ChannelSplitter(_)) => {}
            (RenderNode::ChannelMerger(_), NodeDescription::ChannelMerger(_)) => {}
            (RenderNode::Destination(_), NodeDescription::Destination(_)) => {}
            _ => {}
        }
    }

    /// Non-real-time variant of [`apply_description`](Self::apply_description)
    /// used by offline rendering contexts. May reallocate (analyser FFT
    /// resize).
    pub fn apply_description_offline(&mut self, desc: &NodeDescription) {
        if let (RenderNode::Analyser(node), NodeDescription::Analyser(d)) = (&mut *self, desc) {
            node.apply_offline(d);
            return;
        }
        self.apply_description(desc);
    }

    /// Schedules a source start; `None` means the current frame. No-op for
    /// non-source nodes.
    pub fn schedule_start(&mut self, frame: Option<u64>, now: u64) {
        match self {
            RenderNode::Oscillator(node) => node.scheduling_mut().start_at(frame, now),
            RenderNode::ConstantSource(node) => node.scheduling_mut().start_at(frame, now),
            RenderNode::BufferSource(node) => node.scheduling_mut().start_at(frame, now),
            RenderNode::StreamSource(_)
            | RenderNode::Gain(_)
            | RenderNode::Delay(_)
            | RenderNode::BiquadFilter(_)
            | RenderNode::StereoPanner(_)
            | RenderNode::Compressor(_)
            | RenderNode::Analyser(_)
            | RenderNode::ChannelSplitter(_)
            | RenderNode::ChannelMerger(_)
            | RenderNode::Destination(_) => {}
        }
    }

    /// Schedules a source stop; `None` means the current frame. No-op for
    /// non-source nodes.
    pub fn schedule_stop(&mut self, frame: Option<u64>, now: u64) {
        match self {
            RenderNode::Oscillator(node) => node.scheduling_mut().stop_at(frame, now),
            RenderNode::ConstantSource(node) => node.scheduling_mut().stop_at(frame, now),
            RenderNode::BufferSource(node) => node.scheduling_mut().stop_at(frame, now),
            RenderNode::StreamSource(_)
            | RenderNode::Gain(_)
            | RenderNode::Delay(_)
            | RenderNode::BiquadFilter(_)
            | RenderNode::StereoPanner(_)
            | RenderNode::Compressor(_)
            | RenderNode::Analyser(_)
            | RenderNode::ChannelSplitter(_)
            | RenderNode::ChannelMerger(_)
            | RenderNode::Destination(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduling_window() {
        let mut scheduling = Scheduling::default();
        assert!(!scheduling.is_active(0));

        scheduling.start_at(Some(10), 0);
        assert!(!scheduling.is_active(9));
        assert!(scheduling.is_active(10));

        scheduling.stop_at(Some(20), 0);
        assert!(scheduling.is_active(19));
        assert!(!scheduling.is_active(20));
    }

    #[test]
    fn scheduling_none_means_now() {
        let mut scheduling = Scheduling::default();
        scheduling.start_at(None, 128);
        assert!(!scheduling.is_active(127));
        assert!(scheduling.is_active(128));
    }
}
