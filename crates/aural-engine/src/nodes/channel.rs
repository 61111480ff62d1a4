//! Channel splitter and merger.

use crate::bus::{AudioBus, MAX_CHANNELS};
use crate::description::{ChannelMergerDesc, ChannelSplitterDesc};
use crate::nodes::{RenderContext, connected_input};

/// Fans one input out into N mono outputs, one per input channel.
///
/// Outputs beyond the input's channel count are silent.
pub struct ChannelSplitterNode {
    outputs: Vec<AudioBus>,
}

impl ChannelSplitterNode {
    /// Builds the node with the declared number of mono outputs.
    pub fn new(desc: &ChannelSplitterDesc, quantum_size: usize) -> Self {
        let count = desc.outputs.clamp(1, MAX_CHANNELS);
        Self {
            outputs: (0..count).map(|_| AudioBus::new(1, quantum_size)).collect(),
        }
    }

    pub(crate) fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub(crate) fn output(&self, index: usize) -> &AudioBus {
        &self.outputs[index.min(self.outputs.len() - 1)]
    }

    pub(crate) fn process(&mut self, _ctx: &RenderContext, inputs: &[AudioBus]) {
        let input = connected_input(inputs, 0);
        for (index, output) in self.outputs.iter_mut().enumerate() {
            output.set_channel_count(1);
            let out = output.channel_mut(0);
            match input {
                Some(bus) if index < bus.channel_count() => {
                    out.copy_from_slice(bus.channel(index));
                }
                _ => out.fill(0.0),
            }
        }
    }
}

/// Merges N mono input slots into one N-channel output.
///
/// Each input slot is mixed down to mono by the executor (the compiler
/// pins merger inputs to an explicit mono layout); unconnected slots
/// produce silent channels.
pub struct ChannelMergerNode {
    output: AudioBus,
}

impl ChannelMergerNode {
    /// Builds the node with the declared number of input slots.
    pub fn new(desc: &ChannelMergerDesc, quantum_size: usize) -> Self {
        let count = desc.inputs.clamp(1, MAX_CHANNELS);
        Self {
            output: AudioBus::new(count, quantum_size),
        }
    }

    pub(crate) fn output(&self) -> &AudioBus {
        &self.output
    }

    pub(crate) fn process(&mut self, _ctx: &RenderContext, inputs: &[AudioBus]) {
        let channels = self.output.channel_capacity();
        self.output.set_channel_count(channels);
        for channel in 0..channels {
            let out = self.output.channel_mut(channel);
            match inputs.get(channel) {
                Some(bus) if bus.channel_count() > 0 => out.copy_from_slice(bus.channel(0)),
                _ => out.fill(0.0),
            }
        }
    }
}
