//! Gain stage.

use crate::bus::{AudioBus, MAX_CHANNELS};
use crate::description::params;
use crate::nodes::{RenderContext, connected_input, param_values};

/// Multiplies the mixed input by the computed `gain` parameter, sample-wise.
///
/// The output channel count follows the mixed input; with no input channels
/// the output collapses to zero channels for the quantum.
pub struct GainNode {
    output: AudioBus,
}

impl GainNode {
    /// Builds the node.
    pub fn new(quantum_size: usize) -> Self {
        Self {
            output: AudioBus::with_capacity(0, quantum_size, MAX_CHANNELS),
        }
    }

    pub(crate) fn output(&self) -> &AudioBus {
        &self.output
    }

    pub(crate) fn process(&mut self, _ctx: &RenderContext, inputs: &[AudioBus], params: &[AudioBus]) {
        let Some(input) = connected_input(inputs, 0) else {
            self.output.set_channel_count(0);
            return;
        };

        let gain = param_values(params, params::gain::GAIN);
        self.output.set_channel_count(input.channel_count());
        for channel in 0..self.output.channel_count() {
            let source = input.channel(channel);
            for (out, (&sample, &g)) in self
                .output
                .channel_mut(channel)
                .iter_mut()
                .zip(source.iter().zip(gain.iter()))
            {
                *out = sample * g;
            }
        }
    }
}
