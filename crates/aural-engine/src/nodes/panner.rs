//! Equal-power stereo panner.

use std::f32::consts::FRAC_PI_2;

use crate::bus::AudioBus;
use crate::description::params;
use crate::nodes::{RenderContext, connected_input, param_values};

/// Pans a mono or stereo input across a stereo output with equal-power
/// gains driven by the a-rate `pan` parameter.
pub struct StereoPannerNode {
    output: AudioBus,
}

impl StereoPannerNode {
    /// Builds the node.
    pub fn new(quantum_size: usize) -> Self {
        Self {
            output: AudioBus::new(2, quantum_size),
        }
    }

    pub(crate) fn output(&self) -> &AudioBus {
        &self.output
    }

    pub(crate) fn process(&mut self, ctx: &RenderContext, inputs: &[AudioBus], params: &[AudioBus]) {
        let Some(input) = connected_input(inputs, 0) else {
            self.output.set_channel_count(0);
            return;
        };

        let pan_values = param_values(params, params::stereo_panner::PAN);
        self.output.set_channel_count(2);
        let stereo_input = input.channel_count() >= 2;

        for offset in 0..ctx.quantum_size {
            let pan = pan_values.get(offset).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
            let (left_out, right_out) = if stereo_input {
                let left = input.channel(0)[offset];
                let right = input.channel(1)[offset];
                if pan <= 0.0 {
                    let x = (pan + 1.0) * FRAC_PI_2;
                    (left + right * x.cos(), right * x.sin())
                } else {
                    let x = pan * FRAC_PI_2;
                    (left * x.cos(), right + left * x.sin())
                }
            } else {
                let sample = input.channel(0)[offset];
                let x = (pan + 1.0) * 0.5 * FRAC_PI_2;
                (sample * x.cos(), sample * x.sin())
            };
            self.output.channel_mut(0)[offset] = left_out;
            self.output.channel_mut(1)[offset] = right_out;
        }
    }
}
