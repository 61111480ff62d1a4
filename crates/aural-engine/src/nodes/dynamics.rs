//! Dynamics compressor with a gain-reduction readout.

use crate::bus::{AudioBus, MAX_CHANNELS};
use crate::description::params;
use crate::nodes::{RenderContext, connected_input, param_values};

/// Level below which the detector treats the input as silence.
const SILENCE_FLOOR: f32 = 1.0e-6;

/// Feed-forward compressor: soft-knee gain computation on the per-sample
/// peak across channels, smoothed by attack/release envelopes, applied
/// uniformly to every channel.
pub struct CompressorNode {
    /// Smoothed gain reduction in positive dB.
    reduction: f32,
    output: AudioBus,
}

impl CompressorNode {
    /// Builds the node.
    pub fn new(quantum_size: usize) -> Self {
        Self {
            reduction: 0.0,
            output: AudioBus::with_capacity(0, quantum_size, MAX_CHANNELS),
        }
    }

    pub(crate) fn output(&self) -> &AudioBus {
        &self.output
    }

    /// Current gain reduction in dB (zero or negative), the §6 scalar
    /// readout for dynamics nodes.
    pub fn reduction_db(&self) -> f32 {
        -self.reduction
    }

    pub(crate) fn process(&mut self, ctx: &RenderContext, inputs: &[AudioBus], params: &[AudioBus]) {
        let Some(input) = connected_input(inputs, 0) else {
            self.output.set_channel_count(0);
            // The envelope decays toward unity while no input is connected.
            self.reduction *= 0.99;
            return;
        };

        let threshold = param_values(params, params::compressor::THRESHOLD);
        let knee = param_values(params, params::compressor::KNEE);
        let ratio = param_values(params, params::compressor::RATIO);
        let attack = param_values(params, params::compressor::ATTACK);
        let release = param_values(params, params::compressor::RELEASE);

        let channels = input.channel_count();
        self.output.set_channel_count(channels);

        for offset in 0..ctx.quantum_size {
            let mut peak = 0.0f32;
            for channel in 0..channels {
                peak = peak.max(input.channel(channel)[offset].abs());
            }
            let level_db = 20.0 * peak.max(SILENCE_FLOOR).log10();

            let target = reduction_for(
                level_db,
                threshold[offset],
                knee[offset],
                ratio[offset].max(1.0),
            );

            // One-pole smoothing toward the target reduction.
            let time = if target > self.reduction {
                attack[offset]
            } else {
                release[offset]
            };
            let coeff = smoothing_coefficient(time, ctx.sample_rate);
            self.reduction = target + (self.reduction - target) * coeff;

            let gain = 10.0f32.powf(-self.reduction / 20.0);
            for channel in 0..channels {
                self.output.channel_mut(channel)[offset] = input.channel(channel)[offset] * gain;
            }
        }
    }
}

/// Gain reduction (positive dB) for a detector level, with a soft knee
/// centered on the threshold.
fn reduction_for(level_db: f32, threshold_db: f32, knee_db: f32, ratio: f32) -> f32 {
    let over = level_db - threshold_db;
    let shaped = if knee_db <= 0.0 {
        over.max(0.0)
    } else if 2.0 * over < -knee_db {
        0.0
    } else if 2.0 * over.abs() <= knee_db {
        let edge = over + knee_db * 0.5;
        edge * edge / (2.0 * knee_db)
    } else {
        over
    };
    shaped * (1.0 - 1.0 / ratio)
}

fn smoothing_coefficient(time_seconds: f32, sample_rate: f32) -> f32 {
    if time_seconds <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_seconds * sample_rate)).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUANTUM: usize = 128;
    const RATE: f32 = 48_000.0;

    fn ctx() -> RenderContext {
        RenderContext {
            sample_rate: RATE,
            quantum_size: QUANTUM,
            current_frame: 0,
        }
    }

    fn param_bus(value: f32) -> AudioBus {
        let mut bus = AudioBus::new(1, QUANTUM);
        bus.channel_mut(0).fill(value);
        bus
    }

    fn default_params() -> Vec<AudioBus> {
        vec![
            param_bus(-24.0), // threshold
            param_bus(0.0),   // knee (hard, for predictable tests)
            param_bus(4.0),   // ratio
            param_bus(0.0),   // attack (instant)
            param_bus(0.0),   // release (instant)
        ]
    }

    fn loud_input() -> AudioBus {
        let mut bus = AudioBus::new(1, QUANTUM);
        bus.channel_mut(0).fill(1.0); // 0 dBFS, 24 dB over threshold
        bus
    }

    #[test]
    fn reduces_signal_over_threshold() {
        let mut node = CompressorNode::new(QUANTUM);
        node.process(&ctx(), &[loud_input()], &default_params());

        // 24 dB over at 4:1 removes 18 dB.
        assert!((node.reduction_db() + 18.0).abs() < 0.1);
        let expected_gain = 10.0f32.powf(-18.0 / 20.0);
        let last = node.output().channel(0)[QUANTUM - 1];
        assert!((last - expected_gain).abs() < 0.01);
    }

    #[test]
    fn quiet_signal_passes_untouched() {
        let mut quiet = AudioBus::new(1, QUANTUM);
        quiet.channel_mut(0).fill(0.01); // -40 dBFS, far below threshold

        let mut node = CompressorNode::new(QUANTUM);
        node.process(&ctx(), &[quiet], &default_params());
        assert!(node.reduction_db().abs() < 1e-3);
        assert!((node.output().channel(0)[QUANTUM - 1] - 0.01).abs() < 1e-4);
    }

    #[test]
    fn attack_slews_the_reduction() {
        let mut params = default_params();
        params[params::compressor::ATTACK] = param_bus(0.05);

        let mut node = CompressorNode::new(QUANTUM);
        node.process(&ctx(), &[loud_input()], &params);
        // With a 50 ms attack, one 128-frame quantum is nowhere near settled.
        assert!(node.reduction_db() > -18.0);
        assert!(node.reduction_db() < -0.1);
    }

    #[test]
    fn soft_knee_reduces_less_at_threshold() {
        let hard = reduction_for(-24.0, -24.0, 0.0, 4.0);
        let soft = reduction_for(-24.0, -24.0, 12.0, 4.0);
        assert_eq!(hard, 0.0);
        assert!(soft > 0.0);
        assert!(soft < 2.0);
    }

    #[test]
    fn knee_converges_to_hard_curve_far_above_threshold() {
        let hard = reduction_for(0.0, -24.0, 0.0, 4.0);
        let soft = reduction_for(0.0, -24.0, 12.0, 4.0);
        assert!((hard - soft).abs() < 1e-5);
    }
}
