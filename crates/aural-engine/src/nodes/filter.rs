//! Biquad filter node.
//!
//! Direct Form I biquad per channel, coefficients from the RBJ Audio EQ
//! Cookbook. Coefficients are recomputed once per quantum from the
//! parameters' first-frame values; the per-channel state keeps running
//! across recomputations.

use crate::bus::{AudioBus, MAX_CHANNELS};
use crate::description::{BiquadFilterDesc, FilterKind, params};
use crate::nodes::{RenderContext, connected_input, param_values};

/// Second-order IIR section: coefficients plus delay-line state.
#[derive(Clone, Copy, Default)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    fn set_coefficients(&mut self, b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) {
        let a0_inv = 1.0 / a0;
        self.b0 = b0 * a0_inv;
        self.b1 = b1 * a0_inv;
        self.b2 = b2 * a0_inv;
        self.a1 = a1 * a0_inv;
        self.a2 = a2 * a0_inv;
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// Multi-channel biquad filter.
pub struct BiquadFilterNode {
    kind: FilterKind,
    sections: Vec<Biquad>,
    /// (frequency, q, gain_db) the current coefficients were computed for.
    tuned_for: Option<(f32, f32, f32)>,
    output: AudioBus,
}

impl BiquadFilterNode {
    /// Builds the node. Sections cover the full channel capacity so channel
    /// count changes never allocate.
    pub fn new(desc: &BiquadFilterDesc, quantum_size: usize) -> Self {
        Self {
            kind: desc.kind,
            sections: vec![Biquad::default(); MAX_CHANNELS],
            tuned_for: None,
            output: AudioBus::with_capacity(0, quantum_size, MAX_CHANNELS),
        }
    }

    pub(crate) fn output(&self) -> &AudioBus {
        &self.output
    }

    pub(crate) fn apply(&mut self, desc: &BiquadFilterDesc) {
        if self.kind != desc.kind {
            self.kind = desc.kind;
            self.tuned_for = None;
        }
    }

    pub(crate) fn process(&mut self, ctx: &RenderContext, inputs: &[AudioBus], params: &[AudioBus]) {
        let Some(input) = connected_input(inputs, 0) else {
            self.output.set_channel_count(0);
            return;
        };

        let frequency = param_values(params, params::biquad::FREQUENCY)
            .first()
            .copied()
            .unwrap_or(350.0);
        let q = param_values(params, params::biquad::Q)
            .first()
            .copied()
            .unwrap_or(std::f32::consts::FRAC_1_SQRT_2);
        let gain_db = param_values(params, params::biquad::GAIN_DB)
            .first()
            .copied()
            .unwrap_or(0.0);

        if self.tuned_for != Some((frequency, q, gain_db)) {
            self.retune(frequency, q, gain_db, ctx.sample_rate);
        }

        self.output.set_channel_count(input.channel_count());
        for channel in 0..self.output.channel_count() {
            let section = &mut self.sections[channel];
            let source = input.channel(channel);
            for (out, &sample) in self.output.channel_mut(channel).iter_mut().zip(source.iter()) {
                *out = section.process(sample);
            }
        }
    }

    fn retune(&mut self, frequency: f32, q: f32, gain_db: f32, sample_rate: f32) {
        let nyquist = sample_rate * 0.5;
        let freq = frequency.clamp(1.0, nyquist - 1.0);
        let q = q.max(1.0e-4);
        let w0 = std::f32::consts::TAU * freq / sample_rate;
        let cw = w0.cos();
        let sw = w0.sin();
        let alpha = sw / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match self.kind {
            FilterKind::Lowpass => {
                let b1 = 1.0 - cw;
                (b1 * 0.5, b1, b1 * 0.5, 1.0 + alpha, -2.0 * cw, 1.0 - alpha)
            }
            FilterKind::Highpass => {
                let peak = 1.0 + cw;
                (peak * 0.5, -peak, peak * 0.5, 1.0 + alpha, -2.0 * cw, 1.0 - alpha)
            }
            FilterKind::Bandpass => (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cw, 1.0 - alpha),
            FilterKind::Notch => (1.0, -2.0 * cw, 1.0, 1.0 + alpha, -2.0 * cw, 1.0 - alpha),
            FilterKind::Peaking => {
                let a = 10.0f32.powf(gain_db / 40.0);
                (
                    1.0 + alpha * a,
                    -2.0 * cw,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cw,
                    1.0 - alpha / a,
                )
            }
        };

        for section in &mut self.sections {
            section.set_coefficients(b0, b1, b2, a0, a1, a2);
        }
        self.tuned_for = Some((frequency, q, gain_db));
    }
}
