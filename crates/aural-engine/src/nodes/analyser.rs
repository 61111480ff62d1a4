//! Analysis probe node.
//!
//! Passes its input through unchanged while keeping a mono ring buffer of
//! recent samples. On demand (not per quantum) the executor pulls
//! time-domain or Blackman-windowed frequency-domain snapshots; frequency
//! magnitudes are exponentially smoothed across snapshots before dB
//! conversion.

use aural_analysis::{Fft, Window, magnitude_to_db};

use crate::bus::{AudioBus, MAX_CHANNELS};
use crate::description::{AnalyserDesc, ChannelInterpretation};
use crate::mixing::mix_bus_into;
use crate::nodes::{RenderContext, connected_input};

/// Valid FFT size range.
const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32_768;

fn clamp_fft_size(requested: usize) -> usize {
    requested.next_power_of_two().clamp(MIN_FFT_SIZE, MAX_FFT_SIZE)
}

/// Pass-through probe with time/frequency snapshot support.
pub struct AnalyserNode {
    ring: Vec<f32>,
    write_pos: usize,
    fft: Fft,
    window: Vec<f32>,
    smoothing: f32,
    smoothed: Vec<f32>,
    scratch_time: Vec<f32>,
    scratch_mags: Vec<f32>,
    mono: AudioBus,
    output: AudioBus,
}

impl AnalyserNode {
    /// Builds the node from its description.
    pub fn new(desc: &AnalyserDesc, quantum_size: usize) -> Self {
        let fft_size = clamp_fft_size(desc.fft_size);
        let bins = fft_size / 2 + 1;
        Self {
            ring: vec![0.0; fft_size],
            write_pos: 0,
            fft: Fft::new(fft_size),
            window: Window::Blackman.coefficients(fft_size),
            smoothing: desc.smoothing.clamp(0.0, 0.9999),
            smoothed: vec![0.0; bins],
            scratch_time: vec![0.0; fft_size],
            scratch_mags: vec![0.0; bins],
            mono: AudioBus::new(1, quantum_size),
            output: AudioBus::with_capacity(0, quantum_size, MAX_CHANNELS),
        }
    }

    pub(crate) fn output(&self) -> &AudioBus {
        &self.output
    }

    /// FFT size currently in effect.
    pub fn fft_size(&self) -> usize {
        self.ring.len()
    }

    pub(crate) fn process(&mut self, _ctx: &RenderContext, inputs: &[AudioBus]) {
        let Some(input) = connected_input(inputs, 0) else {
            self.output.set_channel_count(0);
            // The ring keeps advancing with silence so snapshots decay.
            let frames = self.mono.frames();
            for _ in 0..frames {
                self.ring[self.write_pos] = 0.0;
                self.write_pos = (self.write_pos + 1) % self.ring.len();
            }
            return;
        };

        // Pass-through.
        self.output.copy_from(input);

        // Track the speaker down-mix to mono in the ring.
        self.mono.set_channel_count(1);
        self.mono.channel_mut(0).fill(0.0);
        mix_bus_into(&mut self.mono, input, ChannelInterpretation::Speakers);
        for &sample in self.mono.channel(0) {
            self.ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.ring.len();
        }
    }

    pub(crate) fn apply(&mut self, desc: &AnalyserDesc) {
        // Resizing the FFT allocates; on the real-time path only the
        // smoothing constant may change. Offline applies handle resizes.
        self.smoothing = desc.smoothing.clamp(0.0, 0.9999);
    }

    pub(crate) fn apply_offline(&mut self, desc: &AnalyserDesc) {
        self.smoothing = desc.smoothing.clamp(0.0, 0.9999);
        let fft_size = clamp_fft_size(desc.fft_size);
        if fft_size != self.ring.len() {
            let bins = fft_size / 2 + 1;
            self.ring = vec![0.0; fft_size];
            self.write_pos = 0;
            self.fft.resize(fft_size);
            self.window = Window::Blackman.coefficients(fft_size);
            self.smoothed = vec![0.0; bins];
            self.scratch_time = vec![0.0; fft_size];
            self.scratch_mags = vec![0.0; bins];
        }
    }

    /// Copies the most recent time-domain samples (oldest first) into
    /// `out`. `out` longer than the FFT size is zero-padded at the front.
    pub fn copy_time_domain(&self, out: &mut [f32]) {
        let take = out.len().min(self.ring.len());
        let pad = out.len() - take;
        out[..pad].fill(0.0);
        for (slot, index) in out[pad..].iter_mut().zip(0..take) {
            let ring_pos = (self.write_pos + self.ring.len() - take + index) % self.ring.len();
            *slot = self.ring[ring_pos];
        }
    }

    /// Computes the smoothed frequency spectrum in dB into `out`
    /// (`fft_size / 2 + 1` bins; extra entries are left untouched).
    pub fn copy_frequency_db(&mut self, out: &mut [f32]) {
        self.copy_time_domain_into_scratch();
        for (sample, &coeff) in self.scratch_time.iter_mut().zip(self.window.iter()) {
            *sample *= coeff;
        }
        self.fft.forward_magnitudes(&self.scratch_time, &mut self.scratch_mags);

        let tau = self.smoothing;
        for (smoothed, &magnitude) in self.smoothed.iter_mut().zip(self.scratch_mags.iter()) {
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;
        }
        for (slot, &smoothed) in out.iter_mut().zip(self.smoothed.iter()) {
            *slot = magnitude_to_db(smoothed);
        }
    }

    fn copy_time_domain_into_scratch(&mut self) {
        let len = self.ring.len();
        for index in 0..len {
            let ring_pos = (self.write_pos + index) % len;
            self.scratch_time[index] = self.ring[ring_pos];
        }
    }
}
