//! Delay line, the cycle-capable node.
//!
//! In an acyclic position the delay processes normally: write the input,
//! read back `delay_time` seconds (fractional, linearly interpolated).
//! When the compiler finds the node inside a feedback cycle it splits it
//! into two processing-order entries sharing this one instance: the
//! *reader* produces output from the ring early in the order, the *writer*
//! consumes the current quantum's input late in the order. The reader's
//! effective delay is floored at one quantum, which is what makes the
//! overall order a DAG.

use crate::bus::{AudioBus, MAX_CHANNELS};
use crate::description::{DelayDesc, params};
use crate::nodes::{RenderContext, connected_input, param_values};

/// Ring-buffer delay with a fixed maximum delay time.
pub struct DelayNode {
    /// One ring per channel; all the same length.
    rings: Vec<Vec<f32>>,
    ring_len: usize,
    write_pos: usize,
    max_delay_frames: f64,
    output: AudioBus,
}

impl DelayNode {
    /// Builds the node. The ring is sized for `max_delay_time` plus one
    /// quantum of headroom at the declared channel count.
    pub fn new(desc: &DelayDesc, sample_rate: f32, quantum_size: usize) -> Self {
        let channels = desc.channels.count.clamp(1, MAX_CHANNELS);
        let max_delay_frames = (desc.max_delay_time.max(0.0) * f64::from(sample_rate)).ceil();
        let ring_len = max_delay_frames as usize + quantum_size + 1;
        Self {
            rings: (0..channels).map(|_| vec![0.0; ring_len]).collect(),
            ring_len,
            write_pos: 0,
            max_delay_frames,
            output: AudioBus::with_capacity(channels, quantum_size, channels),
        }
    }

    pub(crate) fn output(&self) -> &AudioBus {
        &self.output
    }

    fn delay_frames(&self, seconds: f32, sample_rate: f32) -> f64 {
        (f64::from(seconds) * f64::from(sample_rate)).clamp(0.0, self.max_delay_frames)
    }

    fn read_ring(&self, channel: usize, position: f64) -> f32 {
        let len = self.ring_len as f64;
        let wrapped = position.rem_euclid(len);
        let index = wrapped.floor() as usize;
        let next = (index + 1) % self.ring_len;
        let frac = (wrapped - index as f64) as f32;
        let ring = &self.rings[channel];
        ring[index] + (ring[next] - ring[index]) * frac
    }

    /// Ordinary (acyclic) processing: write then read, per sample.
    pub(crate) fn process(&mut self, ctx: &RenderContext, inputs: &[AudioBus], params: &[AudioBus]) {
        let delay_values = param_values(params, params::delay::DELAY_TIME);
        let input = connected_input(inputs, 0);
        let channels = self.rings.len();
        self.output.set_channel_count(channels);

        for offset in 0..ctx.quantum_size {
            let write_pos = (self.write_pos + offset) % self.ring_len;
            let delay = self.delay_frames(delay_values[offset], ctx.sample_rate);
            for channel in 0..channels {
                let sample = input.map_or(0.0, |bus| {
                    bus.channel(channel).get(offset).copied().unwrap_or(0.0)
                });
                self.rings[channel][write_pos] = sample;
                let value = self.read_ring(channel, write_pos as f64 - delay);
                self.output.channel_mut(channel)[offset] = value;
            }
        }
        self.write_pos = (self.write_pos + ctx.quantum_size) % self.ring_len;
    }

    /// Cycle-split writer step: store the current quantum's mixed input.
    ///
    /// Runs after every consumer of the reader's output, so `write_pos`
    /// only advances here.
    pub(crate) fn process_cycle_writer(&mut self, ctx: &RenderContext, inputs: &[AudioBus]) {
        let input = connected_input(inputs, 0);
        for offset in 0..ctx.quantum_size {
            let write_pos = (self.write_pos + offset) % self.ring_len;
            for (channel, ring) in self.rings.iter_mut().enumerate() {
                ring[write_pos] = input.map_or(0.0, |bus| {
                    bus.channel(channel).get(offset).copied().unwrap_or(0.0)
                });
            }
        }
        self.write_pos = (self.write_pos + ctx.quantum_size) % self.ring_len;
    }

    /// Cycle-split reader step: produce output from previous quanta.
    ///
    /// Runs before the writer, so everything at or after `write_pos` is
    /// old data; flooring the delay at one quantum keeps reads behind it.
    pub(crate) fn process_cycle_reader(&mut self, ctx: &RenderContext, params: &[AudioBus]) {
        let delay_values = param_values(params, params::delay::DELAY_TIME);
        let channels = self.rings.len();
        self.output.set_channel_count(channels);

        let min_delay = ctx.quantum_size as f64;
        for offset in 0..ctx.quantum_size {
            let delay = self
                .delay_frames(delay_values[offset], ctx.sample_rate)
                .max(min_delay);
            let position = (self.write_pos + offset) as f64 - delay;
            for channel in 0..channels {
                self.output.channel_mut(channel)[offset] = self.read_ring(channel, position);
            }
        }
    }
}
