//! Source nodes: oscillator, constant, buffer playback, input stream.

use std::sync::Arc;

use aural_registry::SampleBuffer;

use crate::bus::AudioBus;
use crate::description::{
    BufferSourceDesc, ConstantSourceDesc, OscillatorDesc, StreamSourceDesc, Waveform, params,
};
use crate::nodes::{RenderContext, Scheduling, param_values};

/// Converts a detune in cents to a frequency multiplier.
#[inline]
fn detune_multiplier(cents: f32) -> f64 {
    f64::from(cents / 1200.0).exp2()
}

/// Periodic waveform source.
pub struct OscillatorNode {
    waveform: Waveform,
    scheduling: Scheduling,
    /// Normalized phase in [0, 1).
    phase: f64,
    output: AudioBus,
}

impl OscillatorNode {
    /// Builds the node from its description.
    pub fn new(desc: &OscillatorDesc, quantum_size: usize) -> Self {
        Self {
            waveform: desc.waveform,
            scheduling: Scheduling::new(desc.start_frame, desc.stop_frame),
            phase: 0.0,
            output: AudioBus::new(1, quantum_size),
        }
    }

    pub(crate) fn output(&self) -> &AudioBus {
        &self.output
    }

    pub(crate) fn scheduling_mut(&mut self) -> &mut Scheduling {
        &mut self.scheduling
    }

    pub(crate) fn process(&mut self, ctx: &RenderContext, params: &[AudioBus]) {
        let frequency = params[params::oscillator::FREQUENCY].channel(0);
        let detune = params[params::oscillator::DETUNE].channel(0);
        let waveform = self.waveform;
        let scheduling = self.scheduling;
        let sample_rate = f64::from(ctx.sample_rate);
        let out = self.output.channel_mut(0);

        for (offset, sample) in out.iter_mut().enumerate() {
            let frame = ctx.current_frame + offset as u64;
            if !scheduling.is_active(frame) {
                *sample = 0.0;
                continue;
            }
            *sample = waveform_value(waveform, self.phase);
            let freq = f64::from(frequency[offset]) * detune_multiplier(detune[offset]);
            self.phase = (self.phase + freq / sample_rate).rem_euclid(1.0);
        }
    }

    pub(crate) fn apply(&mut self, desc: &OscillatorDesc) {
        self.waveform = desc.waveform;
        // Re-applying a description does not reschedule an already-started
        // source; explicit schedule_start/stop messages do that.
    }
}

fn waveform_value(waveform: Waveform, phase: f64) -> f32 {
    match waveform {
        Waveform::Sine => (phase * std::f64::consts::TAU).sin() as f32,
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Sawtooth => (2.0 * phase - 1.0) as f32,
        Waveform::Triangle => (1.0 - 4.0 * (phase - 0.5).abs()) as f32,
    }
}

/// Constant (DC offset) source.
pub struct ConstantSourceNode {
    scheduling: Scheduling,
    output: AudioBus,
}

impl ConstantSourceNode {
    /// Builds the node from its description.
    pub fn new(desc: &ConstantSourceDesc, quantum_size: usize) -> Self {
        Self {
            scheduling: Scheduling::new(desc.start_frame, desc.stop_frame),
            output: AudioBus::new(1, quantum_size),
        }
    }

    pub(crate) fn output(&self) -> &AudioBus {
        &self.output
    }

    pub(crate) fn scheduling_mut(&mut self) -> &mut Scheduling {
        &mut self.scheduling
    }

    pub(crate) fn process(&mut self, ctx: &RenderContext, params: &[AudioBus]) {
        let offset_values = params[params::constant_source::OFFSET].channel(0);
        let scheduling = self.scheduling;
        let out = self.output.channel_mut(0);

        for (offset, sample) in out.iter_mut().enumerate() {
            let frame = ctx.current_frame + offset as u64;
            *sample = if scheduling.is_active(frame) {
                offset_values[offset]
            } else {
                0.0
            };
        }
    }

    pub(crate) fn apply(&mut self, _desc: &ConstantSourceDesc) {
        // The offset lives in the parameter's automation state.
    }
}

/// Sample-buffer playback source.
///
/// A node whose buffer id did not resolve renders silence; resolution
/// happens at compile time, never on the render thread.
pub struct BufferSourceNode {
    buffer: Option<Arc<SampleBuffer>>,
    scheduling: Scheduling,
    /// Read position in buffer frames.
    position: f64,
    looping: bool,
    loop_start: u64,
    loop_end: u64,
    finished: bool,
    output: AudioBus,
}

impl BufferSourceNode {
    /// Builds the node from its description and the resolved buffer.
    pub fn new(desc: &BufferSourceDesc, buffer: Option<Arc<SampleBuffer>>, quantum_size: usize) -> Self {
        let channels = buffer.as_ref().map_or(1, |b| b.channel_count()).max(1);
        Self {
            buffer,
            scheduling: Scheduling::new(desc.start_frame, desc.stop_frame),
            position: 0.0,
            looping: desc.looping,
            loop_start: desc.loop_start_frame,
            loop_end: desc.loop_end_frame,
            finished: false,
            output: AudioBus::new(channels, quantum_size),
        }
    }

    pub(crate) fn output(&self) -> &AudioBus {
        &self.output
    }

    pub(crate) fn scheduling_mut(&mut self) -> &mut Scheduling {
        &mut self.scheduling
    }

    pub(crate) fn process(&mut self, ctx: &RenderContext, params: &[AudioBus]) {
        let Some(buffer) = self.buffer.clone() else {
            self.output.set_channel_count(1);
            self.output.channel_mut(0).fill(0.0);
            return;
        };

        let channels = buffer.channel_count().max(1);
        self.output.set_channel_count(channels.min(self.output.channel_capacity()));
        let frames = buffer.frames() as f64;
        if frames <= 0.0 {
            for channel in 0..self.output.channel_count() {
                self.output.channel_mut(channel).fill(0.0);
            }
            return;
        }

        let rate_values = params[params::buffer_source::PLAYBACK_RATE].channel(0);
        let detune_values = params[params::buffer_source::DETUNE].channel(0);
        let rate_scale = f64::from(buffer.sample_rate()) / f64::from(ctx.sample_rate);

        let loop_end = if self.loop_end == 0 {
            frames
        } else {
            (self.loop_end as f64).min(frames)
        };
        let loop_start = (self.loop_start as f64).min(loop_end);

        for offset in 0..ctx.quantum_size {
            let frame = ctx.current_frame + offset as u64;
            let silent = self.finished || !self.scheduling.is_active(frame);

            for channel in 0..self.output.channel_count() {
                let sample = if silent {
                    0.0
                } else {
                    read_interpolated(buffer.channel(channel), self.position)
                };
                self.output.channel_mut(channel)[offset] = sample;
            }

            if silent {
                continue;
            }

            let step = f64::from(rate_values[offset])
                * detune_multiplier(detune_values[offset])
                * rate_scale;
            self.position += step;

            if self.looping {
                let span = loop_end - loop_start;
                if span > 0.0 {
                    while self.position >= loop_end {
                        self.position -= span;
                    }
                } else if self.position >= frames {
                    self.position = loop_start;
                }
            } else if self.position >= frames {
                self.finished = true;
            }
        }
    }

    pub(crate) fn apply(&mut self, desc: &BufferSourceDesc) {
        self.looping = desc.looping;
        self.loop_start = desc.loop_start_frame;
        self.loop_end = desc.loop_end_frame;
    }
}

fn read_interpolated(samples: &[f32], position: f64) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let index = position.floor() as usize;
    if index + 1 >= samples.len() {
        return samples.get(index).copied().unwrap_or(0.0);
    }
    let frac = (position - index as f64) as f32;
    samples[index] + (samples[index + 1] - samples[index]) * frac
}

/// Input-stream source.
///
/// The output bus is sized from the registry's stream metadata at build
/// time; device capture is outside the engine, so the node renders silence
/// at the stream's channel layout.
pub struct StreamSourceNode {
    output: AudioBus,
}

impl StreamSourceNode {
    /// Builds the node from its description and the resolved channel count.
    pub fn new(_desc: &StreamSourceDesc, channel_count: usize, quantum_size: usize) -> Self {
        Self {
            output: AudioBus::new(channel_count.max(1), quantum_size),
        }
    }

    pub(crate) fn output(&self) -> &AudioBus {
        &self.output
    }

    pub(crate) fn process(&mut self, _ctx: &RenderContext) {
        for channel in 0..self.output.channel_count() {
            self.output.channel_mut(channel).fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUANTUM: usize = 128;

    fn ctx(frame: u64) -> RenderContext {
        RenderContext {
            sample_rate: 48_000.0,
            quantum_size: QUANTUM,
            current_frame: frame,
        }
    }

    fn param_bus(value: f32) -> AudioBus {
        let mut bus = AudioBus::new(1, QUANTUM);
        bus.channel_mut(0).fill(value);
        bus
    }

    #[test]
    fn oscillator_silent_before_start() {
        let desc = OscillatorDesc {
            waveform: Waveform::Sine,
            frequency: 440.0,
            detune_cents: 0.0,
            start_frame: Some(1_000_000),
            stop_frame: None,
        };
        let mut node = OscillatorNode::new(&desc, QUANTUM);
        let params = vec![param_bus(440.0), param_bus(0.0)];
        node.process(&ctx(0), &params);
        assert!(node.output().channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn oscillator_produces_bounded_waveform() {
        let desc = OscillatorDesc {
            waveform: Waveform::Sine,
            frequency: 440.0,
            detune_cents: 0.0,
            start_frame: Some(0),
            stop_frame: None,
        };
        let mut node = OscillatorNode::new(&desc, QUANTUM);
        let params = vec![param_bus(440.0), param_bus(0.0)];
        node.process(&ctx(0), &params);
        node.process(&ctx(QUANTUM as u64), &params);

        let out = node.output().channel(0);
        assert!(out.iter().all(|s| s.abs() <= 1.0));
        assert!(out.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn oscillator_detune_raises_pitch() {
        // +1200 cents doubles the frequency: after one quantum the phase of
        // the detuned oscillator has advanced twice as far.
        let desc = OscillatorDesc {
            waveform: Waveform::Sawtooth,
            frequency: 100.0,
            detune_cents: 0.0,
            start_frame: Some(0),
            stop_frame: None,
        };
        let mut plain = OscillatorNode::new(&desc, QUANTUM);
        let mut detuned = OscillatorNode::new(&desc, QUANTUM);

        plain.process(&ctx(0), &vec![param_bus(100.0), param_bus(0.0)]);
        detuned.process(&ctx(0), &vec![param_bus(100.0), param_bus(1200.0)]);

        assert!((detuned.phase - 2.0 * plain.phase).abs() < 1e-9);
    }

    #[test]
    fn constant_source_tracks_offset_param() {
        let desc = ConstantSourceDesc {
            offset: 0.5,
            start_frame: Some(0),
            stop_frame: None,
        };
        let mut node = ConstantSourceNode::new(&desc, QUANTUM);
        node.process(&ctx(0), &vec![param_bus(0.5)]);
        assert!(node.output().channel(0).iter().all(|&s| s == 0.5));
    }

    #[test]
    fn buffer_source_plays_and_finishes() {
        let buffer = Arc::new(SampleBuffer::from_mono(vec![1.0; 64], 48_000.0));
        let desc = BufferSourceDesc {
            buffer: Some(0),
            playback_rate: 1.0,
            detune_cents: 0.0,
            looping: false,
            loop_start_frame: 0,
            loop_end_frame: 0,
            start_frame: Some(0),
            stop_frame: None,
        };
        let mut node = BufferSourceNode::new(&desc, Some(buffer), QUANTUM);
        let params = vec![param_bus(1.0), param_bus(0.0)];

        node.process(&ctx(0), &params);
        let out = node.output().channel(0);
        assert!(out[..64].iter().all(|&s| s == 1.0));
        assert!(out[65..].iter().all(|&s| s == 0.0));

        node.process(&ctx(QUANTUM as u64), &params);
        assert!(node.output().channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn buffer_source_loops_over_window() {
        let samples: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let buffer = Arc::new(SampleBuffer::from_mono(samples, 48_000.0));
        let desc = BufferSourceDesc {
            buffer: Some(0),
            playback_rate: 1.0,
            detune_cents: 0.0,
            looping: true,
            loop_start_frame: 2,
            loop_end_frame: 6,
            start_frame: Some(0),
            stop_frame: None,
        };
        let mut node = BufferSourceNode::new(&desc, Some(buffer), QUANTUM);
        let params = vec![param_bus(1.0), param_bus(0.0)];
        node.process(&ctx(0), &params);

        let out = node.output().channel(0);
        // 0 1 2 3 4 5 | 2 3 4 5 | 2 3 ...
        assert_eq!(&out[..6], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(&out[6..10], &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn missing_buffer_renders_silence() {
        let desc = BufferSourceDesc {
            buffer: Some(42),
            playback_rate: 1.0,
            detune_cents: 0.0,
            looping: false,
            loop_start_frame: 0,
            loop_end_frame: 0,
            start_frame: Some(0),
            stop_frame: None,
        };
        let mut node = BufferSourceNode::new(&desc, None, QUANTUM);
        node.process(&ctx(0), &vec![param_bus(1.0), param_bus(0.0)]);
        assert!(node.output().channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn stream_source_uses_metadata_channel_count() {
        let node = StreamSourceNode::new(&StreamSourceDesc { stream: Some(0) }, 4, QUANTUM);
        assert_eq!(node.output().channel_count(), 4);
    }
}
