//! Channel up/down-mixing.
//!
//! Implements the two mixing interpretations used at every graph edge:
//! "speakers" (standard layout matrices for mono/stereo/quad/5.1) and
//! "discrete" (channel-index-aligned sum). All functions accumulate into
//! the destination; the caller zeroes the destination bus and fixes its
//! channel count first.
//!
//! 5.1 channel order is `[L, R, C, LFE, SL, SR]`. The LFE channel does not
//! contribute to down-mixes.

use crate::bus::{AudioBus, MAX_CHANNELS};
use crate::description::{ChannelCountMode, ChannelInterpretation};

const SQRT_HALF: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Resolves a node's mixed-input channel count from its settings and the
/// widest connected input. Floored at 1, capped at [`MAX_CHANNELS`].
pub fn computed_channel_count(
    mode: ChannelCountMode,
    declared_count: usize,
    max_input_channels: usize,
) -> usize {
    let declared = declared_count.clamp(1, MAX_CHANNELS);
    let max_input = max_input_channels.clamp(1, MAX_CHANNELS);
    match mode {
        ChannelCountMode::Max => max_input,
        ChannelCountMode::ClampedMax => max_input.min(declared),
        ChannelCountMode::Explicit => declared,
    }
}

/// Accumulates one source bus into the destination using the given
/// interpretation. A zero-channel source contributes nothing.
pub fn mix_bus_into(destination: &mut AudioBus, source: &AudioBus, interpretation: ChannelInterpretation) {
    if source.channel_count() == 0 || destination.channel_count() == 0 {
        return;
    }
    match interpretation {
        ChannelInterpretation::Speakers => mix_speakers(destination, source),
        ChannelInterpretation::Discrete => mix_discrete(destination, source),
    }
}

/// Channel-index-aligned sum. Source channels beyond the destination count
/// are dropped; destination channels beyond the source count are left
/// untouched.
fn mix_discrete(destination: &mut AudioBus, source: &AudioBus) {
    let shared = destination.channel_count().min(source.channel_count());
    for channel in 0..shared {
        accumulate(destination.channel_mut(channel), source.channel(channel));
    }
}

/// Speaker-layout up/down-mix. Pairings outside the standard layouts
/// (mono/stereo/quad/5.1) fall back to discrete semantics.
fn mix_speakers(destination: &mut AudioBus, source: &AudioBus) {
    let src = source.channel_count();
    let dst = destination.channel_count();

    if src == dst {
        for channel in 0..src {
            accumulate(destination.channel_mut(channel), source.channel(channel));
        }
        return;
    }

    match (src, dst) {
        (1, 2) | (1, 4) => {
            accumulate(destination.channel_mut(0), source.channel(0));
            accumulate(destination.channel_mut(1), source.channel(0));
        }
        (1, 6) => {
            // Mono feeds the center channel.
            accumulate(destination.channel_mut(2), source.channel(0));
        }
        (2, 1) => {
            accumulate_scaled(destination.channel_mut(0), source.channel(0), 0.5);
            accumulate_scaled(destination.channel_mut(0), source.channel(1), 0.5);
        }
        (2, 4) | (2, 6) => {
            accumulate(destination.channel_mut(0), source.channel(0));
            accumulate(destination.channel_mut(1), source.channel(1));
        }
        (4, 1) => {
            for channel in 0..4 {
                accumulate_scaled(destination.channel_mut(0), source.channel(channel), 0.25);
            }
        }
        (4, 2) => {
            accumulate(destination.channel_mut(0), source.channel(0));
            accumulate_scaled(destination.channel_mut(0), source.channel(2), 0.5);
            accumulate(destination.channel_mut(1), source.channel(1));
            accumulate_scaled(destination.channel_mut(1), source.channel(3), 0.5);
        }
        (4, 6) => {
            accumulate(destination.channel_mut(0), source.channel(0));
            accumulate(destination.channel_mut(1), source.channel(1));
            accumulate(destination.channel_mut(4), source.channel(2));
            accumulate(destination.channel_mut(5), source.channel(3));
        }
        (6, 1) => {
            accumulate_scaled(destination.channel_mut(0), source.channel(0), SQRT_HALF);
            accumulate_scaled(destination.channel_mut(0), source.channel(1), SQRT_HALF);
            accumulate(destination.channel_mut(0), source.channel(2));
            accumulate_scaled(destination.channel_mut(0), source.channel(4), 0.5);
            accumulate_scaled(destination.channel_mut(0), source.channel(5), 0.5);
        }
        (6, 2) => {
            accumulate(destination.channel_mut(0), source.channel(0));
            accumulate_scaled(destination.channel_mut(0), source.channel(2), SQRT_HALF);
            accumulate_scaled(destination.channel_mut(0), source.channel(4), 0.5);
            accumulate(destination.channel_mut(1), source.channel(1));
            accumulate_scaled(destination.channel_mut(1), source.channel(2), SQRT_HALF);
            accumulate_scaled(destination.channel_mut(1), source.channel(5), 0.5);
        }
        (6, 4) => {
            accumulate(destination.channel_mut(0), source.channel(0));
            accumulate_scaled(destination.channel_mut(0), source.channel(2), SQRT_HALF);
            accumulate(destination.channel_mut(1), source.channel(1));
            accumulate_scaled(destination.channel_mut(1), source.channel(2), SQRT_HALF);
            accumulate(destination.channel_mut(2), source.channel(4));
            accumulate(destination.channel_mut(3), source.channel(5));
        }
        _ => mix_discrete(destination, source),
    }
}

#[inline]
fn accumulate(destination: &mut [f32], source: &[f32]) {
    for (dst, src) in destination.iter_mut().zip(source.iter()) {
        *dst += *src;
    }
}

#[inline]
fn accumulate_scaled(destination: &mut [f32], source: &[f32], gain: f32) {
    for (dst, src) in destination.iter_mut().zip(source.iter()) {
        *dst += *src * gain;
    }
}
