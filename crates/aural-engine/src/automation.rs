//! Parameter automation evaluation.
//!
//! Each automated parameter owns an [`AutomationState`]: its intrinsic value
//! and clamp range, its rate, its segment timeline and a monotonically
//! advancing cursor. Per quantum the executor asks the state to accumulate
//! the intrinsic contribution into the parameter's scratch bus (on top of
//! any audio-rate modulation already mixed in), then to finalize the
//! computed value: NaN replacement, clamping, and the k-rate hold.
//!
//! Evaluation is done in `f64` and narrowed at the bus boundary.

use crate::description::{AutomationRate, AutomationSegment, ParamAutomation, SegmentShape};

/// Decimal precision of the k-rate hold value: round(v · 1e5) / 1e5.
///
/// Suppresses floating-point jitter across quanta so a held value is
/// bit-identical for the whole quantum sequence of a steady parameter.
const KRATE_PRECISION: f64 = 100_000.0;

/// Live automation state of one (node, parameter) pair.
#[derive(Clone, Debug)]
pub struct AutomationState {
    /// Intrinsic (value-setter) value used when no segment timeline exists.
    pub intrinsic_value: f32,
    /// Replacement for NaN results.
    pub default_value: f32,
    /// Lower clamp bound.
    pub min_value: f32,
    /// Upper clamp bound.
    pub max_value: f32,
    /// Evaluation rate.
    pub rate: AutomationRate,
    /// Time-ordered, non-overlapping segments.
    pub segments: Vec<AutomationSegment>,
    /// Index of the segment covering the most recent frame. Only advances
    /// within one topology's lifetime; resets when the timeline is replaced.
    pub cursor: usize,
}

impl Default for AutomationState {
    fn default() -> Self {
        Self {
            intrinsic_value: 0.0,
            default_value: 0.0,
            min_value: f32::MIN,
            max_value: f32::MAX,
            rate: AutomationRate::ARate,
            segments: Vec::new(),
            cursor: 0,
        }
    }
}

impl AutomationState {
    /// Replaces the timeline and envelope from a description entry,
    /// resetting the cursor.
    pub fn replace_from(&mut self, automation: &ParamAutomation) {
        self.intrinsic_value = automation.intrinsic_value;
        self.default_value = automation.default_value;
        self.min_value = automation.min_value;
        self.max_value = automation.max_value;
        self.rate = automation.rate;
        self.segments = automation.segments.clone();
        self.cursor = 0;
    }

    /// Clears the timeline, resetting the cursor. Intrinsic value and clamp
    /// range are left in place.
    pub fn clear_segments(&mut self) {
        self.segments.clear();
        self.cursor = 0;
    }

    /// Accumulates the intrinsic/automation contribution for one quantum
    /// into `out`, starting at `start_frame`.
    ///
    /// With no segments the intrinsic value applies to every sample. With
    /// segments, the timeline supersedes the intrinsic value: a-rate
    /// parameters are evaluated per sample (the cursor advancing as frame
    /// boundaries are crossed), k-rate parameters once at the quantum's
    /// first frame.
    pub fn accumulate_intrinsic(&mut self, out: &mut [f32], start_frame: u64, sample_rate: f32) {
        if self.segments.is_empty() {
            for sample in out.iter_mut() {
                *sample += self.intrinsic_value;
            }
            return;
        }

        self.advance_cursor(start_frame);

        match self.rate {
            AutomationRate::KRate => {
                let segment = &self.segments[self.cursor.min(self.segments.len() - 1)];
                let value = evaluate_segment(segment, start_frame, sample_rate);
                for sample in out.iter_mut() {
                    *sample += value;
                }
            }
            AutomationRate::ARate => {
                for (offset, sample) in out.iter_mut().enumerate() {
                    let frame = start_frame + offset as u64;
                    self.advance_cursor(frame);
                    let segment = &self.segments[self.cursor.min(self.segments.len() - 1)];
                    *sample += evaluate_segment(segment, frame, sample_rate);
                }
            }
        }
    }

    /// Finalizes a computed-value bus: NaN → default, clamp to
    /// `[min, max]`, and for k-rate parameters hold the first-frame value
    /// (rounded to the fixed precision) for the whole quantum.
    pub fn finalize(&self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            if sample.is_nan() {
                *sample = self.default_value;
            }
            *sample = sample.clamp(self.min_value, self.max_value);
        }

        if self.rate == AutomationRate::KRate
            && let Some(&first) = out.first()
        {
            let held = ((f64::from(first) * KRATE_PRECISION).round() / KRATE_PRECISION) as f32;
            out.fill(held);
        }
    }

    fn advance_cursor(&mut self, frame: u64) {
        while self.cursor + 1 < self.segments.len() && self.segments[self.cursor].end_frame <= frame
        {
            self.cursor += 1;
        }
    }
}

/// Evaluates one segment at an absolute frame.
///
/// Before the interval the start value applies, at or after its end the end
/// value; inside, the segment's shape interpolates.
pub fn evaluate_segment(segment: &AutomationSegment, frame: u64, sample_rate: f32) -> f32 {
    let sample_time = frame as f64 / f64::from(sample_rate);
    if sample_time <= segment.start_time {
        return segment.start_value;
    }
    if sample_time >= segment.end_time {
        return segment.end_value;
    }

    let span = segment.end_time - segment.start_time;
    let pos = if span > 0.0 {
        ((sample_time - segment.start_time) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };

    match &segment.shape {
        SegmentShape::Constant => segment.start_value,
        SegmentShape::LinearRamp => {
            let start = f64::from(segment.start_value);
            let end = f64::from(segment.end_value);
            (start + (end - start) * pos) as f32
        }
        SegmentShape::ExponentialRamp => {
            if segment.start_value <= 0.0 || segment.end_value <= 0.0 {
                return segment.end_value;
            }
            let ratio = f64::from(segment.end_value) / f64::from(segment.start_value);
            (f64::from(segment.start_value) * ratio.powf(pos)) as f32
        }
        SegmentShape::Target {
            time_constant,
            target,
        } => {
            if *time_constant <= 0.0 {
                return *target;
            }
            let dt = sample_time - segment.start_time;
            let k = (-dt / time_constant).exp();
            (f64::from(*target) + (f64::from(segment.start_value) - f64::from(*target)) * k) as f32
        }
        SegmentShape::ValueCurve {
            samples,
            start_time,
            duration,
        } => {
            if samples.is_empty() {
                return segment.start_value;
            }
            if samples.len() == 1 {
                return samples[0];
            }
            let curve_duration = if *duration > 0.0 {
                *duration
            } else {
                (segment.end_time - segment.start_time).max(0.0)
            };
            let curve_pos = if curve_duration > 0.0 {
                ((sample_time - start_time) / curve_duration).clamp(0.0, 1.0)
            } else {
                pos
            };
            let scaled = curve_pos * (samples.len() - 1) as f64;
            let index = scaled.floor() as usize;
            let next = (index + 1).min(samples.len() - 1);
            let frac = scaled - index as f64;
            (f64::from(samples[index]) + (f64::from(samples[next]) - f64::from(samples[index])) * frac)
                as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RATE: f32 = 48_000.0;

    fn linear_ramp(start_value: f32, end_value: f32, seconds: f64) -> AutomationSegment {
        AutomationSegment::new(
            SegmentShape::LinearRamp,
            0.0,
            seconds,
            start_value,
            end_value,
            f64::from(RATE),
        )
    }

    fn state_with(segments: Vec<AutomationSegment>, rate: AutomationRate) -> AutomationState {
        AutomationState {
            rate,
            segments,
            ..AutomationState::default()
        }
    }

    #[test]
    fn linear_ramp_midpoint() {
        let segment = linear_ramp(0.0, 1.0, 1.0);
        let mid = evaluate_segment(&segment, RATE as u64 / 2, RATE);
        assert!((mid - 0.5).abs() < 1e-4);
    }

    #[test]
    fn values_are_held_outside_the_interval() {
        let segment = AutomationSegment::new(
            SegmentShape::LinearRamp,
            1.0,
            2.0,
            10.0,
            20.0,
            f64::from(RATE),
        );
        assert_eq!(evaluate_segment(&segment, 0, RATE), 10.0);
        assert_eq!(evaluate_segment(&segment, 3 * RATE as u64, RATE), 20.0);
    }

    #[test]
    fn exponential_ramp_is_geometric() {
        let segment = AutomationSegment::new(
            SegmentShape::ExponentialRamp,
            0.0,
            1.0,
            1.0,
            100.0,
            f64::from(RATE),
        );
        let mid = evaluate_segment(&segment, RATE as u64 / 2, RATE);
        assert!((mid - 10.0).abs() < 0.01);
    }

    #[test]
    fn exponential_ramp_degenerates_on_nonpositive_endpoint() {
        let segment = AutomationSegment::new(
            SegmentShape::ExponentialRamp,
            0.0,
            1.0,
            0.0,
            100.0,
            f64::from(RATE),
        );
        assert_eq!(evaluate_segment(&segment, RATE as u64 / 2, RATE), 100.0);
    }

    #[test]
    fn target_converges_within_five_time_constants() {
        let tau = 0.1;
        let segment = AutomationSegment::new(
            SegmentShape::Target {
                time_constant: tau,
                target: 2.0,
            },
            0.0,
            10.0,
            0.0,
            2.0,
            f64::from(RATE),
        );
        let frame = (5.0 * tau * f64::from(RATE)) as u64;
        let value = evaluate_segment(&segment, frame, RATE);
        assert!((value - 2.0).abs() < 0.02, "value after 5 tau: {value}");
    }

    #[test]
    fn target_with_nonpositive_time_constant_jumps() {
        let segment = AutomationSegment::new(
            SegmentShape::Target {
                time_constant: 0.0,
                target: 5.0,
            },
            0.0,
            1.0,
            0.0,
            5.0,
            f64::from(RATE),
        );
        assert_eq!(evaluate_segment(&segment, 1, RATE), 5.0);
    }

    #[test]
    fn value_curve_endpoints_and_interior() {
        let segment = AutomationSegment::new(
            SegmentShape::ValueCurve {
                samples: vec![0.0, 1.0, 0.0],
                start_time: 0.0,
                duration: 1.0,
            },
            0.0,
            1.0,
            0.0,
            0.0,
            f64::from(RATE),
        );
        let quarter = evaluate_segment(&segment, RATE as u64 / 4, RATE);
        assert!((quarter - 0.5).abs() < 1e-3);
        let mid = evaluate_segment(&segment, RATE as u64 / 2, RATE);
        assert!((mid - 1.0).abs() < 1e-3);
    }

    #[test]
    fn empty_timeline_contributes_intrinsic() {
        let mut state = AutomationState {
            intrinsic_value: 0.75,
            ..AutomationState::default()
        };
        let mut out = vec![0.0; 8];
        state.accumulate_intrinsic(&mut out, 0, RATE);
        assert!(out.iter().all(|&v| v == 0.75));
    }

    #[test]
    fn krate_holds_first_frame_value_bit_identically() {
        let mut state = state_with(vec![linear_ramp(0.0, 1.0, 1.0)], AutomationRate::KRate);
        let mut out = vec![0.0; 128];
        let start = RATE as u64 / 4;
        state.accumulate_intrinsic(&mut out, start, RATE);
        state.finalize(&mut out);

        let first = out[0];
        assert!(out.iter().all(|&v| v.to_bits() == first.to_bits()));
    }

    #[test]
    fn krate_rounding_is_stable() {
        let mut state = state_with(vec![linear_ramp(0.0, 1.0, 1.0)], AutomationRate::KRate);
        let mut out = vec![0.0; 4];
        state.accumulate_intrinsic(&mut out, RATE as u64 / 2, RATE);
        state.finalize(&mut out);
        assert!((out[0] - 0.5).abs() < 1e-5);
        // Quantized to 1e-5 steps.
        let scaled = f64::from(out[0]) * 100_000.0;
        assert!((scaled - scaled.round()).abs() < 1e-3);
    }

    #[test]
    fn finalize_replaces_nan_and_clamps() {
        let state = AutomationState {
            default_value: 0.25,
            min_value: 0.0,
            max_value: 1.0,
            ..AutomationState::default()
        };
        let mut out = vec![f32::NAN, 4.0, -3.0, 0.5];
        state.finalize(&mut out);
        assert_eq!(out, vec![0.25, 1.0, 0.0, 0.5]);
    }

    #[test]
    fn cursor_advances_monotonically_across_quanta() {
        let first = AutomationSegment::new(
            SegmentShape::Constant,
            0.0,
            0.5,
            1.0,
            1.0,
            f64::from(RATE),
        );
        let second = AutomationSegment::new(
            SegmentShape::Constant,
            0.5,
            1.0,
            2.0,
            2.0,
            f64::from(RATE),
        );
        let mut state = state_with(vec![first, second], AutomationRate::ARate);

        let mut out = vec![0.0; 4];
        state.accumulate_intrinsic(&mut out, 0, RATE);
        assert_eq!(state.cursor, 0);

        out.fill(0.0);
        state.accumulate_intrinsic(&mut out, RATE as u64, RATE);
        assert_eq!(state.cursor, 1);
        assert!(out.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn replace_from_resets_cursor() {
        let mut state = state_with(
            vec![linear_ramp(0.0, 1.0, 0.001), linear_ramp(1.0, 0.0, 0.001)],
            AutomationRate::ARate,
        );
        let mut out = vec![0.0; 256];
        state.accumulate_intrinsic(&mut out, 0, RATE);
        assert!(state.cursor > 0);

        let automation = ParamAutomation {
            destination: crate::description::NodeId(0),
            destination_param_index: 0,
            intrinsic_value: 1.0,
            default_value: 1.0,
            min_value: 0.0,
            max_value: 2.0,
            rate: AutomationRate::ARate,
            segments: vec![linear_ramp(0.0, 2.0, 1.0)],
        };
        state.replace_from(&automation);
        assert_eq!(state.cursor, 0);
        assert_eq!(state.segments.len(), 1);
    }

    proptest! {
        #[test]
        fn linear_ramp_stays_within_endpoints(frame in 0u64..96_000) {
            let segment = linear_ramp(-1.0, 1.0, 2.0);
            let value = evaluate_segment(&segment, frame, RATE);
            prop_assert!((-1.0..=1.0).contains(&value));
        }

        #[test]
        fn target_never_overshoots(frame in 0u64..480_000, tau in 0.001f64..1.0) {
            let segment = AutomationSegment::new(
                SegmentShape::Target { time_constant: tau, target: 1.0 },
                0.0,
                10.0,
                0.0,
                1.0,
                f64::from(RATE),
            );
            let value = evaluate_segment(&segment, frame, RATE);
            prop_assert!((0.0..=1.0 + 1e-6).contains(&value));
        }

        #[test]
        fn evaluation_is_deterministic(frame in 0u64..96_000) {
            let segment = linear_ramp(0.0, 1.0, 1.5);
            let a = evaluate_segment(&segment, frame, RATE);
            let b = evaluate_segment(&segment, frame, RATE);
            prop_assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}
