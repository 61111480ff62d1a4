//! Magnitude-to-decibel conversion for spectrum readouts.

/// Floor applied to magnitudes before taking the log, in linear terms.
///
/// Keeps silent bins at a finite dB value instead of negative infinity.
const MAGNITUDE_FLOOR: f32 = 1.0e-10;

/// Converts a linear magnitude to decibels, floored at the silence level.
#[inline]
pub fn magnitude_to_db(magnitude: f32) -> f32 {
    20.0 * magnitude.max(MAGNITUDE_FLOOR).log10()
}

/// Converts a slice of linear magnitudes to decibels in place.
pub fn power_spectrum_db(magnitudes: &mut [f32]) {
    for magnitude in magnitudes.iter_mut() {
        *magnitude = magnitude_to_db(*magnitude);
    }
}
