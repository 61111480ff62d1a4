//! Spectral helpers for the aural engine's analyser probe.
//!
//! A thin layer over `rustfft`: window functions, a cached forward-FFT
//! plan for real input, and magnitude-to-decibel conversion. The analyser
//! render node feeds its time-domain ring buffer through these to produce
//! the frequency-domain snapshots exposed by the graph executor.

mod fft;
mod spectrum;

pub use fft::{Fft, Window};
pub use spectrum::{magnitude_to_db, power_spectrum_db};
