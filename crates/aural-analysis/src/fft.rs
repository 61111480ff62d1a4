//! FFT wrapper with windowing functions.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{FftPlanner, num_complex::Complex};

/// Window function types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Rectangular (no windowing)
    Rectangular,
    /// Hann window (raised cosine)
    Hann,
    /// Blackman window
    Blackman,
}

impl Window {
    /// Apply the window to a buffer in place.
    pub fn apply(&self, buffer: &mut [f32]) {
        let n = buffer.len();
        match self {
            Window::Rectangular => {}
            Window::Hann => {
                for (i, sample) in buffer.iter_mut().enumerate() {
                    let w = 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos());
                    *sample *= w;
                }
            }
            Window::Blackman => {
                for (i, sample) in buffer.iter_mut().enumerate() {
                    let x = 2.0 * PI * i as f32 / n as f32;
                    let w = 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos();
                    *sample *= w;
                }
            }
        }
    }

    /// Get the window coefficients for a given size.
    pub fn coefficients(&self, size: usize) -> Vec<f32> {
        let mut coeffs = vec![1.0; size];
        self.apply(&mut coeffs);
        coeffs
    }
}

/// Forward FFT processor with a cached plan.
pub struct Fft {
    planner: FftPlanner<f32>,
    fft: Arc<dyn rustfft::Fft<f32>>,
    size: usize,
    scratch: Vec<Complex<f32>>,
}

impl Fft {
    /// Create a new FFT processor for the given size.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        Self {
            planner,
            fft,
            size,
            scratch: vec![Complex::new(0.0, 0.0); size],
        }
    }

    /// Get the FFT size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Resize the FFT (creates a new plan if the size changed).
    pub fn resize(&mut self, size: usize) {
        if size != self.size {
            self.fft = self.planner.plan_fft_forward(size);
            self.size = size;
            self.scratch.resize(size, Complex::new(0.0, 0.0));
        }
    }

    /// Forward FFT of real input.
    ///
    /// Input shorter than the FFT size is zero-padded, longer input is
    /// truncated. Writes the positive-frequency bin magnitudes (DC to
    /// Nyquist, `size/2 + 1` bins) into `magnitudes`, normalized by the
    /// FFT size. Extra entries in `magnitudes` are left untouched.
    pub fn forward_magnitudes(&mut self, input: &[f32], magnitudes: &mut [f32]) {
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let re = input.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(re, 0.0);
        }

        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.size as f32;
        let bins = (self.size / 2 + 1).min(magnitudes.len());
        for (slot, bin) in magnitudes[..bins].iter_mut().zip(self.scratch.iter()) {
            *slot = bin.norm() * scale;
        }
    }
}
