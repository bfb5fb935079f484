use num_complex::Complex32;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps the `rustfft` planner for reuse across traces of one length.
#[derive(Clone)]
pub struct FftHelper {
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        Self {
            forward,
            inverse,
            size,
        }
    }

    pub fn forward(&self, input: &[f32]) -> Vec<Complex32> {
        let mut buffer = self.load(input);
        self.forward.process(&mut buffer);
        buffer
    }

    /// Analytic signal of `input`: the real part reproduces the input, the
    /// imaginary part is its Hilbert transform.
    pub fn analytic(&self, input: &[f32]) -> Vec<Complex32> {
        let n = self.size;
        if n == 0 {
            return Vec::new();
        }

        let mut buffer = self.forward(input);
        for (k, bin) in buffer.iter_mut().enumerate() {
            let weight: f32 = if k == 0 || (n % 2 == 0 && k == n / 2) {
                1.0
            } else if k < (n + 1) / 2 {
                2.0
            } else {
                0.0
            };
            *bin *= weight;
        }

        self.inverse.process(&mut buffer);
        let scale = 1.0 / n as f32;
        for value in buffer.iter_mut() {
            *value *= scale;
        }
        buffer.truncate(input.len());
        buffer
    }

    fn load(&self, input: &[f32]) -> Vec<Complex32> {
        let mut buffer: Vec<Complex32> = input
            .iter()
            .take(self.size)
            .map(|&value| Complex32::new(value, 0.0))
            .collect();
        buffer.resize(self.size, Complex32::zero());
        buffer
    }
}
