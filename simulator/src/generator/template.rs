use std::f32::consts::PI;

/// Gaussian-windowed tone burst centred on `t = 0`. `cycles` sets the width of
/// the envelope in periods of `center_frequency`.
pub fn gaussian_pulse(t: f32, center_frequency: f32, cycles: f32) -> f32 {
    let sigma = cycles / (2.0 * center_frequency);
    (-t * t / (2.0 * sigma * sigma)).exp() * (2.0 * PI * center_frequency * t).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_peaks_at_zero_and_decays() {
        assert_eq!(gaussian_pulse(0.0, 20e6, 1.5), 1.0);
        assert!(gaussian_pulse(5e-7, 20e6, 1.5).abs() < 1e-6);
    }
}
