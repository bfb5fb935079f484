pub struct StatsHelper;

impl StatsHelper {
    /// Arithmetic mean accumulated in double precision. Empty input yields 0.
    pub fn mean(samples: &[f32]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = samples.iter().map(|&v| v as f64).sum();
        sum / samples.len() as f64
    }

    /// Subtracts the mean in place and returns the removed offset.
    pub fn remove_mean(samples: &mut [f32]) -> f64 {
        let mean = Self::mean(samples);
        for value in samples.iter_mut() {
            *value = (*value as f64 - mean) as f32;
        }
        mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn mean_of_empty_sequence_is_zero() {
        assert_eq!(StatsHelper::mean(&[]), 0.0);
    }

    #[test]
    fn remove_mean_centres_the_slice() {
        let mut samples = vec![1.0, 2.0, 3.0, 6.0];
        let removed = StatsHelper::remove_mean(&mut samples);
        assert_abs_diff_eq!(removed, 3.0);
        assert_abs_diff_eq!(StatsHelper::mean(&samples), 0.0, epsilon = 1e-6);
    }
}
