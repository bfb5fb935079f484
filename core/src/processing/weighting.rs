use crate::math::Float3;
use num_complex::{Complex32, Complex64};

/// Sensitivity of the transducer at a world position, used to scale voxels when
/// sensitivity weighting is enabled.
pub trait SensitivityField: Send + Sync {
    fn sensitivity(&self, voxel: Float3) -> f32;
}

/// Field with the same sensitivity everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformSensitivity;

impl SensitivityField for UniformSensitivity {
    fn sensitivity(&self, _voxel: Float3) -> f32 {
        1.0
    }
}

impl<F> SensitivityField for F
where
    F: Fn(Float3) -> f32 + Send + Sync,
{
    fn sensitivity(&self, voxel: Float3) -> f32 {
        self(voxel)
    }
}

/// Phase agreement of the analytic samples contributing to one voxel.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoherenceAccumulator {
    coherent: Complex64,
    incoherent: f64,
}

impl CoherenceAccumulator {
    pub fn push(&mut self, sample: Complex32) {
        let sample = Complex64::new(sample.re as f64, sample.im as f64);
        self.coherent += sample;
        self.incoherent += sample.norm();
    }

    /// `|sum a_i| / sum |a_i|`, in `[0, 1]`; zero when nothing contributed.
    pub fn factor(&self) -> f64 {
        if self.incoherent > 0.0 {
            (self.coherent.norm() / self.incoherent).min(1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn aligned_phasors_are_fully_coherent() {
        let mut acc = CoherenceAccumulator::default();
        for _ in 0..5 {
            acc.push(Complex32::new(0.6, 0.8));
        }
        assert_abs_diff_eq!(acc.factor(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn opposing_phasors_cancel() {
        let mut acc = CoherenceAccumulator::default();
        acc.push(Complex32::new(1.0, 0.0));
        acc.push(Complex32::new(-1.0, 0.0));
        assert_abs_diff_eq!(acc.factor(), 0.0, epsilon = 1e-9);
        assert_eq!(CoherenceAccumulator::default().factor(), 0.0);
    }

    #[test]
    fn closures_act_as_fields() {
        let field = |voxel: Float3| 1.0 / (1.0 + voxel[2]);
        assert_eq!(field.sensitivity(Float3::new([0.0, 0.0, 1.0])), 0.5);
        assert_eq!(UniformSensitivity.sensitivity(Float3::default()), 1.0);
    }
}
