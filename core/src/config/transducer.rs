use crate::prelude::{SaftError, SaftResult};
use serde::{Deserialize, Serialize};

/// Spherically focused single-element transducer. Lengths are in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transducer {
    focal_distance: f32,
    r_aperture: f32,
    r_hole: f32,
}

impl Default for Transducer {
    fn default() -> Self {
        Self {
            focal_distance: 7.0,
            r_aperture: 3.2,
            r_hole: 0.5,
        }
    }
}

fn non_negative(name: &str, value: f32) -> SaftResult<f32> {
    if !value.is_finite() || value < 0.0 {
        return Err(SaftError::InvalidArgument(format!(
            "{} must be non-negative, got {}",
            name, value
        )));
    }
    Ok(value)
}

impl Transducer {
    pub fn new(focal_distance: f32, r_aperture: f32, r_hole: f32) -> SaftResult<Self> {
        let mut transducer = Self::default();
        transducer.set_focal_distance(focal_distance)?;
        transducer.set_r_aperture(r_aperture)?;
        transducer.set_r_hole(r_hole)?;
        Ok(transducer)
    }

    pub fn focal_distance(&self) -> f32 {
        self.focal_distance
    }

    pub fn r_aperture(&self) -> f32 {
        self.r_aperture
    }

    pub fn r_hole(&self) -> f32 {
        self.r_hole
    }

    pub fn set_focal_distance(&mut self, value: f32) -> SaftResult<()> {
        self.focal_distance = non_negative("focal distance", value)?;
        Ok(())
    }

    pub fn set_r_aperture(&mut self, value: f32) -> SaftResult<()> {
        self.r_aperture = non_negative("aperture radius", value)?;
        Ok(())
    }

    pub fn set_r_hole(&mut self, value: f32) -> SaftResult<()> {
        self.r_hole = non_negative("hole radius", value)?;
        Ok(())
    }

    /// Half-angle of the acceptance cone in radians.
    pub fn theta(&self) -> SaftResult<f32> {
        self.half_angle("aperture radius", self.r_aperture)
    }

    /// Half-angle shadowed by the central hole in radians.
    pub fn hole_theta(&self) -> SaftResult<f32> {
        self.half_angle("hole radius", self.r_hole)
    }

    fn half_angle(&self, name: &str, radius: f32) -> SaftResult<f32> {
        if self.focal_distance <= 0.0 || radius > self.focal_distance {
            return Err(SaftError::InvalidArgument(format!(
                "{} {} exceeds focal distance {}",
                name, radius, self.focal_distance
            )));
        }
        Ok((radius / self.focal_distance).asin())
    }

    /// Re-checks values that may have bypassed the setters, e.g. via deserialization.
    pub fn validate(&self) -> SaftResult<()> {
        non_negative("focal distance", self.focal_distance)?;
        non_negative("aperture radius", self.r_aperture)?;
        non_negative("hole radius", self.r_hole)?;
        if self.r_hole > self.r_aperture {
            return Err(SaftError::InvalidArgument(format!(
                "hole radius {} exceeds aperture radius {}",
                self.r_hole, self.r_aperture
            )));
        }
        self.theta().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn negative_values_are_rejected_and_keep_prior_state() {
        let mut transducer = Transducer::default();
        assert!(matches!(
            transducer.set_focal_distance(-1.0),
            Err(SaftError::InvalidArgument(_))
        ));
        assert!(matches!(
            transducer.set_r_aperture(-1.0),
            Err(SaftError::InvalidArgument(_))
        ));
        assert!(matches!(
            transducer.set_r_hole(-1.0),
            Err(SaftError::InvalidArgument(_))
        ));
        assert_eq!(transducer, Transducer::default());
    }

    #[test]
    fn theta_follows_aperture_geometry() {
        let transducer = Transducer::new(2.0, 1.0, 0.0).unwrap();
        assert_abs_diff_eq!(
            transducer.theta().unwrap(),
            std::f32::consts::FRAC_PI_6,
            epsilon = 1e-6
        );
        assert_eq!(transducer.hole_theta().unwrap(), 0.0);
    }

    #[test]
    fn theta_fails_when_aperture_exceeds_focus() {
        let transducer = Transducer::new(1.0, 2.0, 0.0).unwrap();
        assert!(matches!(
            transducer.theta(),
            Err(SaftError::InvalidArgument(_))
        ));
        assert!(transducer.validate().is_err());
    }
}
