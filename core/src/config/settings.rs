use crate::prelude::{SaftError, SaftResult};
use serde::{Deserialize, Serialize};

/// Axis of a crop window. Time is in seconds, lateral axes in metres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropAxis {
    T,
    X,
    Y,
}

impl CropAxis {
    pub const ALL: [CropAxis; 3] = [CropAxis::T, CropAxis::X, CropAxis::Y];

    pub fn index(self) -> usize {
        match self {
            CropAxis::T => 0,
            CropAxis::X => 1,
            CropAxis::Y => 2,
        }
    }

    pub fn from_index(index: usize) -> SaftResult<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or_else(|| SaftError::InvalidArgument(format!("no crop axis {}", index)))
    }
}

/// Reconstruction settings read by the engine at launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconSettings {
    /// speed of sound [m/s]
    sos: f32,
    coherence_weighting: bool,
    sensitivity_weighting: bool,
    /// round trip ultrasound when set, one-way optoacoustic otherwise
    pulse_echo: bool,
    use_gpu: bool,
    crop_enabled: bool,
    /// (min, max) per axis: t [s], x [m], y [m]
    crop: [[f32; 2]; 3],
    /// minimum radius of reconstruction arcs [m], overrides the cone near the transducer
    r_min: f32,
}

impl Default for ReconSettings {
    fn default() -> Self {
        Self {
            sos: 1495.0,
            coherence_weighting: true,
            sensitivity_weighting: false,
            pulse_echo: true,
            use_gpu: false,
            crop_enabled: false,
            crop: [[0.0; 2]; 3],
            r_min: 50e-6,
        }
    }
}

fn finite(name: &str, value: f32) -> SaftResult<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SaftError::InvalidArgument(format!(
            "{} must be finite, got {}",
            name, value
        )))
    }
}

impl ReconSettings {
    pub fn sos(&self) -> f32 {
        self.sos
    }

    pub fn set_sos(&mut self, sos: f32) -> SaftResult<()> {
        if finite("speed of sound", sos)? <= 0.0 {
            return Err(SaftError::InvalidArgument(format!(
                "speed of sound must be positive, got {}",
                sos
            )));
        }
        self.sos = sos;
        Ok(())
    }

    pub fn r_min(&self) -> f32 {
        self.r_min
    }

    pub fn set_r_min(&mut self, r_min: f32) -> SaftResult<()> {
        if finite("minimum radius", r_min)? < 0.0 {
            return Err(SaftError::InvalidArgument(format!(
                "minimum radius must be non-negative, got {}",
                r_min
            )));
        }
        self.r_min = r_min;
        Ok(())
    }

    pub fn coherence_weighting(&self) -> bool {
        self.coherence_weighting
    }

    pub fn set_coherence_weighting(&mut self, enabled: bool) {
        self.coherence_weighting = enabled;
    }

    pub fn sensitivity_weighting(&self) -> bool {
        self.sensitivity_weighting
    }

    pub fn set_sensitivity_weighting(&mut self, enabled: bool) {
        self.sensitivity_weighting = enabled;
    }

    pub fn pulse_echo(&self) -> bool {
        self.pulse_echo
    }

    pub fn set_pulse_echo(&mut self, enabled: bool) {
        self.pulse_echo = enabled;
    }

    pub fn use_gpu(&self) -> bool {
        self.use_gpu
    }

    pub fn set_use_gpu(&mut self, enabled: bool) {
        self.use_gpu = enabled;
    }

    /// Acoustic path length per unit of time of flight, in metres per second.
    pub fn depth_per_second(&self) -> f32 {
        if self.pulse_echo {
            self.sos * 0.5
        } else {
            self.sos
        }
    }

    pub fn crop_enabled(&self) -> bool {
        self.crop_enabled
    }

    pub fn clear_crop(&mut self) {
        self.crop_enabled = false;
    }

    pub fn crop_min(&self, axis: CropAxis) -> f32 {
        self.crop[axis.index()][0]
    }

    pub fn crop_max(&self, axis: CropAxis) -> f32 {
        self.crop[axis.index()][1]
    }

    pub fn crop_bounds(&self, axis: CropAxis) -> (f32, f32) {
        let [min, max] = self.crop[axis.index()];
        (min, max)
    }

    pub fn set_crop_min(&mut self, axis: CropAxis, value: f32) -> SaftResult<()> {
        self.crop[axis.index()][0] = finite("crop bound", value)?;
        self.crop_enabled = true;
        Ok(())
    }

    pub fn set_crop_max(&mut self, axis: CropAxis, value: f32) -> SaftResult<()> {
        self.crop[axis.index()][1] = finite("crop bound", value)?;
        self.crop_enabled = true;
        Ok(())
    }

    pub fn set_crop_axis(&mut self, axis: CropAxis, min: f32, max: f32) -> SaftResult<()> {
        let min = finite("crop bound", min)?;
        let max = finite("crop bound", max)?;
        self.crop[axis.index()] = [min, max];
        self.crop_enabled = true;
        Ok(())
    }

    pub fn set_crop_t(&mut self, min: f32, max: f32) -> SaftResult<()> {
        self.set_crop_axis(CropAxis::T, min, max)
    }

    pub fn set_crop_x(&mut self, min: f32, max: f32) -> SaftResult<()> {
        self.set_crop_axis(CropAxis::X, min, max)
    }

    pub fn set_crop_y(&mut self, min: f32, max: f32) -> SaftResult<()> {
        self.set_crop_axis(CropAxis::Y, min, max)
    }

    /// Indexed variant of [`set_crop_axis`](Self::set_crop_axis): 0 = t, 1 = x, 2 = y.
    pub fn set_crop(&mut self, axis: usize, min: f32, max: f32) -> SaftResult<()> {
        self.set_crop_axis(CropAxis::from_index(axis)?, min, max)
    }

    /// Swaps inverted bounds so that min <= max on every axis.
    pub fn sort_cropping(&mut self) {
        for bounds in self.crop.iter_mut() {
            if bounds[0] > bounds[1] {
                bounds.swap(0, 1);
            }
        }
    }

    pub fn validate(&self) -> SaftResult<()> {
        if !self.sos.is_finite() || self.sos <= 0.0 {
            return Err(SaftError::InvalidArgument(format!(
                "speed of sound must be positive, got {}",
                self.sos
            )));
        }
        if !self.r_min.is_finite() || self.r_min < 0.0 {
            return Err(SaftError::InvalidArgument(format!(
                "minimum radius must be non-negative, got {}",
                self.r_min
            )));
        }
        for bounds in &self.crop {
            finite("crop bound", bounds[0])?;
            finite("crop bound", bounds[1])?;
        }
        Ok(())
    }
}
