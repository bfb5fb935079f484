use crate::generator::template::gaussian_pulse;
use anyhow::Context;
use rand::{rngs::StdRng, Rng, SeedableRng};
use saftcore::math::Float3;
use saftcore::{ReconSettings, TimeSignal, TimeSignalProperties, UltrasoundSignals};
use serde::{Deserialize, Serialize};

/// Point absorber / scatterer in world coordinates [m].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointSource {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub amplitude: f32,
}

impl Default for PointSource {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 1.5e-3,
            amplitude: 1.0,
        }
    }
}

/// Configuration for synthesizing a raster scan over point sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// scan positions along x and y
    pub nx: usize,
    pub ny: usize,
    /// raster pitch [m]
    pub pitch: f32,
    pub samples: usize,
    /// [Hz]
    pub sample_rate: f32,
    /// acquisition delay of the first sample [s]
    pub delta_t: f32,
    pub center_frequency: f32,
    pub cycles: f32,
    /// DC bias of the first trace; later traces drift upwards from it
    pub dc_offset: f32,
    pub noise: f32,
    pub seed: u64,
    pub sources: Vec<PointSource>,
    pub description: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            nx: 9,
            ny: 9,
            pitch: 50e-6,
            samples: 768,
            sample_rate: 250e6,
            delta_t: 0.0,
            center_frequency: 20e6,
            cycles: 1.5,
            dc_offset: 0.2,
            noise: 0.01,
            seed: 0,
            sources: vec![PointSource::default()],
            description: None,
        }
    }
}

impl GeneratorConfig {
    fn scan_position(&self, ix: usize, iy: usize) -> Float3 {
        let half_x = (self.nx.max(1) - 1) as f32 * 0.5;
        let half_y = (self.ny.max(1) - 1) as f32 * 0.5;
        Float3::new([
            (ix as f32 - half_x) * self.pitch,
            (iy as f32 - half_y) * self.pitch,
            0.0,
        ])
    }
}

/// Synthesizes one trace per raster position: echoes of every source at the
/// time of flight implied by `settings`, plus a per-trace DC bias and uniform noise.
pub fn build_ensemble(
    config: &GeneratorConfig,
    settings: &ReconSettings,
) -> anyhow::Result<UltrasoundSignals> {
    let positions = config
        .nx
        .checked_mul(config.ny)
        .context("overflow computing scan position count")?;
    anyhow::ensure!(positions > 0, "generator needs at least one scan position");
    anyhow::ensure!(config.samples > 0, "generator needs at least one sample per trace");

    let path_factor = if settings.pulse_echo() { 2.0 } else { 1.0 };
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut signals = UltrasoundSignals::new();

    for iy in 0..config.ny {
        for ix in 0..config.nx {
            let pos = config.scan_position(ix, iy);
            let trace = iy * config.nx + ix;
            let bias = config.dc_offset * (1.0 + trace as f32 / positions as f32);
            let delays: Vec<(f32, f32)> = config
                .sources
                .iter()
                .map(|source| {
                    let offset = Float3::new([source.x, source.y, source.z]) - pos;
                    (offset.norm() * path_factor / settings.sos(), source.amplitude)
                })
                .collect();

            let samples = (0..config.samples)
                .map(|i| {
                    let t = config.delta_t + i as f32 / config.sample_rate;
                    let echo: f32 = delays
                        .iter()
                        .map(|&(tof, amplitude)| {
                            let pulse =
                                gaussian_pulse(t - tof, config.center_frequency, config.cycles);
                            amplitude * pulse
                        })
                        .sum();
                    let jitter = if config.noise > 0.0 {
                        rng.gen_range(-config.noise..config.noise)
                    } else {
                        0.0
                    };
                    echo + bias + jitter
                })
                .collect();

            let props = TimeSignalProperties {
                sample_rate: config.sample_rate,
                delta_t: config.delta_t,
                pos,
            };
            signals.push(
                TimeSignal::from_samples(samples, props)
                    .with_context(|| format!("building trace {}", trace))?,
            );
        }
    }

    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensemble_covers_the_raster() {
        let config = GeneratorConfig {
            nx: 3,
            ny: 2,
            samples: 64,
            ..Default::default()
        };
        let signals = build_ensemble(&config, &ReconSettings::default()).unwrap();
        assert_eq!(signals.len(), 6);
        assert!(signals.iter().all(|s| s.len() == 64));
        assert_eq!(signals[0].pos(), Float3::new([-50e-6, -25e-6, 0.0]));
        assert_eq!(signals[5].pos(), Float3::new([50e-6, 25e-6, 0.0]));
    }

    #[test]
    fn traces_carry_distinct_offsets() {
        let config = GeneratorConfig {
            nx: 2,
            ny: 2,
            samples: 32,
            noise: 0.0,
            sources: Vec::new(),
            ..Default::default()
        };
        let signals = build_ensemble(&config, &ReconSettings::default()).unwrap();
        let means: Vec<f64> = signals.iter().map(|s| s.mean()).collect();
        for pair in means.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn empty_raster_is_rejected() {
        let config = GeneratorConfig {
            nx: 0,
            ..Default::default()
        };
        assert!(build_ensemble(&config, &ReconSettings::default()).is_err());
    }

    #[test]
    fn same_seed_reproduces_noise() {
        let config = GeneratorConfig {
            nx: 2,
            ny: 1,
            samples: 16,
            seed: 7,
            ..Default::default()
        };
        let first = build_ensemble(&config, &ReconSettings::default()).unwrap();
        let second = build_ensemble(&config, &ReconSettings::default()).unwrap();
        assert_eq!(first, second);
    }
}
