//! Synthetic calibration sets generated from a known coefficient vector.
//!
//! Intensity pairs are drawn uniformly from the configured ranges and labelled
//! with the exact model density, optionally perturbed by Gaussian noise. This is
//! what `dect synth` writes and what the round-trip checks fit against.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{CalibrationSample, ModelParameters};
use crate::error::AppError;
use crate::models::{denominator, evaluate, is_degenerate};

/// Draws per requested sample before giving up on a range whose denominator
/// keeps vanishing.
const MAX_DRAWS_PER_SAMPLE: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct SynthConfig {
    pub params: ModelParameters,
    pub sample_count: usize,
    pub low_range: (f64, f64),
    pub high_range: (f64, f64),
    /// Standard deviation of additive density noise (0 disables noise).
    pub noise_sigma: f64,
    pub seed: u64,
}

/// Generate a calibration set from `config`.
pub fn generate_calibration_set(config: &SynthConfig) -> Result<Vec<CalibrationSample>, AppError> {
    if config.sample_count == 0 {
        return Err(AppError::new(2, "Sample count must be > 0."));
    }
    validate_range("low", config.low_range)?;
    validate_range("high", config.high_range)?;
    if !(config.noise_sigma.is_finite() && config.noise_sigma >= 0.0) {
        return Err(AppError::new(2, "Noise sigma must be finite and >= 0."));
    }
    if !config.params.is_finite() {
        return Err(AppError::new(2, "Generating parameters must be finite."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, config.noise_sigma)
        .map_err(|e| AppError::new(2, format!("Noise distribution error: {e}")))?;
    let p = config.params.as_slice();

    let mut samples = Vec::with_capacity(config.sample_count);
    let mut draws = 0usize;
    let max_draws = config.sample_count.saturating_mul(MAX_DRAWS_PER_SAMPLE);

    while samples.len() < config.sample_count {
        draws += 1;
        if draws > max_draws {
            return Err(AppError::new(
                2,
                "Generating parameters have a vanishing denominator over most of the intensity range.",
            ));
        }

        let low = rng.gen_range(config.low_range.0..=config.low_range.1);
        let high = rng.gen_range(config.high_range.0..=config.high_range.1);
        if is_degenerate(denominator(p, low, high)) {
            continue;
        }

        let exact = evaluate(p, low, high);
        let noise = if config.noise_sigma > 0.0 { normal.sample(&mut rng) } else { 0.0 };

        samples.push(CalibrationSample {
            id: Some(format!("S-{:03}", samples.len() + 1)),
            low,
            high,
            density: exact + noise,
            weight: 1.0,
        });
    }

    Ok(samples)
}

fn validate_range(name: &str, (min, max): (f64, f64)) -> Result<(), AppError> {
    if !(min.is_finite() && max.is_finite() && max > min) {
        return Err(AppError::new(
            2,
            format!("Invalid {name} intensity range: min={min}, max={max} (must be finite and max>min)."),
        ));
    }
    Ok(())
}
