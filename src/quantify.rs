//! Density / mass quantification with fitted coefficients.
//!
//! Quantification is a pure evaluation of the same rational model the fitter
//! uses. It never iterates; the only failure modes are invalid inputs and a
//! denominator that vanishes at the observed intensities.

use rayon::prelude::*;

use crate::domain::{IntensityObservation, ModelParameters, Quantity};
use crate::error::DecompError;
use crate::models::{denominator, is_degenerate, numerator};

/// Evaluate density (or mass, when `volume` is given) for one intensity pair.
pub fn quantify(
    low: f64,
    high: f64,
    params: &ModelParameters,
    volume: Option<f64>,
) -> Result<Quantity, DecompError> {
    if !low.is_finite() {
        return Err(DecompError::NonFiniteInput { what: "low-energy intensity", index: 0 });
    }
    if !high.is_finite() {
        return Err(DecompError::NonFiniteInput { what: "high-energy intensity", index: 0 });
    }
    if let Some(v) = volume {
        if !(v.is_finite() && v >= 0.0) {
            return Err(DecompError::InvalidVolume(v));
        }
    }

    let p = params.as_slice();
    let den = denominator(p, low, high);
    if is_degenerate(den) {
        return Err(DecompError::DegenerateDenominator { low, high, denominator: den });
    }
    let density = numerator(p, low, high) / den;
    if !density.is_finite() {
        return Err(DecompError::DegenerateDenominator { low, high, denominator: den });
    }

    Ok(match volume {
        None => Quantity::Density(density),
        Some(volume) => Quantity::Mass {
            density,
            volume,
            mass: density * volume,
        },
    })
}

/// [`quantify`] with a raw coefficient slice (rejected unless it has 8 entries).
pub fn quantify_slice(
    low: f64,
    high: f64,
    params: &[f64],
    volume: Option<f64>,
) -> Result<Quantity, DecompError> {
    let params = ModelParameters::from_slice(params)?;
    quantify(low, high, &params, volume)
}

/// Quantify many observations against the same coefficients (in parallel).
///
/// Results are returned in input order; one bad observation does not affect
/// the others. Error indices refer to the observation's position.
pub fn quantify_batch(
    observations: &[IntensityObservation],
    params: &ModelParameters,
) -> Vec<Result<Quantity, DecompError>> {
    observations
        .par_iter()
        .enumerate()
        .map(|(index, obs)| {
            quantify(obs.low, obs.high, params, obs.volume).map_err(|err| match err {
                DecompError::NonFiniteInput { what, .. } => DecompError::NonFiniteInput { what, index },
                other => other,
            })
        })
        .collect()
}
