//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and quantification
//! - exported to JSON/CSV
//! - reloaded later to quantify new observations

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::DecompError;

/// Number of free coefficients in the rational response model.
pub const PARAM_COUNT: usize = 8;

/// Fitted coefficients `p1..p8` of the rational quadratic model.
///
/// Serialized as a plain JSON array of 8 numbers. Values are immutable once
/// built; the type is `Copy` so it can be shared freely across worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct ModelParameters([f64; PARAM_COUNT]);

impl ModelParameters {
    pub const fn new(values: [f64; PARAM_COUNT]) -> Self {
        Self(values)
    }

    /// All-zero vector (the default starting point for a fit).
    pub const fn zeros() -> Self {
        Self([0.0; PARAM_COUNT])
    }

    /// Build from a slice, rejecting anything that is not exactly 8 long.
    pub fn from_slice(values: &[f64]) -> Result<Self, DecompError> {
        let array: [f64; PARAM_COUNT] = values.try_into().map_err(|_| DecompError::DimensionMismatch {
            what: "parameters",
            expected: PARAM_COUNT,
            actual: values.len(),
        })?;
        Ok(Self(array))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self::zeros()
    }
}

impl TryFrom<Vec<f64>> for ModelParameters {
    type Error = DecompError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_slice(&value)
    }
}

impl From<ModelParameters> for Vec<f64> {
    fn from(value: ModelParameters) -> Self {
        value.0.to_vec()
    }
}

/// One calibration insert: paired intensities with a known density.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSample {
    pub id: Option<String>,
    /// Low-energy intensity.
    pub low: f64,
    /// High-energy intensity.
    pub high: f64,
    /// Known density (units chosen by the caller, e.g. mg/cm³).
    pub density: f64,
    /// Relative weight in the least-squares objective (higher means more influence).
    pub weight: f64,
}

impl CalibrationSample {
    pub fn new(low: f64, high: f64, density: f64) -> Self {
        Self {
            id: None,
            low,
            high,
            density,
            weight: 1.0,
        }
    }
}

/// Intensity pair measured over one ROI of unknown composition.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityObservation {
    pub id: Option<String>,
    pub low: f64,
    pub high: f64,
    /// ROI volume; when present the observation is quantified as a mass.
    pub volume: Option<f64>,
}

impl IntensityObservation {
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            id: None,
            low,
            high,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// Result of evaluating the model for one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quantity {
    Density(f64),
    Mass { density: f64, volume: f64, mass: f64 },
}

impl Quantity {
    /// The headline value: density, or mass when a volume was supplied.
    pub fn value(&self) -> f64 {
        match *self {
            Quantity::Density(d) => d,
            Quantity::Mass { mass, .. } => mass,
        }
    }

    pub fn density(&self) -> f64 {
        match *self {
            Quantity::Density(d) => d,
            Quantity::Mass { density, .. } => density,
        }
    }
}

/// How the solver obtains the Jacobian of the residual vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JacobianMode {
    /// Closed-form partial derivatives of the rational model.
    Analytic,
    /// Forward finite differences of the residual function.
    Forward,
}

/// Options for a calibration fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// Solver iteration budget.
    pub max_iterations: usize,
    /// Residual / step / gradient convergence threshold.
    pub tolerance: f64,
    /// Starting point for the search.
    pub initial_guess: ModelParameters,
    pub jacobian: JacobianMode,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
            initial_guess: ModelParameters::zeros(),
            jacobian: JacobianMode::Analytic,
        }
    }
}

/// Why the solver stopped successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    ResidualBelowTolerance,
    SmallGradient,
    SmallStep,
    SmallCostReduction,
}

impl Termination {
    pub fn display_name(self) -> &'static str {
        match self {
            Termination::ResidualBelowTolerance => "residual below tolerance",
            Termination::SmallGradient => "gradient below tolerance",
            Termination::SmallStep => "step below tolerance",
            Termination::SmallCostReduction => "cost reduction below tolerance",
        }
    }
}

/// Fit quality diagnostics (unweighted, in density units).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub sse: f64,
    pub rmse: f64,
    pub r_squared: f64,
    pub max_abs_residual: f64,
    pub n: usize,
}

/// Per-sample fitted value and residual.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResidual {
    pub sample: CalibrationSample,
    pub predicted: f64,
    /// `density - predicted`.
    pub residual: f64,
}

/// Output of a successful calibration fit.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationFit {
    pub params: ModelParameters,
    pub quality: FitQuality,
    pub iterations: usize,
    pub termination: Termination,
    pub residuals: Vec<SampleResidual>,
}

/// A saved calibration (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub tool: String,
    pub created_at: DateTime<Utc>,
    /// Free-form label for the density unit of the calibration set.
    pub density_unit: String,
    pub parameters: ModelParameters,
    pub fit_quality: FitQuality,
    pub iterations: usize,
    pub termination: Termination,
}

/// A full `dect fit` run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults and `DECT_*` env vars).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub data_path: PathBuf,
    pub options: FitOptions,
    pub density_unit: String,
    pub export_params: Option<PathBuf>,
    pub export_residuals: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_reject_wrong_length() {
        let err = ModelParameters::from_slice(&[1.0; 7]).unwrap_err();
        assert_eq!(
            err,
            DecompError::DimensionMismatch {
                what: "parameters",
                expected: 8,
                actual: 7,
            }
        );
    }

    #[test]
    fn parameters_serialize_as_plain_array() {
        let p = ModelParameters::new([0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.5, -0.25]);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "[0.0,1.0,1.0,0.0,0.0,0.0,0.5,-0.25]");

        let back: ModelParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);

        assert!(serde_json::from_str::<ModelParameters>("[1.0, 2.0]").is_err());
    }

    #[test]
    fn quantity_value_prefers_mass() {
        let q = Quantity::Mass {
            density: 2.0,
            volume: 3.0,
            mass: 6.0,
        };
        assert_eq!(q.value(), 6.0);
        assert_eq!(q.density(), 2.0);
        assert_eq!(Quantity::Density(1.5).value(), 1.5);
    }
}
