//! Error types.
//!
//! - [`DecompError`] is what the library operations return. Every condition is
//!   detected at the boundary of `fit_calibration` / `quantify` and reported to
//!   the immediate caller.
//! - [`AppError`] is what the `dect` binary works with: a message plus the
//!   process exit code.

use thiserror::Error;

/// Why the nonlinear solve did not produce a usable fit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvergenceFailure {
    #[error("iteration budget of {iterations} exhausted (residual norm {residual_norm:.3e})")]
    IterationLimit { iterations: usize, residual_norm: f64 },

    #[error("singular or ill-conditioned Jacobian at iteration {iteration}")]
    SingularJacobian { iteration: usize },

    #[error("model produced non-finite residuals at iteration {iteration}")]
    NonFiniteResidual { iteration: usize },
}

/// Errors returned by the calibration and quantification operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecompError {
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("calibration set is empty")]
    EmptyCalibration,

    #[error("non-finite {what} at index {index}")]
    NonFiniteInput { what: &'static str, index: usize },

    #[error("invalid weight {weight} at index {index} (must be > 0)")]
    InvalidWeight { index: usize, weight: f64 },

    #[error("invalid fit options: {0}")]
    InvalidOptions(String),

    #[error("calibration fit failed: {0}")]
    FitConvergence(#[from] ConvergenceFailure),

    #[error("degenerate denominator {denominator:.3e} at low={low}, high={high}")]
    DegenerateDenominator { low: f64, high: f64, denominator: f64 },

    #[error("invalid volume {0} (must be finite and >= 0)")]
    InvalidVolume(f64),
}

impl DecompError {
    /// Exit code used by the binary when this error ends a run.
    pub fn exit_code(&self) -> u8 {
        match self {
            DecompError::FitConvergence(_) => 4,
            DecompError::DegenerateDenominator { .. } => 5,
            _ => 2,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<DecompError> for AppError {
    fn from(err: DecompError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
