//! Shared "fit pipeline" and "quantify pipeline" logic.
//!
//! Keeping the workflows here (rather than in command handlers) lets them be
//! exercised end-to-end in tests without parsing arguments or printing:
//! CSV ingest -> fit -> residuals/quality, and calibration JSON -> quantify.

use std::path::Path;

use crate::domain::{CalibrationFit, FitConfig, IntensityObservation, Quantity};
use crate::error::{AppError, DecompError};
use crate::fit::fit_samples;
use crate::io::ingest::{CalibrationData, load_calibration_csv, load_observations_csv};
use crate::io::read_calibration_json;
use crate::quantify::quantify_batch;

/// All computed outputs of a single `dect fit` run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub data: CalibrationData,
    pub fit: CalibrationFit,
}

/// Execute the fit pipeline and return the computed outputs.
pub fn run_fit(config: &FitConfig) -> Result<FitRun, AppError> {
    let data = load_calibration_csv(&config.data_path)?;
    let fit = fit_samples(&data.samples, &config.options)?;
    Ok(FitRun { data, fit })
}

/// All computed outputs of a batch `dect quantify` run.
#[derive(Debug, Clone)]
pub struct QuantifyRun {
    pub density_unit: String,
    pub observations: Vec<IntensityObservation>,
    pub results: Vec<Result<Quantity, DecompError>>,
    pub rows_read: usize,
    pub skipped_rows: usize,
}

/// Load a calibration and quantify every observation in `input`.
pub fn run_quantify_batch(params_path: &Path, input: &Path) -> Result<QuantifyRun, AppError> {
    let calibration = read_calibration_json(params_path)?;
    let data = load_observations_csv(input)?;
    let results = quantify_batch(&data.observations, &calibration.parameters);

    Ok(QuantifyRun {
        density_unit: calibration.density_unit,
        observations: data.observations,
        results,
        rows_read: data.rows_read,
        skipped_rows: data.row_errors.len(),
    })
}
