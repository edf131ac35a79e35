//! Read/write calibration JSON files.
//!
//! A calibration file is the portable form of a fit:
//! - the 8 model coefficients
//! - fit quality and solver outcome
//! - when it was produced and the density unit of the calibration set
//!
//! The schema is defined by `domain::CalibrationFile`.

use std::fs::File;
use std::path::Path;

use chrono::Utc;

use crate::domain::{CalibrationFile, CalibrationFit};
use crate::error::AppError;

/// Build the on-disk representation of a fit.
pub fn calibration_file(fit: &CalibrationFit, density_unit: &str) -> CalibrationFile {
    CalibrationFile {
        tool: "dect".to_string(),
        created_at: Utc::now(),
        density_unit: density_unit.to_string(),
        parameters: fit.params,
        fit_quality: fit.quality.clone(),
        iterations: fit.iterations,
        termination: fit.termination,
    }
}

/// Write a calibration JSON file.
pub fn write_calibration_json(path: &Path, file: &CalibrationFile) -> Result<(), AppError> {
    let out = File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create calibration JSON '{}': {e}", path.display()))
    })?;

    serde_json::to_writer_pretty(out, file)
        .map_err(|e| AppError::new(2, format!("Failed to write calibration JSON: {e}")))?;

    Ok(())
}

/// Read a calibration JSON file.
///
/// A parameter array with a length other than 8 is rejected while parsing.
pub fn read_calibration_json(path: &Path) -> Result<CalibrationFile, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open calibration JSON '{}': {e}", path.display()))
    })?;
    let calibration: CalibrationFile = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid calibration JSON: {e}")))?;
    Ok(calibration)
}
