//! CSV ingest and normalization.
//!
//! This module turns calibration and observation CSVs (one row per ROI, with
//! intensities already reduced by the caller) into validated in-memory values.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Separation of concerns**: no fitting logic here
//!
//! Calibration CSV columns: `low`, `high`, `density`, optional `weight`, `id`.
//! Observation CSV columns: `low`, `high`, optional `volume`, `id`.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use log::warn;

use crate::domain::{CalibrationSample, IntensityObservation};
use crate::error::AppError;

/// Summary stats about the samples actually used for fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStats {
    pub n_samples: usize,
    pub low_min: f64,
    pub low_max: f64,
    pub high_min: f64,
    pub high_max: f64,
    pub density_min: f64,
    pub density_max: f64,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Calibration ingest output: samples + stats + row errors.
#[derive(Debug, Clone)]
pub struct CalibrationData {
    pub samples: Vec<CalibrationSample>,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Observation ingest output.
#[derive(Debug, Clone)]
pub struct ObservationData {
    pub observations: Vec<IntensityObservation>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load a calibration set from CSV.
pub fn load_calibration_csv(path: &Path) -> Result<CalibrationData, AppError> {
    let (samples, row_errors, rows_read) =
        read_rows(path, &["low", "high", "density"], parse_calibration_row)?;

    if samples.is_empty() {
        return Err(AppError::new(
            2,
            format!("No valid calibration rows in '{}'.", path.display()),
        ));
    }

    let stats = compute_stats(&samples).ok_or_else(|| {
        AppError::new(2, "No valid calibration samples remain after normalization.")
    })?;

    Ok(CalibrationData {
        samples,
        stats,
        row_errors,
        rows_read,
    })
}

/// Load ROI observations from CSV.
pub fn load_observations_csv(path: &Path) -> Result<ObservationData, AppError> {
    let (observations, row_errors, rows_read) =
        read_rows(path, &["low", "high"], parse_observation_row)?;

    if observations.is_empty() {
        return Err(AppError::new(
            2,
            format!("No valid observation rows in '{}'.", path.display()),
        ));
    }

    Ok(ObservationData {
        observations,
        row_errors,
        rows_read,
    })
}

type RowParser<T> = fn(&StringRecord, &HashMap<String, usize>) -> Result<T, String>;

fn read_rows<T>(
    path: &Path,
    required: &[&str],
    parse: RowParser<T>,
) -> Result<(Vec<T>, Vec<RowError>, usize), AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    for name in required {
        if !header_map.contains_key(*name) {
            return Err(AppError::new(2, format!("Missing required column: `{name}`")));
        }
    }

    let mut out = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header and CSV lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse(&record, &header_map) {
            Ok(value) => out.push(value),
            Err(message) => row_errors.push(RowError {
                line,
                id: get_optional(&record, &header_map, "id").map(str::to_string),
                message,
            }),
        }
    }

    if !row_errors.is_empty() {
        warn!(
            "Skipped {} of {rows_read} rows in '{}'.",
            row_errors.len(),
            path.display()
        );
    }

    Ok((out, row_errors, rows_read))
}

fn parse_calibration_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
) -> Result<CalibrationSample, String> {
    let low = parse_required_f64(record, header_map, "low")?;
    let high = parse_required_f64(record, header_map, "high")?;
    let density = parse_required_f64(record, header_map, "density")?;

    let weight = match get_optional(record, header_map, "weight") {
        None => 1.0,
        Some(s) => {
            let w = parse_finite(s, "weight")?;
            if w <= 0.0 {
                return Err("Invalid `weight` (must be finite and > 0).".to_string());
            }
            w
        }
    };

    Ok(CalibrationSample {
        id: get_optional(record, header_map, "id").map(str::to_string),
        low,
        high,
        density,
        weight,
    })
}

fn parse_observation_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
) -> Result<IntensityObservation, String> {
    let low = parse_required_f64(record, header_map, "low")?;
    let high = parse_required_f64(record, header_map, "high")?;

    let volume = match get_optional(record, header_map, "volume") {
        None => None,
        Some(s) => {
            let v = parse_finite(s, "volume")?;
            if v < 0.0 {
                return Err("Invalid `volume` (must be >= 0).".to_string());
            }
            Some(v)
        }
    };

    Ok(IntensityObservation {
        id: get_optional(record, header_map, "id").map(str::to_string),
        low,
        high,
        volume,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn compute_stats(samples: &[CalibrationSample]) -> Option<DatasetStats> {
    let mut stats = DatasetStats {
        n_samples: samples.len(),
        low_min: f64::INFINITY,
        low_max: f64::NEG_INFINITY,
        high_min: f64::INFINITY,
        high_max: f64::NEG_INFINITY,
        density_min: f64::INFINITY,
        density_max: f64::NEG_INFINITY,
    };

    for s in samples {
        stats.low_min = stats.low_min.min(s.low);
        stats.low_max = stats.low_max.max(s.low);
        stats.high_min = stats.high_min.min(s.high);
        stats.high_max = stats.high_max.max(s.high);
        stats.density_min = stats.density_min.min(s.density);
        stats.density_max = stats.density_max.max(s.density);
    }

    let bounds = [
        stats.low_min,
        stats.low_max,
        stats.high_min,
        stats.high_max,
        stats.density_min,
        stats.density_max,
    ];
    if bounds.iter().all(|v| v.is_finite()) {
        Some(stats)
    } else {
        None
    }
}

fn parse_required_f64(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<f64, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    let raw = record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))?;
    parse_finite(raw, name)
}

fn parse_finite(s: &str, name: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("Invalid `{name}` value '{s}' (must be a finite number).")),
    }
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_csv(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("dect_ingest_{}_{name}.csv", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn calibration_csv_with_bom_and_weights() {
        let path = temp_csv(
            "calib",
            "\u{feff}ID,Low,High,Density,Weight\nA,0.1,0.2,0.3,2\nB,0.2,0.3,0.5,\nC,x,0.3,0.5,1\nD,0.3,0.4,0.7,-1\n",
        );
        let data = load_calibration_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(data.rows_read, 4);
        assert_eq!(data.samples.len(), 2);
        assert_eq!(data.samples[0].id.as_deref(), Some("A"));
        assert_eq!(data.samples[0].weight, 2.0);
        assert_eq!(data.samples[1].weight, 1.0);

        assert_eq!(data.row_errors.len(), 2);
        assert_eq!(data.row_errors[0].line, 4);
        assert_eq!(data.row_errors[0].id.as_deref(), Some("C"));
        assert!(data.row_errors[1].message.contains("weight"));

        assert_eq!(data.stats.n_samples, 2);
        assert!((data.stats.density_max - 0.5).abs() < 1e-12);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let path = temp_csv("nodensity", "low,high\n0.1,0.2\n");
        let err = load_calibration_csv(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("density"));
    }

    #[test]
    fn observations_with_optional_volume() {
        let path = temp_csv("obs", "id,low,high,volume\nroi1,0.3,0.4,2.5\nroi2,0.1,0.1,\nroi3,0.1,0.1,-1\n");
        let data = load_observations_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(data.observations.len(), 2);
        assert_eq!(data.observations[0].volume, Some(2.5));
        assert_eq!(data.observations[1].volume, None);
        assert_eq!(data.row_errors.len(), 1);
        assert_eq!(data.row_errors[0].line, 4);
    }

    #[test]
    fn no_valid_rows_is_an_error() {
        let path = temp_csv("empty", "low,high,density\nnan,0.1,0.2\n");
        let err = load_calibration_csv(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("No valid calibration rows"));

        let path = temp_csv("empty_obs", "low,high
0.1,inf
");
        let err = load_observations_csv(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(err.exit_code(), 2);
    }
}
