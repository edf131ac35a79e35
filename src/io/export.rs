//! Export per-sample fit residuals and quantification results to CSV.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream scripts.
//! Fields are written through `csv::Writer`, so ids containing commas or quotes
//! survive a reload through `io::ingest`.

use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::domain::{CalibrationSample, IntensityObservation, Quantity, SampleResidual};
use crate::error::{AppError, DecompError};

/// Write per-sample calibration residuals to a CSV file.
pub fn write_residuals_csv(path: &Path, residuals: &[SampleResidual]) -> Result<(), AppError> {
    let mut wtr = create_writer(path, "export CSV")?;
    write_row(&mut wtr, ["id", "low", "high", "density", "weight", "predicted", "residual"])?;

    for r in residuals {
        let s = &r.sample;
        write_row(
            &mut wtr,
            [
                s.id.clone().unwrap_or_default(),
                format!("{:.10}", s.low),
                format!("{:.10}", s.high),
                format!("{:.10}", s.density),
                format!("{:.6}", s.weight),
                format!("{:.10}", r.predicted),
                format!("{:.10}", r.residual),
            ],
        )?;
    }

    finish(wtr)
}

/// Write a calibration set in the same schema `ingest::load_calibration_csv` reads.
///
/// Values are written at full precision so a reload yields the same samples.
pub fn write_samples_csv(path: &Path, samples: &[CalibrationSample]) -> Result<(), AppError> {
    let mut wtr = create_writer(path, "calibration CSV")?;
    write_row(&mut wtr, ["id", "low", "high", "density", "weight"])?;

    for s in samples {
        write_row(
            &mut wtr,
            [
                s.id.clone().unwrap_or_default(),
                s.low.to_string(),
                s.high.to_string(),
                s.density.to_string(),
                s.weight.to_string(),
            ],
        )?;
    }

    finish(wtr)
}

/// Write quantification results (one row per observation) to a CSV file.
///
/// Failed observations are kept with empty numeric fields and the error text.
pub fn write_quantities_csv(
    path: &Path,
    observations: &[IntensityObservation],
    results: &[Result<Quantity, DecompError>],
) -> Result<(), AppError> {
    let mut wtr = create_writer(path, "export CSV")?;
    write_row(&mut wtr, ["id", "low", "high", "volume", "density", "mass", "error"])?;

    for (obs, result) in observations.iter().zip(results.iter()) {
        let (density, mass, error) = match result {
            Ok(Quantity::Density(d)) => (format!("{d:.10}"), String::new(), String::new()),
            Ok(Quantity::Mass { density, mass, .. }) => {
                (format!("{density:.10}"), format!("{mass:.10}"), String::new())
            }
            Err(e) => (String::new(), String::new(), e.to_string()),
        };
        write_row(
            &mut wtr,
            [
                obs.id.clone().unwrap_or_default(),
                format!("{:.10}", obs.low),
                format!("{:.10}", obs.high),
                obs.volume.map(|v| format!("{v:.10}")).unwrap_or_default(),
                density,
                mass,
                error,
            ],
        )?;
    }

    finish(wtr)
}

fn create_writer(path: &Path, what: &str) -> Result<Writer<File>, AppError> {
    Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))
}

fn write_row<I, T>(wtr: &mut Writer<File>, record: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    wtr.write_record(record)
        .map_err(|e| AppError::new(2, format!("Failed to write CSV row: {e}")))
}

fn finish(mut wtr: Writer<File>) -> Result<(), AppError> {
    wtr.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush CSV: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ingest::load_calibration_csv;

    #[test]
    fn samples_csv_reloads_through_ingest() {
        let mut a = CalibrationSample::new(0.1, 0.2, 0.3);
        a.id = Some("S-001".to_string());
        a.weight = 2.0;
        let b = CalibrationSample::new(0.4, 0.5, 0.9);

        let path = std::env::temp_dir().join(format!("dect_samples_{}.csv", std::process::id()));
        write_samples_csv(&path, &[a.clone(), b.clone()]).unwrap();
        let data = load_calibration_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(data.samples, vec![a, b]);
        assert!(data.row_errors.is_empty());
    }

    #[test]
    fn ids_with_commas_and_quotes_survive_reload() {
        let mut a = CalibrationSample::new(0.1, 0.2, 0.3);
        a.id = Some("insert 1, 200mg".to_string());
        let mut b = CalibrationSample::new(0.4, 0.5, 0.9);
        b.id = Some("rod \"B\"".to_string());
        // Not exactly representable with a fixed number of decimals.
        let c = CalibrationSample::new(1.0 / 3.0, 0.22758426111065722, 0.1 + 0.2);

        let path = std::env::temp_dir().join(format!("dect_samples_ids_{}.csv", std::process::id()));
        write_samples_csv(&path, &[a.clone(), b.clone(), c.clone()]).unwrap();
        let data = load_calibration_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(data.row_errors.is_empty(), "row errors: {:?}", data.row_errors);
        assert_eq!(data.samples, vec![a, b, c]);
    }

    #[test]
    fn quantities_csv_keeps_failed_rows() {
        let observations = vec![
            IntensityObservation::new(0.3, 0.4),
            IntensityObservation::new(0.5, 0.5).with_volume(2.0),
            IntensityObservation::new(1.0, 1.0),
        ];
        let results = vec![
            Ok(Quantity::Density(0.7)),
            Ok(Quantity::Mass { density: 1.0, volume: 2.0, mass: 2.0 }),
            Err(DecompError::DegenerateDenominator { low: 1.0, high: 1.0, denominator: 0.0 }),
        ];

        let path = std::env::temp_dir().join(format!("dect_quantities_{}.csv", std::process::id()));
        write_quantities_csv(&path, &observations, &results).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].ends_with("0.7000000000,,"));
        assert!(lines[2].contains("2.0000000000,"));
        assert!(lines[3].contains("degenerate denominator"));
    }

    #[test]
    fn quantities_csv_quotes_ids_with_commas() {
        let mut obs = IntensityObservation::new(0.3, 0.4);
        obs.id = Some("roi 7, left".to_string());
        let results = vec![Ok(Quantity::Density(0.7))];

        let path = std::env::temp_dir().join(format!("dect_quantities_ids_{}.csv", std::process::id()));
        write_quantities_csv(&path, &[obs], &results).unwrap();
        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        std::fs::remove_file(&path).ok();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 7);
        assert_eq!(&rows[0][0], "roi 7, left");
        assert_eq!(&rows[0][4], "0.7000000000");
    }
}
