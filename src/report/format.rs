//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{CalibrationFit, FitConfig, IntensityObservation, Quantity, SampleResidual};
use crate::error::DecompError;
use crate::io::ingest::CalibrationData;

/// Format the full fit summary (dataset stats + solver outcome + coefficients).
pub fn format_fit_summary(data: &CalibrationData, fit: &CalibrationFit, config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str("=== dect - Dual-Energy Calibration Fit ===\n");
    out.push_str(&format!("Data: {}\n", config.data_path.display()));
    out.push_str(&format!(
        "Rows: read={} used={} skipped={}\n",
        data.rows_read,
        data.samples.len(),
        data.row_errors.len()
    ));
    for e in data.row_errors.iter().take(5) {
        out.push_str(&format!(
            "  line {}{}: {}\n",
            e.line,
            e.id.as_deref().map(|id| format!(" ({id})")).unwrap_or_default(),
            e.message
        ));
    }
    out.push_str(&format!(
        "Samples: n={} | low=[{:.4}, {:.4}] | high=[{:.4}, {:.4}] | density=[{:.4}, {:.4}] {}\n",
        data.stats.n_samples,
        data.stats.low_min,
        data.stats.low_max,
        data.stats.high_min,
        data.stats.high_max,
        data.stats.density_min,
        data.stats.density_max,
        config.density_unit,
    ));

    out.push_str("\nSolver:\n");
    out.push_str(&format!(
        "- Levenberg-Marquardt, {} iterations ({})\n",
        fit.iterations,
        fit.termination.display_name()
    ));
    out.push_str(&format!(
        "- SSE={:.6e} RMSE={:.6e} R2={:.6} max|r|={:.6e}\n",
        fit.quality.sse, fit.quality.rmse, fit.quality.r_squared, fit.quality.max_abs_residual
    ));

    out.push_str("\nCoefficients:\n");
    for (k, v) in fit.params.as_slice().iter().enumerate() {
        out.push_str(&format!("  p{} = {:+.10e}\n", k + 1, v));
    }
    out.push_str(&format!("  as list: {}\n", fmt_vec(fit.params.as_slice())));
    out.push('\n');

    out
}

/// Format the `top_n` largest calibration residuals (by magnitude).
pub fn format_residuals(residuals: &[SampleResidual], top_n: usize) -> String {
    let mut sorted: Vec<&SampleResidual> = residuals.iter().collect();
    sorted.sort_by(|a, b| {
        b.residual
            .abs()
            .partial_cmp(&a.residual.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut out = String::new();
    out.push_str("Largest residuals:\n");
    push_row(&mut out, &format!(
        "{:<16} {:>12} {:>12} {:>12} {:>12} {:>12}",
        "id", "low", "high", "density", "predicted", "residual"
    ));
    push_row(&mut out, &format!(
        "{:-<16} {:-<12} {:-<12} {:-<12} {:-<12} {:-<12}",
        "", "", "", "", "", ""
    ));

    for (i, r) in sorted.iter().take(top_n).enumerate() {
        let s = &r.sample;
        let id = s.id.clone().unwrap_or_else(|| format!("#{}", i + 1));
        push_row(&mut out, &format!(
            "{:<16} {:>12.6} {:>12.6} {:>12.6} {:>12.6} {:>12.3e}",
            truncate(&id, 16),
            s.low,
            s.high,
            s.density,
            r.predicted,
            r.residual,
        ));
    }

    out
}

/// Format quantification results as a table.
pub fn format_quantities(
    observations: &[IntensityObservation],
    results: &[Result<Quantity, DecompError>],
    density_unit: &str,
) -> String {
    let mut out = String::new();
    push_row(&mut out, &format!(
        "{:<16} {:>12} {:>12} {:>12} {:>14} {:>14}",
        "id", "low", "high", "volume", "density", "mass"
    ));
    push_row(&mut out, &format!(
        "{:-<16} {:-<12} {:-<12} {:-<12} {:-<14} {:-<14}",
        "", "", "", "", "", ""
    ));

    for (i, (obs, result)) in observations.iter().zip(results.iter()).enumerate() {
        let id = obs.id.clone().unwrap_or_else(|| format!("#{}", i + 1));
        let volume = obs.volume.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".to_string());
        let tail = match result {
            Ok(Quantity::Density(d)) => format!("{d:>14.6} {:>14}", "-"),
            Ok(Quantity::Mass { density, mass, .. }) => format!("{density:>14.6} {mass:>14.6}"),
            Err(e) => format!("error: {e}"),
        };
        push_row(&mut out, &format!(
            "{:<16} {:>12.6} {:>12.6} {:>12} {tail}",
            truncate(&id, 16),
            obs.low,
            obs.high,
            volume,
        ));
    }

    out.push_str(&format!("(density in {density_unit}; mass in density unit x volume unit)\n"));
    out
}

fn push_row(out: &mut String, row: &str) {
    out.push_str(row.trim_end());
    out.push('\n');
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.10e}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
