//! Command-line parsing for the dual-energy calibration tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.
//!
//! Solver knobs fall back to `DECT_*` environment variables (which may come from
//! a `.env` file) before their built-in defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::JacobianMode;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "dect", version, about = "Dual-energy CT material decomposition")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit calibration coefficients from a CSV of known inserts.
    Fit(FitArgs),
    /// Quantify density (or mass) for new intensity pairs with a saved calibration.
    Quantify(QuantifyArgs),
    /// Write a synthetic calibration CSV generated from known coefficients.
    Synth(SynthArgs),
}

/// Options for `dect fit`.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Calibration CSV (`low`, `high`, `density`, optional `weight`, `id`).
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Solver iteration budget.
    #[arg(long, env = "DECT_MAX_ITERATIONS", default_value_t = 200)]
    pub max_iterations: usize,

    /// Convergence tolerance (residual, step, gradient and cost reduction).
    #[arg(long, env = "DECT_TOLERANCE", default_value_t = 1e-10)]
    pub tolerance: f64,

    /// Starting coefficients `p1,...,p8` (default: all zeros).
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, value_name = "P1,..,P8")]
    pub initial_guess: Option<Vec<f64>>,

    /// Jacobian evaluation.
    #[arg(long, value_enum, env = "DECT_JACOBIAN", default_value_t = JacobianMode::Analytic)]
    pub jacobian: JacobianMode,

    /// Label for the density unit of the calibration set.
    #[arg(long, env = "DECT_DENSITY_UNIT", default_value = "mg/cm3")]
    pub density_unit: String,

    /// Show the N largest calibration residuals.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Save the fitted calibration to JSON.
    #[arg(long = "export-params", value_name = "JSON")]
    pub export_params: Option<PathBuf>,

    /// Export per-sample residuals to CSV.
    #[arg(long = "export-residuals", value_name = "CSV")]
    pub export_residuals: Option<PathBuf>,
}

/// Options for `dect quantify`.
#[derive(Debug, Parser, Clone)]
pub struct QuantifyArgs {
    /// Calibration JSON produced by `dect fit --export-params`.
    #[arg(long, value_name = "JSON")]
    pub params: PathBuf,

    /// Low-energy intensity of a single ROI.
    #[arg(long, allow_hyphen_values = true, requires = "high", conflicts_with = "input")]
    pub low: Option<f64>,

    /// High-energy intensity of a single ROI.
    #[arg(long, allow_hyphen_values = true, requires = "low")]
    pub high: Option<f64>,

    /// ROI volume; switches the output from density to mass.
    #[arg(long)]
    pub volume: Option<f64>,

    /// Observation CSV (`low`, `high`, optional `volume`, `id`).
    #[arg(long, value_name = "CSV", required_unless_present = "low")]
    pub input: Option<PathBuf>,

    /// Export batch results to CSV.
    #[arg(long, value_name = "CSV", requires = "input")]
    pub export: Option<PathBuf>,
}

/// Options for `dect synth`.
#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Generating coefficients `p1,...,p8`.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, value_name = "P1,..,P8")]
    pub params: Vec<f64>,

    /// Output calibration CSV.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,

    /// Number of samples to generate.
    #[arg(short = 'n', long, alias = "n", default_value_t = 25)]
    pub sample_count: usize,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub low_min: f64,

    #[arg(long, default_value_t = 1.0, allow_hyphen_values = true)]
    pub low_max: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub high_min: f64,

    #[arg(long, default_value_t = 1.0, allow_hyphen_values = true)]
    pub high_max: f64,

    /// Standard deviation of Gaussian density noise.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_args_parse_negative_initial_guess() {
        let cli = Cli::try_parse_from([
            "dect",
            "fit",
            "--data",
            "calib.csv",
            "--initial-guess",
            "-0.5,1,1,0,0,0,0,0",
        ])
        .unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.initial_guess.unwrap(), vec![-0.5, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(args.jacobian, JacobianMode::Analytic);
    }

    #[test]
    fn quantify_needs_pair_or_input() {
        assert!(Cli::try_parse_from(["dect", "quantify", "--params", "p.json"]).is_err());
        assert!(Cli::try_parse_from(["dect", "quantify", "--params", "p.json", "--low", "0.3"]).is_err());
        assert!(
            Cli::try_parse_from(["dect", "quantify", "--params", "p.json", "--low", "0.3", "--high", "0.4"])
                .is_ok()
        );
        assert!(Cli::try_parse_from(["dect", "quantify", "--params", "p.json", "--input", "obs.csv"]).is_ok());
    }
}
