//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - runs calibration fits / quantification / synthetic data generation
//! - prints reports
//! - writes optional exports

use clap::Parser;
use log::info;

use crate::cli::{Command, FitArgs, QuantifyArgs, SynthArgs};
use crate::data::{SynthConfig, generate_calibration_set};
use crate::domain::{FitConfig, FitOptions, ModelParameters, Quantity};
use crate::error::AppError;
use crate::quantify::quantify;

pub mod pipeline;

/// Entry point for the `dect` binary.
pub fn run() -> Result<(), AppError> {
    // `.env` may carry `DECT_*` defaults and `RUST_LOG`, so load it before
    // the logger and the argument parser look at the environment.
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Quantify(args) => handle_quantify(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_fit(&config)?;

    println!("{}", crate::report::format_fit_summary(&run.data, &run.fit, &config));
    if args.top > 0 {
        println!("{}", crate::report::format_residuals(&run.fit.residuals, args.top));
    }

    if let Some(path) = &config.export_params {
        let file = crate::io::calibration_file(&run.fit, &config.density_unit);
        crate::io::write_calibration_json(path, &file)?;
        info!("Wrote calibration to {}", path.display());
    }
    if let Some(path) = &config.export_residuals {
        crate::io::write_residuals_csv(path, &run.fit.residuals)?;
        info!("Wrote residuals to {}", path.display());
    }

    Ok(())
}

fn handle_quantify(args: QuantifyArgs) -> Result<(), AppError> {
    if let Some(input) = &args.input {
        let run = pipeline::run_quantify_batch(&args.params, input)?;
        println!(
            "{}",
            crate::report::format_quantities(&run.observations, &run.results, &run.density_unit)
        );
        if run.skipped_rows > 0 {
            println!("({} of {} input rows skipped)", run.skipped_rows, run.rows_read);
        }
        if let Some(path) = &args.export {
            crate::io::write_quantities_csv(path, &run.observations, &run.results)?;
            info!("Wrote results to {}", path.display());
        }
        return Ok(());
    }

    let (Some(low), Some(high)) = (args.low, args.high) else {
        return Err(AppError::new(2, "Provide either `--low`/`--high` or `--input`."));
    };
    let calibration = crate::io::read_calibration_json(&args.params)?;
    let quantity = quantify(low, high, &calibration.parameters, args.volume)?;

    match quantity {
        Quantity::Density(d) => {
            println!("density: {d:.10} {}", calibration.density_unit);
        }
        Quantity::Mass { density, volume, mass } => {
            println!("density: {density:.10} {}", calibration.density_unit);
            println!("volume:  {volume:.10}");
            println!("mass:    {mass:.10}");
        }
    }
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let params = ModelParameters::from_slice(&args.params)?;
    let config = SynthConfig {
        params,
        sample_count: args.sample_count,
        low_range: (args.low_min, args.low_max),
        high_range: (args.high_min, args.high_max),
        noise_sigma: args.noise,
        seed: args.seed,
    };

    let samples = generate_calibration_set(&config)?;
    crate::io::write_samples_csv(&args.out, &samples)?;
    println!("Wrote {} samples to {}", samples.len(), args.out.display());
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    let initial_guess = match &args.initial_guess {
        Some(values) => ModelParameters::from_slice(values)?,
        None => ModelParameters::zeros(),
    };

    Ok(FitConfig {
        data_path: args.data.clone(),
        options: FitOptions {
            max_iterations: args.max_iterations,
            tolerance: args.tolerance,
            initial_guess,
            jacobian: args.jacobian,
        },
        density_unit: args.density_unit.clone(),
        export_params: args.export_params.clone(),
        export_residuals: args.export_residuals.clone(),
    })
}
