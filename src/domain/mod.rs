//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - model inputs (`CalibrationSample`, `IntensityObservation`)
//! - the fitted coefficient vector (`ModelParameters`)
//! - fit/quantification outputs (`CalibrationFit`, `Quantity`, `CalibrationFile`)

pub mod types;

pub use types::*;
