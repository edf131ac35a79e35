//! `dect-decomp` library crate.
//!
//! Dual-energy CT material decomposition: fit a rational quadratic model that
//! maps paired low/high-energy ROI intensities to known material density, then
//! evaluate it on new intensity pairs to estimate density or mass.
//!
//! The binary (`dect`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the two core operations ([`fit::fit_calibration`], [`quantify::quantify`])
//!   can be called directly from other tools

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod quantify;
pub mod report;

pub use domain::{FitOptions, ModelParameters, Quantity};
pub use error::DecompError;
pub use fit::fit_calibration;
pub use quantify::quantify;
