//! Calibration fitting.
//!
//! Responsibilities:
//!
//! - validate the calibration set before any solver work
//! - build the residual problem for the rational model
//! - run the solver and summarize fit quality

pub mod calibration;

pub use calibration::*;
