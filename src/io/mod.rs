//! Input/output: CSV ingest, calibration JSON, and CSV exports.
//!
//! The core fitting/quantification code never touches the filesystem; every
//! read or write goes through this module.

pub mod calibration;
pub mod export;
pub mod ingest;

pub use calibration::*;
pub use export::*;
pub use ingest::*;
