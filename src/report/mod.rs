//! Formatted terminal output for fits and quantifications.

pub mod format;

pub use format::*;
