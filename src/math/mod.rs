//! Numerical machinery: linear least squares and the nonlinear solver.

pub mod lm;
pub mod ols;
pub mod solver;

pub use lm::*;
pub use ols::*;
pub use solver::*;
