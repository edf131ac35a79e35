//! Nonlinear least-squares abstraction.
//!
//! A [`LeastSquaresProblem`] knows how to produce a residual vector and its
//! Jacobian for a parameter vector. A [`LeastSquaresSolver`] knows how to drive
//! such a problem to a minimum of `½‖r(p)‖²`. The calibration fitter only talks
//! to these traits, so the optimiser can be swapped without touching the model.

use nalgebra::{DMatrix, DVector};

use crate::domain::Termination;
use crate::error::ConvergenceFailure;

/// Residuals `r(p)` and Jacobian `∂r/∂p` of a least-squares objective.
pub trait LeastSquaresProblem: Sync {
    fn residual_count(&self) -> usize;

    fn param_count(&self) -> usize;

    /// Residual vector at `params` (length `residual_count()`).
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;

    /// Jacobian at `params` (`residual_count() × param_count()`).
    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64>;
}

/// Stopping rules shared by all solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Relative threshold for step size, gradient and cost reduction.
    pub tolerance: f64,
    /// Absolute residual norm at which the problem counts as solved.
    pub residual_target: f64,
}

/// Outcome of a converged solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverReport {
    pub params: DVector<f64>,
    pub iterations: usize,
    pub termination: Termination,
    pub residual_norm: f64,
}

/// A strategy for minimizing a [`LeastSquaresProblem`].
pub trait LeastSquaresSolver {
    fn solve(
        &self,
        problem: &dyn LeastSquaresProblem,
        initial: &DVector<f64>,
        settings: &SolverSettings,
    ) -> Result<SolverReport, ConvergenceFailure>;
}

/// Forward-difference Jacobian of `problem.residuals`.
pub fn forward_difference_jacobian(
    problem: &dyn LeastSquaresProblem,
    params: &DVector<f64>,
) -> DMatrix<f64> {
    let base = problem.residuals(params);
    let m = problem.residual_count();
    let n = params.len();
    let sqrt_eps = f64::EPSILON.sqrt();

    let mut jac = DMatrix::<f64>::zeros(m, n);
    for k in 0..n {
        let step = sqrt_eps * params[k].abs().max(1.0);
        let mut shifted = params.clone();
        shifted[k] += step;
        let r = problem.residuals(&shifted);
        for i in 0..m {
            jac[(i, k)] = (r[i] - base[i]) / step;
        }
    }
    jac
}
