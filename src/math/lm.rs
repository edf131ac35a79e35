//! Levenberg–Marquardt solver.
//!
//! Each iteration solves the damped Gauss–Newton system
//!
//! ```text
//! (JᵀJ + λI) δ = -Jᵀr
//! ```
//!
//! as the stacked least-squares problem `[J; √λ·I] δ ≈ [-r; 0]` (SVD, see
//! `math::ols`). The damping `λ` follows Nielsen's update rule: it shrinks after
//! a step whose actual cost reduction tracks the linear prediction and doubles
//! (with a growing multiplier) after a rejected step.
//!
//! Success is reported with the stopping rule that fired ([`Termination`]);
//! running out of iterations, an unsolvable damped system or residuals that stay
//! non-finite are returned as [`ConvergenceFailure`]s instead of a last iterate.
//!
//! A rank-deficient `J` is not an error: the `√λ·I` block keeps the stacked
//! system full rank, and the step shrinks toward the minimum-norm direction.
//! `SingularJacobian` is reserved for a Jacobian that vanishes identically
//! (no descent information at all) or a damped system that cannot be solved
//! before `λ` passes `MAX_DAMPING`. The rational calibration model never has
//! a zero Jacobian, since `∂F/∂p1 = 1/D`.

use log::{debug, trace};
use nalgebra::{DMatrix, DVector};

use crate::domain::Termination;
use crate::error::ConvergenceFailure;
use crate::math::ols::solve_least_squares;
use crate::math::solver::{LeastSquaresProblem, LeastSquaresSolver, SolverReport, SolverSettings};

/// Damping beyond which a step is considered impossible.
const MAX_DAMPING: f64 = 1e32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevenbergMarquardt {
    /// Initial damping relative to `max(diag(JᵀJ))`.
    pub initial_damping: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            initial_damping: 1e-3,
        }
    }
}

/// Why the last trial step was rejected (decides the failure kind when
/// damping runs away).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Unsolvable,
    NonFinite,
    NoImprovement,
}

impl LeastSquaresSolver for LevenbergMarquardt {
    fn solve(
        &self,
        problem: &dyn LeastSquaresProblem,
        initial: &DVector<f64>,
        settings: &SolverSettings,
    ) -> Result<SolverReport, ConvergenceFailure> {
        let tol = settings.tolerance;
        let n = problem.param_count();

        let mut p = initial.clone();
        let mut r = problem.residuals(&p);
        if !all_finite(&r) {
            return Err(ConvergenceFailure::NonFiniteResidual { iteration: 0 });
        }
        let mut cost = 0.5 * r.norm_squared();
        debug!(
            "lm: {} residuals, {n} parameters, initial cost {cost:.6e}",
            problem.residual_count()
        );

        if r.norm() <= settings.residual_target {
            return Ok(report(p, 0, Termination::ResidualBelowTolerance, &r));
        }

        let mut lambda: Option<f64> = None;
        let mut nu = 2.0;

        for iteration in 1..=settings.max_iterations {
            let jac = problem.jacobian(&p);
            if jac.iter().any(|v| !v.is_finite()) {
                return Err(ConvergenceFailure::NonFiniteResidual { iteration });
            }
            if jac.amax() == 0.0 {
                return Err(ConvergenceFailure::SingularJacobian { iteration });
            }

            let g = jac.transpose() * &r;
            if g.amax() <= tol {
                return Ok(report(p, iteration, Termination::SmallGradient, &r));
            }

            let mut lam = *lambda.get_or_insert_with(|| {
                let max_diag = (0..n)
                    .map(|k| jac.column(k).norm_squared())
                    .fold(0.0_f64, f64::max);
                self.initial_damping * max_diag.max(f64::MIN_POSITIVE)
            });

            loop {
                let step = damped_step(&jac, &r, lam);
                let Some(delta) = step else {
                    lam *= nu;
                    nu *= 2.0;
                    if lam > MAX_DAMPING {
                        return Err(fail(Rejection::Unsolvable, iteration));
                    }
                    continue;
                };

                if delta.norm() <= tol * (p.norm() + tol) {
                    debug!("lm: step below tolerance at iteration {iteration}");
                    return Ok(report(p, iteration, Termination::SmallStep, &r));
                }

                let p_new = &p + &delta;
                let r_new = problem.residuals(&p_new);
                let rejection = if all_finite(&r_new) {
                    let cost_new = 0.5 * r_new.norm_squared();
                    // Predicted reduction of the linear model: ½ δᵀ(λδ - g).
                    let predicted = 0.5 * delta.dot(&(lam * &delta - &g));
                    let rho = (cost - cost_new) / predicted;
                    trace!("lm: iter={iteration} lambda={lam:.3e} cost={cost:.6e} new={cost_new:.6e} rho={rho:.3}");

                    if predicted > 0.0 && rho > 0.0 {
                        let relative = if cost > 0.0 { (cost - cost_new) / cost } else { 0.0 };
                        p = p_new;
                        r = r_new;
                        cost = cost_new;
                        lam *= (1.0 - (2.0 * rho - 1.0).powi(3)).max(1.0 / 3.0);
                        nu = 2.0;
                        lambda = Some(lam);

                        if r.norm() <= settings.residual_target {
                            return Ok(report(p, iteration, Termination::ResidualBelowTolerance, &r));
                        }
                        if relative <= tol {
                            return Ok(report(p, iteration, Termination::SmallCostReduction, &r));
                        }
                        break;
                    }
                    Rejection::NoImprovement
                } else {
                    Rejection::NonFinite
                };

                lam *= nu;
                nu *= 2.0;
                if lam > MAX_DAMPING {
                    return Err(fail(rejection, iteration));
                }
            }
        }

        Err(ConvergenceFailure::IterationLimit {
            iterations: settings.max_iterations,
            residual_norm: r.norm(),
        })
    }
}

fn damped_step(jac: &DMatrix<f64>, r: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let m = jac.nrows();
    let n = jac.ncols();
    let sqrt_lambda = lambda.sqrt();

    let mut a = DMatrix::<f64>::zeros(m + n, n);
    a.rows_mut(0, m).copy_from(jac);
    for k in 0..n {
        a[(m + k, k)] = sqrt_lambda;
    }

    let mut b = DVector::<f64>::zeros(m + n);
    b.rows_mut(0, m).copy_from(&(-r));

    solve_least_squares(&a, &b)
}

fn fail(rejection: Rejection, iteration: usize) -> ConvergenceFailure {
    match rejection {
        Rejection::NonFinite => ConvergenceFailure::NonFiniteResidual { iteration },
        Rejection::Unsolvable | Rejection::NoImprovement => {
            ConvergenceFailure::SingularJacobian { iteration }
        }
    }
}

fn all_finite(v: &DVector<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

fn report(params: DVector<f64>, iterations: usize, termination: Termination, r: &DVector<f64>) -> SolverReport {
    SolverReport {
        params,
        iterations,
        termination,
        residual_norm: r.norm(),
    }
}
