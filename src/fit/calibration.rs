//! Calibration fitting for the dual-energy response model.
//!
//! Given:
//! - calibration inserts `(lowᵢ, highᵢ)` with known densities `dᵢ`
//! - optional weights `wᵢ`
//! - an initial coefficient vector
//!
//! we minimize `Σ wᵢ (F(lowᵢ, highᵢ; p) - dᵢ)²` with a nonlinear least-squares
//! solver. Inputs are validated before any solver work starts; a solve that does
//! not converge comes back as `DecompError::FitConvergence`.

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::{
    CalibrationFit, CalibrationSample, FitOptions, FitQuality, JacobianMode, ModelParameters,
    PARAM_COUNT, SampleResidual,
};
use crate::error::DecompError;
use crate::math::{
    LeastSquaresProblem, LeastSquaresSolver, LevenbergMarquardt, SolverSettings,
    forward_difference_jacobian,
};
use crate::models::{evaluate, gradient};

/// Sample count from which residual/Jacobian rows are evaluated in parallel.
const PARALLEL_MIN_SAMPLES: usize = 512;

/// Fit the model to `N × 2` intensity pairs (`[low, high]`) and `N` densities.
///
/// All samples carry unit weight. Use [`fit_samples`] for weighted or labelled
/// calibration sets.
pub fn fit_calibration(
    intensity_pairs: &[[f64; 2]],
    known_densities: &[f64],
    options: &FitOptions,
) -> Result<CalibrationFit, DecompError> {
    if intensity_pairs.len() != known_densities.len() {
        return Err(DecompError::DimensionMismatch {
            what: "known_densities",
            expected: intensity_pairs.len(),
            actual: known_densities.len(),
        });
    }

    let samples: Vec<CalibrationSample> = intensity_pairs
        .iter()
        .zip(known_densities.iter())
        .map(|(&[low, high], &density)| CalibrationSample::new(low, high, density))
        .collect();

    fit_samples(&samples, options)
}

/// Fit the model to a calibration set using Levenberg–Marquardt.
pub fn fit_samples(
    samples: &[CalibrationSample],
    options: &FitOptions,
) -> Result<CalibrationFit, DecompError> {
    fit_calibration_with(&LevenbergMarquardt::default(), samples, options)
}

/// Fit the model to a calibration set with a caller-chosen solver.
pub fn fit_calibration_with(
    solver: &dyn LeastSquaresSolver,
    samples: &[CalibrationSample],
    options: &FitOptions,
) -> Result<CalibrationFit, DecompError> {
    validate_options(options)?;
    validate_samples(samples)?;

    let n = samples.len();
    if n < PARAM_COUNT {
        warn!(
            "Calibration set has {n} samples for {PARAM_COUNT} coefficients; the fit is under-determined."
        );
    }

    let problem = CalibrationProblem::new(samples, options.jacobian);
    let settings = SolverSettings {
        max_iterations: options.max_iterations,
        tolerance: options.tolerance,
        residual_target: options.tolerance * problem.target_norm().max(1.0),
    };
    let initial = DVector::from_row_slice(options.initial_guess.as_slice());

    debug!(
        "Fitting {n} samples (max_iterations={}, tolerance={:e}, jacobian={:?})",
        options.max_iterations, options.tolerance, options.jacobian
    );
    let solved = solver.solve(&problem, &initial, &settings)?;

    let params = ModelParameters::from_slice(solved.params.as_slice())?;
    let residuals = compute_residuals(samples, &params);
    let quality = fit_quality(&residuals);

    info!(
        "Calibration converged after {} iterations ({}): RMSE={:.6e}",
        solved.iterations,
        solved.termination.display_name(),
        quality.rmse
    );

    Ok(CalibrationFit {
        params,
        quality,
        iterations: solved.iterations,
        termination: solved.termination,
        residuals,
    })
}

fn validate_options(options: &FitOptions) -> Result<(), DecompError> {
    if options.max_iterations == 0 {
        return Err(DecompError::InvalidOptions(
            "max_iterations must be >= 1".to_string(),
        ));
    }
    if !(options.tolerance.is_finite() && options.tolerance > 0.0) {
        return Err(DecompError::InvalidOptions(format!(
            "tolerance must be finite and > 0 (got {})",
            options.tolerance
        )));
    }
    if !options.initial_guess.is_finite() {
        return Err(DecompError::InvalidOptions(
            "initial_guess must be finite".to_string(),
        ));
    }
    Ok(())
}

fn validate_samples(samples: &[CalibrationSample]) -> Result<(), DecompError> {
    if samples.is_empty() {
        return Err(DecompError::EmptyCalibration);
    }
    for (index, s) in samples.iter().enumerate() {
        if !s.low.is_finite() {
            return Err(DecompError::NonFiniteInput { what: "low-energy intensity", index });
        }
        if !s.high.is_finite() {
            return Err(DecompError::NonFiniteInput { what: "high-energy intensity", index });
        }
        if !s.density.is_finite() {
            return Err(DecompError::NonFiniteInput { what: "density", index });
        }
        if !(s.weight.is_finite() && s.weight > 0.0) {
            return Err(DecompError::InvalidWeight { index, weight: s.weight });
        }
    }
    Ok(())
}

/// Weighted residuals `√wᵢ·(F(lowᵢ, highᵢ; p) - dᵢ)` of a calibration set.
struct CalibrationProblem {
    low: Vec<f64>,
    high: Vec<f64>,
    density: Vec<f64>,
    sqrt_w: Vec<f64>,
    jacobian: JacobianMode,
}

impl CalibrationProblem {
    fn new(samples: &[CalibrationSample], jacobian: JacobianMode) -> Self {
        Self {
            low: samples.iter().map(|s| s.low).collect(),
            high: samples.iter().map(|s| s.high).collect(),
            density: samples.iter().map(|s| s.density).collect(),
            sqrt_w: samples.iter().map(|s| s.weight.sqrt()).collect(),
            jacobian,
        }
    }

    /// Norm of the weighted density vector (scale for the residual target).
    fn target_norm(&self) -> f64 {
        self.density
            .iter()
            .zip(self.sqrt_w.iter())
            .map(|(d, sw)| (d * sw).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    fn residual_at(&self, p: &[f64], i: usize) -> f64 {
        self.sqrt_w[i] * (evaluate(p, self.low[i], self.high[i]) - self.density[i])
    }

    fn gradient_row(&self, p: &[f64], i: usize) -> [f64; PARAM_COUNT] {
        let mut row = gradient(p, self.low[i], self.high[i]);
        for v in &mut row {
            *v *= self.sqrt_w[i];
        }
        row
    }

    fn analytic_jacobian(&self, p: &[f64]) -> DMatrix<f64> {
        let n = self.low.len();
        let rows: Vec<[f64; PARAM_COUNT]> = if n >= PARALLEL_MIN_SAMPLES {
            (0..n).into_par_iter().map(|i| self.gradient_row(p, i)).collect()
        } else {
            (0..n).map(|i| self.gradient_row(p, i)).collect()
        };
        DMatrix::from_fn(n, PARAM_COUNT, |i, k| rows[i][k])
    }
}

impl LeastSquaresProblem for CalibrationProblem {
    fn residual_count(&self) -> usize {
        self.low.len()
    }

    fn param_count(&self) -> usize {
        PARAM_COUNT
    }

    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        let p = params.as_slice();
        let n = self.low.len();
        let values: Vec<f64> = if n >= PARALLEL_MIN_SAMPLES {
            (0..n).into_par_iter().map(|i| self.residual_at(p, i)).collect()
        } else {
            (0..n).map(|i| self.residual_at(p, i)).collect()
        };
        DVector::from_vec(values)
    }

    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64> {
        match self.jacobian {
            JacobianMode::Analytic => self.analytic_jacobian(params.as_slice()),
            JacobianMode::Forward => forward_difference_jacobian(self, params),
        }
    }
}

/// Compute fitted values and residuals for each calibration sample.
pub fn compute_residuals(samples: &[CalibrationSample], params: &ModelParameters) -> Vec<SampleResidual> {
    samples
        .iter()
        .map(|s| {
            let predicted = evaluate(params.as_slice(), s.low, s.high);
            SampleResidual {
                sample: s.clone(),
                predicted,
                residual: s.density - predicted,
            }
        })
        .collect()
}

/// Unweighted quality diagnostics over a residual list.
pub fn fit_quality(residuals: &[SampleResidual]) -> FitQuality {
    let n = residuals.len();
    let sse: f64 = residuals.iter().map(|r| r.residual * r.residual).sum();
    let max_abs_residual = residuals
        .iter()
        .map(|r| r.residual.abs())
        .fold(0.0_f64, f64::max);

    let mean = residuals.iter().map(|r| r.sample.density).sum::<f64>() / n.max(1) as f64;
    let sst: f64 = residuals
        .iter()
        .map(|r| (r.sample.density - mean).powi(2))
        .sum();
    // A constant calibration target has no variance to explain.
    let r_squared = if sst > 0.0 { 1.0 - sse / sst } else if sse == 0.0 { 1.0 } else { 0.0 };

    FitQuality {
        sse,
        rmse: (sse / n.max(1) as f64).sqrt(),
        r_squared,
        max_abs_residual,
        n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Termination;
    use crate::error::ConvergenceFailure;
    use crate::math::SolverReport;
    use crate::quantify::quantify;

    const P_STAR: [f64; 8] = [0.01, 0.8, 1.2, 0.5, -0.3, 0.2, 0.3, -0.2];

    /// 5×5 grid of intensity pairs with exact model densities.
    fn exact_grid(p: &[f64; 8]) -> (Vec<[f64; 2]>, Vec<f64>) {
        let mut pairs = Vec::new();
        let mut densities = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                let low = 0.1 + 0.2 * i as f64;
                let high = 0.15 + 0.2 * j as f64;
                pairs.push([low, high]);
                densities.push(evaluate(p, low, high));
            }
        }
        (pairs, densities)
    }

    /// Several low/high splits per density with `F = low + high`.
    fn sum_model_set() -> (Vec<[f64; 2]>, Vec<f64>) {
        let mut pairs = Vec::new();
        let mut densities = Vec::new();
        for &d in &[0.025, 0.050, 0.100] {
            for &frac in &[0.2, 0.35, 0.5, 0.65, 0.8] {
                pairs.push([d * frac, d * (1.0 - frac)]);
                densities.push(d);
            }
        }
        (pairs, densities)
    }

    #[test]
    fn recovers_known_parameters_from_exact_data() {
        let (pairs, densities) = exact_grid(&P_STAR);
        let fit = fit_calibration(&pairs, &densities, &FitOptions::default()).unwrap();

        for (k, (got, want)) in fit.params.as_slice().iter().zip(P_STAR.iter()).enumerate() {
            assert!((got - want).abs() < 1e-4, "p{}: got {got}, want {want}", k + 1);
        }
        // Held-out point off the calibration grid.
        let held_out = evaluate(fit.params.as_slice(), 0.42, 0.37);
        assert!((held_out - evaluate(&P_STAR, 0.42, 0.37)).abs() < 1e-6);
        assert!(fit.quality.rmse < 1e-8);
    }

    #[test]
    fn sum_model_reproduces_low_plus_high() {
        let (pairs, densities) = sum_model_set();
        let fit = fit_calibration(&pairs, &densities, &FitOptions::default()).unwrap();

        // p7/p8 are not identifiable here (N/D = low + high for a family of
        // coefficient vectors), so compare model outputs rather than raw p.
        let p = fit.params.as_slice();
        for ([low, high], d) in pairs.iter().zip(densities.iter()) {
            assert!((evaluate(p, *low, *high) - d).abs() < 1e-8);
        }
        let density = quantify(0.3, 0.4, &fit.params, None).unwrap().value();
        assert!((density - 0.7).abs() < 1e-4, "density={density}");
    }

    #[test]
    fn forward_difference_jacobian_also_converges() {
        let (pairs, densities) = exact_grid(&P_STAR);
        let options = FitOptions {
            jacobian: JacobianMode::Forward,
            tolerance: 1e-9,
            ..FitOptions::default()
        };
        let fit = fit_calibration(&pairs, &densities, &options).unwrap();
        let p = fit.params.as_slice();
        assert!((evaluate(p, 0.42, 0.37) - evaluate(&P_STAR, 0.42, 0.37)).abs() < 1e-5);
    }

    #[test]
    fn residuals_in_fit_match_model_evaluation() {
        let (pairs, densities) = exact_grid(&P_STAR);
        let fit = fit_calibration(&pairs, &densities, &FitOptions::default()).unwrap();
        for r in &fit.residuals {
            let direct = evaluate(fit.params.as_slice(), r.sample.low, r.sample.high);
            assert_eq!(r.predicted, direct);
            assert_eq!(r.residual, r.sample.density - direct);
        }
    }

    #[test]
    fn analytic_jacobian_matches_forward_differences() {
        let (pairs, densities) = exact_grid(&P_STAR);
        let samples: Vec<CalibrationSample> = pairs
            .iter()
            .zip(densities.iter())
            .map(|(&[l, h], &d)| CalibrationSample::new(l, h, d))
            .collect();
        let problem = CalibrationProblem::new(&samples, JacobianMode::Analytic);
        let at = DVector::from_row_slice(&[0.1, 0.5, 0.9, 0.2, 0.1, -0.1, 0.2, 0.1]);

        let analytic = problem.jacobian(&at);
        let numeric = forward_difference_jacobian(&problem, &at);
        assert_eq!(analytic.shape(), (25, 8));
        assert!((analytic - numeric).amax() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_are_rejected_before_solving() {
        struct PanicSolver;
        impl LeastSquaresSolver for PanicSolver {
            fn solve(
                &self,
                _: &dyn LeastSquaresProblem,
                _: &DVector<f64>,
                _: &SolverSettings,
            ) -> Result<SolverReport, ConvergenceFailure> {
                panic!("solver must not run on invalid input");
            }
        }

        let err = fit_calibration(&[[0.1, 0.2], [0.3, 0.4]], &[1.0], &FitOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            DecompError::DimensionMismatch {
                what: "known_densities",
                expected: 2,
                actual: 1,
            }
        );

        let bad = [CalibrationSample::new(f64::NAN, 0.2, 1.0)];
        let err = fit_calibration_with(&PanicSolver, &bad, &FitOptions::default()).unwrap_err();
        assert!(matches!(err, DecompError::NonFiniteInput { index: 0, .. }));
    }

    #[test]
    fn empty_set_and_bad_options_are_rejected() {
        assert_eq!(
            fit_calibration(&[], &[], &FitOptions::default()).unwrap_err(),
            DecompError::EmptyCalibration
        );

        let options = FitOptions {
            max_iterations: 0,
            ..FitOptions::default()
        };
        let err = fit_calibration(&[[0.1, 0.2]], &[1.0], &options).unwrap_err();
        assert!(matches!(err, DecompError::InvalidOptions(_)));

        let mut sample = CalibrationSample::new(0.1, 0.2, 1.0);
        sample.weight = 0.0;
        let err = fit_samples(&[sample], &FitOptions::default()).unwrap_err();
        assert!(matches!(err, DecompError::InvalidWeight { index: 0, .. }));
    }

    #[test]
    fn exhausted_iteration_budget_surfaces_as_error() {
        let (pairs, densities) = exact_grid(&P_STAR);
        let options = FitOptions {
            max_iterations: 1,
            ..FitOptions::default()
        };
        let err = fit_calibration(&pairs, &densities, &options).unwrap_err();
        assert!(
            matches!(
                err,
                DecompError::FitConvergence(ConvergenceFailure::IterationLimit { iterations: 1, .. })
            ),
            "got {err:?}"
        );
    }

    #[test]
    fn degenerate_initial_guess_is_a_fit_failure() {
        // Denominator 1 - low - high vanishes at the first sample.
        let pairs = [[0.5, 0.5], [0.1, 0.2], [0.2, 0.3]];
        let densities = [1.0, 0.3, 0.5];
        let options = FitOptions {
            initial_guess: ModelParameters::new([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.0, -1.0]),
            ..FitOptions::default()
        };
        let err = fit_calibration(&pairs, &densities, &options).unwrap_err();
        assert_eq!(
            err,
            DecompError::FitConvergence(ConvergenceFailure::NonFiniteResidual { iteration: 0 })
        );
    }

    #[test]
    fn weights_pull_the_fit_toward_heavy_samples() {
        // Constant model (only p1 moves much) on conflicting targets at the same point.
        let mut heavy = CalibrationSample::new(0.0, 0.0, 1.0);
        heavy.weight = 9.0;
        let light = CalibrationSample::new(0.0, 0.0, 2.0);
        let fit = fit_samples(&[heavy, light], &FitOptions::default()).unwrap();

        // Weighted mean: (9·1 + 1·2) / 10.
        assert!((fit.params.as_slice()[0] - 1.1).abs() < 1e-6);
        assert_ne!(fit.termination, Termination::ResidualBelowTolerance);
    }

    #[test]
    fn quality_of_perfect_fit() {
        let samples = [CalibrationSample::new(0.1, 0.2, 0.3), CalibrationSample::new(0.2, 0.2, 0.4)];
        let p = ModelParameters::new([0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let q = fit_quality(&compute_residuals(&samples, &p));
        assert_eq!(q.n, 2);
        assert!(q.sse < 1e-30);
        assert!((q.r_squared - 1.0).abs() < 1e-12);
    }
}
