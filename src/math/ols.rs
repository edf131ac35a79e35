//! Linear least squares via SVD.
//!
//! Every damped Gauss–Newton step boils down to a small linear problem:
//!
//! ```text
//! minimize ‖A δ - b‖²
//! ```
//!
//! where `A` stacks the (weighted) Jacobian on top of `√λ·I`. The parameter
//! dimension is tiny (8 columns), so an SVD per step is cheap and handles the
//! rank-deficient Jacobians that show up when the calibration set does not pin
//! down every coefficient. Nalgebra's `QR::solve` is intended for square
//! systems and will panic for tall ones.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if no finite solution can be extracted.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if a.iter().any(|v| !v.is_finite()) || b.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let svd = a.clone().svd(true, true);

    // Try progressively looser singular-value cutoffs if the strict solve fails.
    for &tol in &[1e-14, 1e-12, 1e-10] {
        if let Ok(x) = svd.solve(b, tol) {
            if x.iter().all(|v| v.is_finite()) {
                return Some(x);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let b = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let x = solve_least_squares(&a, &b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-10);
        assert!((x[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn least_squares_rejects_non_finite_input() {
        let a = DMatrix::from_row_slice(2, 1, &[1.0, f64::NAN]);
        let b = DVector::from_row_slice(&[1.0, 2.0]);
        assert!(solve_least_squares(&a, &b).is_none());
    }
}
