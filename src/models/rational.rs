//! Rational quadratic response surface.
//!
//! ```text
//!              p1 + p2·l + p3·h + p4·l² + p5·l·h + p6·h²
//! F(l, h; p) = -----------------------------------------
//!                        1 + p7·l + p8·h
//! ```
//!
//! `l` is the low-energy intensity and `h` the high-energy intensity. The
//! leading `1` in the denominator fixes the scale of the coefficients.
//!
//! The fitter relies on two primitive operations:
//! - evaluate `F` (for residuals and quantification)
//! - the gradient `∂F/∂p` (for the Jacobian)

/// Below this magnitude the denominator is treated as zero.
pub const DENOMINATOR_EPS: f64 = 1e-12;

/// Numerator basis terms `[1, l, h, l², l·h, h²]`.
#[inline]
pub fn numerator_basis(low: f64, high: f64) -> [f64; 6] {
    [1.0, low, high, low * low, low * high, high * high]
}

/// Quadratic numerator.
///
/// # Panics
/// Panics if `p` has fewer than 8 entries.
#[inline]
pub fn numerator(p: &[f64], low: f64, high: f64) -> f64 {
    let b = numerator_basis(low, high);
    p[0] * b[0] + p[1] * b[1] + p[2] * b[2] + p[3] * b[3] + p[4] * b[4] + p[5] * b[5]
}

/// Affine denominator `1 + p7·l + p8·h`.
#[inline]
pub fn denominator(p: &[f64], low: f64, high: f64) -> f64 {
    1.0 + p[6] * low + p[7] * high
}

/// Whether a denominator value is too close to zero to divide by.
#[inline]
pub fn is_degenerate(denominator: f64) -> bool {
    !denominator.is_finite() || denominator.abs() <= DENOMINATOR_EPS
}

/// Evaluate `F(l, h; p)`.
///
/// No guard is applied here: a vanishing denominator yields `±inf`/`NaN`.
/// Callers that hand values to users go through `quantify`, which reports it.
#[inline]
pub fn evaluate(p: &[f64], low: f64, high: f64) -> f64 {
    numerator(p, low, high) / denominator(p, low, high)
}

/// Gradient of `F` with respect to the 8 coefficients.
///
/// - `∂F/∂p1..p6 = basis_k / D`
/// - `∂F/∂p7 = -F·l / D`
/// - `∂F/∂p8 = -F·h / D`
pub fn gradient(p: &[f64], low: f64, high: f64) -> [f64; 8] {
    let b = numerator_basis(low, high);
    let d = denominator(p, low, high);
    let f = numerator(p, low, high) / d;

    let mut out = [0.0; 8];
    for k in 0..6 {
        out[k] = b[k] / d;
    }
    out[6] = -f * low / d;
    out[7] = -f * high / d;
    out
}
