//! Pure Leontief algebra: flows -> technical coefficients -> inverse -> multipliers.
//!
//! All functions are deterministic over immutable inputs. Nothing here caches;
//! memoisation lives in the `ModelStore`.

use crate::error::{EngineError, EngineResult};
use nalgebra::linalg::Schur;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Pivots below this fraction of the largest pivot are treated as zero.
pub const DEFAULT_PIVOT_TOLERANCE: f64 = 1e-12;

const SCHUR_MAX_ITERATIONS: usize = 10_000;

/// Everything derived from one model version's `(Z, x)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeontiefResult {
    /// Technical coefficients `A[i,j] = Z[i,j] / x[j]`.
    pub a: DMatrix<f64>,
    /// Leontief inverse `B = (I - A)^-1`.
    pub b: DMatrix<f64>,
    /// Output multipliers: column sums of `B`.
    pub multipliers: DVector<f64>,
    pub spectral_radius: f64,
    /// `1 - column sum of A` for every sector.
    pub value_added_ratios: DVector<f64>,
}

impl LeontiefResult {
    pub fn compute(z: &DMatrix<f64>, x: &DVector<f64>, pivot_tolerance: f64) -> EngineResult<Self> {
        let a = technical_coefficients(z, x)?;
        let b = leontief_inverse_with_tolerance(&a, pivot_tolerance)?;
        let multipliers = multipliers(&b);
        let spectral_radius = spectral_radius(&a);
        let value_added_ratios = value_added_ratios(&a);
        Ok(Self { a, b, multipliers, spectral_radius, value_added_ratios })
    }

    pub fn sector_count(&self) -> usize {
        self.a.nrows()
    }

    /// Hawkins-Simon productivity condition.
    pub fn is_productive(&self) -> bool {
        self.spectral_radius < 1.0
    }
}

pub(crate) fn ensure_square(m: &DMatrix<f64>, label: &str) -> EngineResult<usize> {
    if m.nrows() != m.ncols() {
        return Err(EngineError::validation(format!(
            "{} must be square, got {}x{}",
            label,
            m.nrows(),
            m.ncols()
        )));
    }
    if m.nrows() == 0 {
        return Err(EngineError::validation(format!("{} must have at least one sector", label)));
    }
    Ok(m.nrows())
}

/// `A[i,j] = Z[i,j] / x[j]`.
///
/// A sector with zero output cannot consume intermediate inputs, so its column is
/// defined as all-zero rather than treated as an error.
pub fn technical_coefficients(z: &DMatrix<f64>, x: &DVector<f64>) -> EngineResult<DMatrix<f64>> {
    let n = ensure_square(z, "Z")?;
    if x.len() != n {
        return Err(EngineError::validation(format!(
            "dimension mismatch: Z is {}x{} but x has {} elements",
            n,
            n,
            x.len()
        )));
    }

    let mut a = z.clone();
    for (j, mut col) in a.column_iter_mut().enumerate() {
        let xj = x[j];
        if xj == 0.0 {
            col.fill(0.0);
        } else {
            for v in col.iter_mut() {
                *v /= xj;
            }
        }
    }
    Ok(a)
}

pub fn leontief_inverse(a: &DMatrix<f64>) -> EngineResult<DMatrix<f64>> {
    leontief_inverse_with_tolerance(a, DEFAULT_PIVOT_TOLERANCE)
}

/// `B = (I - A)^-1` via an LU solve against the identity.
///
/// Fails with `SingularMatrix` when a pivot of `(I - A)` is zero or negligible
/// relative to the largest pivot, or when the solve produces non-finite values.
pub fn leontief_inverse_with_tolerance(a: &DMatrix<f64>, pivot_tolerance: f64) -> EngineResult<DMatrix<f64>> {
    let n = ensure_square(a, "A")?;
    let identity = DMatrix::<f64>::identity(n, n);
    let lu = (&identity - a).lu();

    let pivots = lu.u().diagonal();
    let max_pivot = pivots.iter().fold(0.0_f64, |m, p| m.max(p.abs()));
    let min_pivot = pivots.iter().fold(f64::INFINITY, |m, p| m.min(p.abs()));
    if max_pivot == 0.0 || !min_pivot.is_finite() || min_pivot <= pivot_tolerance * max_pivot {
        return Err(EngineError::SingularMatrix(format!(
            "(I - A) is numerically singular: smallest pivot {:.3e}, largest pivot {:.3e}",
            min_pivot, max_pivot
        )));
    }

    let b = lu
        .solve(&identity)
        .ok_or_else(|| EngineError::SingularMatrix("LU solve of (I - A) failed".into()))?;
    if b.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::SingularMatrix("(I - A)^-1 contains non-finite entries".into()));
    }
    Ok(b)
}

/// Column sums of `B`.
pub fn multipliers(b: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(b.ncols(), b.column_iter().map(|c| c.sum()))
}

pub fn value_added_ratios(a: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(a.ncols(), a.column_iter().map(|c| 1.0 - c.sum()))
}

/// Largest eigenvalue magnitude of `A`.
///
/// Eigenvalues come from a real Schur decomposition. If that fails to converge the
/// induced 1-norm (max absolute column sum) is returned instead; it is an upper
/// bound on the spectral radius, so validity checks stay conservative.
pub fn spectral_radius(a: &DMatrix<f64>) -> f64 {
    if a.is_empty() || a.nrows() != a.ncols() {
        return 0.0;
    }
    match Schur::try_new(a.clone(), f64::EPSILON, SCHUR_MAX_ITERATIONS) {
        Some(schur) => schur
            .complex_eigenvalues()
            .iter()
            .map(|l| l.norm())
            .fold(0.0_f64, f64::max),
        None => {
            let bound = a
                .column_iter()
                .map(|c| c.iter().map(|v| v.abs()).sum::<f64>())
                .fold(0.0_f64, f64::max);
            warn!(sectors = a.nrows(), bound, "Schur decomposition did not converge; using 1-norm bound");
            bound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn two_sector() -> (DMatrix<f64>, DVector<f64>) {
        (
            DMatrix::from_row_slice(2, 2, &[10.0, 5.0, 3.0, 8.0]),
            DVector::from_vec(vec![30.0, 20.0]),
        )
    }

    #[test]
    fn test_two_sector_scenario() {
        let (z, x) = two_sector();
        let res = LeontiefResult::compute(&z, &x, DEFAULT_PIVOT_TOLERANCE).unwrap();

        assert!((res.a[(0, 0)] - 1.0 / 3.0).abs() < 1e-12);
        assert!((res.a[(0, 1)] - 0.25).abs() < 1e-12);
        assert!((res.a[(1, 0)] - 0.1).abs() < 1e-12);
        assert!((res.a[(1, 1)] - 0.4).abs() < 1e-12);

        // det(I - A) = 0.375, so B = [[1.6, 2/3], [4/15, 16/9]].
        assert!((res.b[(0, 0)] - 1.6).abs() < 1e-9);
        assert!((res.b[(1, 1)] - 16.0 / 9.0).abs() < 1e-9);
        assert!((res.multipliers[0] - 28.0 / 15.0).abs() < 1e-9);
        assert!((res.multipliers[1] - 22.0 / 9.0).abs() < 1e-9);

        // Eigenvalues of A: (11/15 +- sqrt(0.104444)) / 2.
        assert!((res.spectral_radius - 0.528256).abs() < 1e-5);
        assert!(res.is_productive());
    }

    #[test]
    fn test_coefficients_are_exact_division() {
        let (z, x) = two_sector();
        let a = technical_coefficients(&z, &x).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(a[(i, j)], z[(i, j)] / x[j]);
            }
        }
    }

    #[test]
    fn test_column_sum_matches_value_added() {
        let (z, x) = two_sector();
        let a = technical_coefficients(&z, &x).unwrap();
        let va = value_added_ratios(&a);
        for j in 0..2 {
            let col: f64 = a.column(j).sum();
            assert!((col - (1.0 - va[j])).abs() < 1e-15);
        }
    }

    #[test]
    fn test_zero_output_column_is_all_zero() {
        let z = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 2.0, 0.0]);
        let x = DVector::from_vec(vec![10.0, 0.0]);
        let a = technical_coefficients(&z, &x).unwrap();
        assert_eq!(a[(0, 1)], 0.0);
        assert_eq!(a[(1, 1)], 0.0);
        assert_eq!(a[(1, 0)], 0.2);
    }

    #[rstest]
    #[case(DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]))]
    #[case(DMatrix::from_row_slice(2, 2, &[0.5, 0.5, 0.5, 0.5]))]
    fn test_singular_inverse_is_reported(#[case] a: DMatrix<f64>) {
        let err = leontief_inverse(&a).unwrap_err();
        assert!(matches!(err, EngineError::SingularMatrix(_)), "got {:?}", err);
    }

    #[test]
    fn test_productive_inverse_is_non_negative() {
        let a = DMatrix::from_row_slice(3, 3, &[0.2, 0.1, 0.3, 0.05, 0.4, 0.1, 0.1, 0.2, 0.25]);
        assert!(spectral_radius(&a) < 1.0);
        let b = leontief_inverse(&a).unwrap();
        assert!(b.iter().all(|&v| v >= -1e-12));
        // (I - A) * B == I
        let check = (DMatrix::<f64>::identity(3, 3) - &a) * &b;
        assert!((check - DMatrix::<f64>::identity(3, 3)).amax() < 1e-12);
    }

    #[test]
    fn test_spectral_radius_with_complex_eigenvalues() {
        // Rotation scaled by 0.5: eigenvalues +-0.5i.
        let a = DMatrix::from_row_slice(2, 2, &[0.0, -0.5, 0.5, 0.0]);
        assert!((spectral_radius(&a) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch_is_validation_error() {
        let z = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(matches!(technical_coefficients(&z, &x), Err(EngineError::Validation(_))));
    }
}
