//! Biproportional (RAS) matrix balancing.
//!
//! Rows and columns are rescaled alternately until both sets of margins match
//! their targets. Scaling is purely multiplicative, so an entry that starts at
//! zero stays zero: balancing never invents a flow the base table did not have.

use crate::compute::leontief::ensure_square;
use crate::config::RasConfig;
use crate::error::{EngineError, EngineResult};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasResult {
    pub z_balanced: DMatrix<f64>,
    pub converged: bool,
    pub iterations: usize,
    /// Maximum relative deviation of any row or column total from its target.
    pub final_error: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RasBalancer {
    config: RasConfig,
}

impl RasBalancer {
    pub fn new(config: RasConfig) -> Self {
        Self { config }
    }

    pub fn balance(
        &self,
        z0: &DMatrix<f64>,
        target_row_totals: &DVector<f64>,
        target_col_totals: &DVector<f64>,
    ) -> EngineResult<RasResult> {
        Self::balance_with(
            z0,
            target_row_totals,
            target_col_totals,
            self.config.max_iterations,
            self.config.tolerance,
        )
    }

    /// Runs RAS with explicit limits.
    ///
    /// Exhausting `max_iterations` is not an error: the iterate with the lowest
    /// measured error is returned with `converged = false`.
    pub fn balance_with(
        z0: &DMatrix<f64>,
        target_row_totals: &DVector<f64>,
        target_col_totals: &DVector<f64>,
        max_iterations: usize,
        tolerance: f64,
    ) -> EngineResult<RasResult> {
        validate_inputs(z0, target_row_totals, target_col_totals, max_iterations, tolerance)?;
        let n = z0.nrows();

        let row_grand = target_row_totals.sum();
        let col_grand = target_col_totals.sum();
        if relative_deviation(row_grand, col_grand) > tolerance {
            warn!(
                row_grand,
                col_grand, "row and column targets have different grand totals; RAS cannot fully converge"
            );
        }

        let mut z = z0.clone();
        let mut best = z0.clone();
        let mut best_error = f64::INFINITY;

        for iteration in 1..=max_iterations {
            // R step
            for i in 0..n {
                let sum: f64 = z.row(i).sum();
                if sum > 0.0 {
                    let factor = target_row_totals[i] / sum;
                    for v in z.row_mut(i).iter_mut() {
                        *v *= factor;
                    }
                }
            }

            // S step
            for j in 0..n {
                let sum: f64 = z.column(j).sum();
                if sum > 0.0 {
                    let factor = target_col_totals[j] / sum;
                    for v in z.column_mut(j).iter_mut() {
                        *v *= factor;
                    }
                }
            }

            let error = margin_error(&z, target_row_totals, target_col_totals);
            debug!(iteration, error, "ras iteration");

            if error <= tolerance {
                return Ok(RasResult { z_balanced: z, converged: true, iterations: iteration, final_error: error });
            }
            if error < best_error {
                best_error = error;
                best.copy_from(&z);
            }
        }

        warn!(
            iterations = max_iterations,
            final_error = best_error,
            tolerance,
            "ras balancing did not converge"
        );
        Ok(RasResult {
            z_balanced: best,
            converged: false,
            iterations: max_iterations,
            final_error: best_error,
        })
    }
}

fn validate_inputs(
    z0: &DMatrix<f64>,
    rows: &DVector<f64>,
    cols: &DVector<f64>,
    max_iterations: usize,
    tolerance: f64,
) -> EngineResult<()> {
    let n = ensure_square(z0, "Z0")?;
    if rows.len() != n {
        return Err(EngineError::validation(format!(
            "dimension mismatch: Z0 is {}x{} but target_row_totals has {} elements",
            n,
            n,
            rows.len()
        )));
    }
    if cols.len() != n {
        return Err(EngineError::validation(format!(
            "dimension mismatch: Z0 is {}x{} but target_col_totals has {} elements",
            n,
            n,
            cols.len()
        )));
    }
    if z0.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(EngineError::validation("Z0 must be finite and non-negative"));
    }
    if rows.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(EngineError::validation("target_row_totals must be finite and non-negative"));
    }
    if cols.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(EngineError::validation("target_col_totals must be finite and non-negative"));
    }
    // A zero target would wipe out every positive flow in that row or column.
    for i in 0..n {
        if rows[i] == 0.0 && z0.row(i).sum() > 0.0 {
            return Err(EngineError::validation(format!(
                "target_row_totals[{}] is zero but row {} of Z0 has positive flows",
                i, i
            )));
        }
        if cols[i] == 0.0 && z0.column(i).sum() > 0.0 {
            return Err(EngineError::validation(format!(
                "target_col_totals[{}] is zero but column {} of Z0 has positive flows",
                i, i
            )));
        }
    }
    if max_iterations == 0 {
        return Err(EngineError::validation("max_iterations must be at least 1"));
    }
    if !(tolerance > 0.0 && tolerance.is_finite()) {
        return Err(EngineError::validation(format!(
            "tolerance must be positive and finite, got {}",
            tolerance
        )));
    }
    Ok(())
}

/// `|achieved - target| / target`, falling back to the absolute deviation for a zero target.
fn relative_deviation(achieved: f64, target: f64) -> f64 {
    let diff = (achieved - target).abs();
    if target > 0.0 { diff / target } else { diff }
}

fn margin_error(z: &DMatrix<f64>, rows: &DVector<f64>, cols: &DVector<f64>) -> f64 {
    let row_err = (0..z.nrows())
        .map(|i| relative_deviation(z.row(i).sum(), rows[i]))
        .fold(0.0_f64, f64::max);
    let col_err = (0..z.ncols())
        .map(|j| relative_deviation(z.column(j).sum(), cols[j]))
        .fold(0.0_f64, f64::max);
    row_err.max(col_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn base() -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 2, &[10.0, 5.0, 3.0, 8.0])
    }

    fn row_sums(z: &DMatrix<f64>) -> DVector<f64> {
        DVector::from_iterator(z.nrows(), (0..z.nrows()).map(|i| z.row(i).sum()))
    }

    fn col_sums(z: &DMatrix<f64>) -> DVector<f64> {
        DVector::from_iterator(z.ncols(), (0..z.ncols()).map(|j| z.column(j).sum()))
    }

    #[test]
    fn test_two_sector_converges_quickly() {
        let targets = DVector::from_vec(vec![35.0, 22.0]);
        let res = RasBalancer::balance_with(&base(), &targets, &targets, 100, 1e-6).unwrap();
        assert!(res.converged);
        assert!(res.iterations < 20, "took {} iterations", res.iterations);
        assert!(res.final_error < 1e-6);

        let rows = row_sums(&res.z_balanced);
        let cols = col_sums(&res.z_balanced);
        for i in 0..2 {
            assert!((rows[i] - targets[i]).abs() / targets[i] < 1e-6);
            assert!((cols[i] - targets[i]).abs() / targets[i] < 1e-6);
        }
    }

    #[test]
    fn test_already_balanced_matrix_is_unchanged() {
        let z = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 2.0, 6.0, 3.0, 0.5, 0.0, 9.0]);
        let res = RasBalancer::balance_with(&z, &row_sums(&z), &col_sums(&z), 50, 1e-10).unwrap();
        assert!(res.converged);
        assert_eq!(res.iterations, 1);
        assert!((res.z_balanced - &z).amax() < 1e-9);
    }

    #[test]
    fn test_structural_zeros_preserved() {
        let z = DMatrix::from_row_slice(3, 3, &[4.0, 0.0, 2.0, 0.0, 6.0, 3.0, 1.0, 2.0, 0.0]);
        let rows = DVector::from_vec(vec![8.0, 10.0, 4.0]);
        let cols = DVector::from_vec(vec![6.0, 9.0, 7.0]);
        let res = RasBalancer::balance_with(&z, &rows, &cols, 500, 1e-9).unwrap();
        for (orig, bal) in z.iter().zip(res.z_balanced.iter()) {
            assert_eq!(*orig == 0.0, *bal == 0.0);
        }
    }

    #[test]
    fn test_non_convergence_is_reported_not_raised() {
        // Grand totals disagree (57 vs 60), so the margins can never both match.
        let rows = DVector::from_vec(vec![35.0, 22.0]);
        let cols = DVector::from_vec(vec![38.0, 22.0]);
        let res = RasBalancer::balance_with(&base(), &rows, &cols, 25, 1e-10).unwrap();
        assert!(!res.converged);
        assert_eq!(res.iterations, 25);
        assert!(res.final_error > 1e-10 && res.final_error.is_finite());
    }

    #[test]
    fn test_zero_row_left_unscaled() {
        let z = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 3.0, 8.0]);
        let rows = DVector::from_vec(vec![5.0, 11.0]);
        let cols = DVector::from_vec(vec![3.0, 8.0]);
        let res = RasBalancer::balance_with(&z, &rows, &cols, 10, 1e-9).unwrap();
        assert_eq!(res.z_balanced[(0, 0)], 0.0);
        assert_eq!(res.z_balanced[(0, 1)], 0.0);
        assert!(res.z_balanced.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_target_allowed_on_empty_row() {
        let z = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 3.0, 8.0]);
        let rows = DVector::from_vec(vec![0.0, 11.0]);
        let cols = DVector::from_vec(vec![3.0, 8.0]);
        let res = RasBalancer::balance_with(&z, &rows, &cols, 10, 1e-9).unwrap();
        assert!(res.converged);
        assert_eq!(res.z_balanced, z);
    }

    #[rstest]
    #[case(DVector::from_vec(vec![1.0]), DVector::from_vec(vec![1.0, 1.0]), "target_row_totals")]
    #[case(DVector::from_vec(vec![1.0, 1.0]), DVector::from_vec(vec![1.0]), "target_col_totals")]
    #[case(DVector::from_vec(vec![-1.0, 1.0]), DVector::from_vec(vec![1.0, 1.0]), "non-negative")]
    #[case(DVector::from_vec(vec![0.0, 11.0]), DVector::from_vec(vec![3.0, 8.0]), "target_row_totals[0] is zero")]
    #[case(DVector::from_vec(vec![15.0, 11.0]), DVector::from_vec(vec![26.0, 0.0]), "target_col_totals[1] is zero")]
    fn test_rejects_bad_targets(#[case] rows: DVector<f64>, #[case] cols: DVector<f64>, #[case] expected: &str) {
        let err = RasBalancer::balance_with(&base(), &rows, &cols, 10, 1e-6).unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains(expected)));
    }

    #[test]
    fn test_uses_configured_limits() {
        let balancer = RasBalancer::new(RasConfig { max_iterations: 2, tolerance: 1e-12 });
        let targets = DVector::from_vec(vec![35.0, 22.0]);
        let res = balancer.balance(&base(), &targets, &targets).unwrap();
        assert!(!res.converged);
        assert_eq!(res.iterations, 2);
    }
}
