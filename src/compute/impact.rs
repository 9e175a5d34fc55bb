//! Final-demand shocks through a cached Leontief inverse.
//!
//! Uses `B * delta_d` directly instead of solving `(I - A) x = d` per shock,
//! since `B` is already computed and memoised per model version.

use super::leontief::LeontiefResult;
use crate::error::{EngineError, EngineResult};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Output effect of a single shock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    pub delta_x_total: DVector<f64>,
    pub delta_x_direct: DVector<f64>,
    /// `(B - I) * delta_d`.
    pub delta_x_indirect: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasedResult {
    pub annual_results: BTreeMap<i32, SolveResult>,
    pub cumulative_delta_x: DVector<f64>,
    /// Year with the largest total output effect; `None` for an empty schedule.
    pub peak_year: Option<i32>,
    pub peak_delta_x: DVector<f64>,
}

pub struct LeontiefSolver;

impl LeontiefSolver {
    pub fn solve(result: &LeontiefResult, delta_d: &DVector<f64>) -> EngineResult<SolveResult> {
        let n = result.sector_count();
        if delta_d.len() != n {
            return Err(EngineError::validation(format!(
                "dimension mismatch: delta_d has {} elements, model has {} sectors",
                delta_d.len(),
                n
            )));
        }

        let delta_x_total = &result.b * delta_d;
        let delta_x_direct = delta_d.clone();
        let delta_x_indirect = &delta_x_total - &delta_x_direct;

        Ok(SolveResult { delta_x_total, delta_x_direct, delta_x_indirect })
    }

    /// Solves a multi-year schedule of nominal shocks.
    ///
    /// Each year's shock is deflated (`real = nominal / deflator`, missing deflators
    /// count as 1.0) before it is pushed through `B`.
    pub fn solve_phased(
        result: &LeontiefResult,
        annual_shocks: &BTreeMap<i32, DVector<f64>>,
        deflators: &BTreeMap<i32, f64>,
    ) -> EngineResult<PhasedResult> {
        let n = result.sector_count();
        let mut annual_results = BTreeMap::new();
        let mut cumulative = DVector::zeros(n);
        let mut peak_year = None;
        let mut peak_total = f64::NEG_INFINITY;
        let mut peak_delta_x = DVector::zeros(n);

        for (&year, nominal) in annual_shocks {
            let deflator = deflators.get(&year).copied().unwrap_or(1.0);
            if !(deflator > 0.0 && deflator.is_finite()) {
                return Err(EngineError::validation(format!(
                    "deflator for {} must be positive and finite, got {}",
                    year, deflator
                )));
            }
            let real_shock = nominal / deflator;
            let solved = Self::solve(result, &real_shock)?;

            cumulative += &solved.delta_x_total;
            let year_total = solved.delta_x_total.sum();
            if year_total > peak_total {
                peak_total = year_total;
                peak_year = Some(year);
                peak_delta_x = solved.delta_x_total.clone();
            }
            annual_results.insert(year, solved);
        }

        Ok(PhasedResult {
            annual_results,
            cumulative_delta_x: cumulative,
            peak_year,
            peak_delta_x,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::leontief::DEFAULT_PIVOT_TOLERANCE;
    use nalgebra::DMatrix;

    fn model() -> LeontiefResult {
        let z = DMatrix::from_row_slice(2, 2, &[10.0, 5.0, 3.0, 8.0]);
        let x = DVector::from_vec(vec![30.0, 20.0]);
        LeontiefResult::compute(&z, &x, DEFAULT_PIVOT_TOLERANCE).unwrap()
    }

    #[test]
    fn test_unit_shock_returns_column_of_b() {
        let res = model();
        let out = LeontiefSolver::solve(&res, &DVector::from_vec(vec![1.0, 0.0])).unwrap();
        assert!((out.delta_x_total[0] - 1.6).abs() < 1e-9);
        assert!((out.delta_x_total.sum() - res.multipliers[0]).abs() < 1e-9);
        assert_eq!(out.delta_x_direct, DVector::from_vec(vec![1.0, 0.0]));
        assert!((out.delta_x_indirect[0] - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_dimension_mismatch() {
        let res = model();
        let err = LeontiefSolver::solve(&res, &DVector::from_vec(vec![1.0])).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_phased_deflation_and_peak() {
        let res = model();
        let mut shocks = BTreeMap::new();
        shocks.insert(2025, DVector::from_vec(vec![10.0, 0.0]));
        shocks.insert(2026, DVector::from_vec(vec![22.0, 0.0]));
        let mut deflators = BTreeMap::new();
        deflators.insert(2026, 1.1);

        let phased = LeontiefSolver::solve_phased(&res, &shocks, &deflators).unwrap();
        assert_eq!(phased.peak_year, Some(2026));
        // 22 / 1.1 = 20 real units in 2026.
        let y26 = &phased.annual_results[&2026];
        assert!((y26.delta_x_direct[0] - 20.0).abs() < 1e-9);
        let expected_cum = (10.0 + 20.0) * res.multipliers[0];
        assert!((phased.cumulative_delta_x.sum() - expected_cum).abs() < 1e-9);
    }

    #[test]
    fn test_phased_rejects_zero_deflator() {
        let res = model();
        let mut shocks = BTreeMap::new();
        shocks.insert(2025, DVector::from_vec(vec![1.0, 1.0]));
        let mut deflators = BTreeMap::new();
        deflators.insert(2025, 0.0);
        assert!(LeontiefSolver::solve_phased(&res, &shocks, &deflators).is_err());
    }
}
