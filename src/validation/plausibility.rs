//! Output-multiplier plausibility against curated benchmark bands.

use crate::compute::leontief::multipliers;
use crate::error::{EngineError, EngineResult};
use crate::ids::ModelVersionId;
use nalgebra::DMatrix;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// `sector_code -> (low, high)`, inclusive.
pub type BenchmarkBands = HashMap<String, (f64, f64)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlausibilityStatus {
    InRange,
    AboveRange,
    BelowRange,
    NoBenchmark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorPlausibility {
    pub sector_code: String,
    pub output_multiplier: f64,
    pub benchmark: Option<(f64, f64)>,
    pub status: PlausibilityStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlausibilityResult {
    /// Share of benchmarked sectors in range, 0 to 100. 100 when nothing is benchmarked.
    pub multipliers_in_range_pct: f64,
    pub benchmarked_sectors: usize,
    pub flagged_sectors: Vec<String>,
    pub sectors: Vec<SectorPlausibility>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlausibilityInput {
    pub b: DMatrix<f64>,
    pub sector_codes: Vec<String>,
    pub benchmarks: BenchmarkBands,
    /// Cache key; `None` always recomputes.
    pub model_version_id: Option<ModelVersionId>,
}

/// Results are cached per model version for the checker's lifetime, with no
/// eviction. A cached result is returned as the same `Arc`.
#[derive(Debug, Default)]
pub struct PlausibilityChecker {
    cache: RwLock<HashMap<ModelVersionId, Arc<PlausibilityResult>>>,
}

impl PlausibilityChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    pub fn check_input(&self, input: &PlausibilityInput) -> EngineResult<Arc<PlausibilityResult>> {
        self.check(&input.b, &input.sector_codes, &input.benchmarks, input.model_version_id)
    }

    pub fn check(
        &self,
        b: &DMatrix<f64>,
        sector_codes: &[String],
        benchmarks: &BenchmarkBands,
        model_version_id: Option<ModelVersionId>,
    ) -> EngineResult<Arc<PlausibilityResult>> {
        if let Some(id) = model_version_id {
            if let Some(hit) = self.cache.read().get(&id) {
                debug!(model_version_id = %id, "plausibility cache hit");
                return Ok(Arc::clone(hit));
            }
        }

        let result = Arc::new(evaluate(b, sector_codes, benchmarks)?);
        match model_version_id {
            Some(id) => Ok(Arc::clone(self.cache.write().entry(id).or_insert(result))),
            None => Ok(result),
        }
    }
}

fn evaluate(b: &DMatrix<f64>, sector_codes: &[String], benchmarks: &BenchmarkBands) -> EngineResult<PlausibilityResult> {
    if !b.is_square() || b.ncols() != sector_codes.len() {
        return Err(EngineError::validation(format!(
            "B is {}x{} but {} sector codes were given",
            b.nrows(),
            b.ncols(),
            sector_codes.len()
        )));
    }
    for (code, &(low, high)) in benchmarks {
        if !(low.is_finite() && high.is_finite() && low <= high) {
            return Err(EngineError::validation(format!(
                "benchmark for '{}' must be a finite band with low <= high, got ({}, {})",
                code, low, high
            )));
        }
    }

    let m = multipliers(b);
    let mut sectors = Vec::with_capacity(sector_codes.len());
    let mut flagged = Vec::new();
    let mut benchmarked = 0usize;
    let mut in_range = 0usize;

    for (code, &value) in sector_codes.iter().zip(m.iter()) {
        let band = benchmarks.get(code).copied();
        let status = match band {
            None => PlausibilityStatus::NoBenchmark,
            Some((low, _)) if value < low => PlausibilityStatus::BelowRange,
            Some((_, high)) if value > high => PlausibilityStatus::AboveRange,
            Some(_) => PlausibilityStatus::InRange,
        };
        match status {
            PlausibilityStatus::NoBenchmark => {}
            PlausibilityStatus::InRange => {
                benchmarked += 1;
                in_range += 1;
            }
            _ => {
                benchmarked += 1;
                flagged.push(code.clone());
            }
        }
        sectors.push(SectorPlausibility {
            sector_code: code.clone(),
            output_multiplier: value,
            benchmark: band,
            status,
        });
    }

    let pct = if benchmarked == 0 { 100.0 } else { in_range as f64 / benchmarked as f64 * 100.0 };
    Ok(PlausibilityResult {
        multipliers_in_range_pct: pct,
        benchmarked_sectors: benchmarked,
        flagged_sectors: flagged,
        sectors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b() -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 2, &[1.6, 2.0 / 3.0, 4.0 / 15.0, 16.0 / 9.0])
    }

    fn codes() -> Vec<String> {
        vec!["AGR".into(), "MFG".into()]
    }

    #[test]
    fn test_classifies_against_bands() {
        let mut bands = BenchmarkBands::new();
        bands.insert("AGR".into(), (1.5, 2.0));
        bands.insert("MFG".into(), (1.2, 2.0));
        let res = PlausibilityChecker::new().check(&b(), &codes(), &bands, None).unwrap();
        assert_eq!(res.sectors[0].status, PlausibilityStatus::InRange);
        assert_eq!(res.sectors[1].status, PlausibilityStatus::AboveRange);
        assert_eq!(res.flagged_sectors, vec!["MFG".to_string()]);
        assert_eq!(res.multipliers_in_range_pct, 50.0);
    }

    #[test]
    fn test_missing_benchmark_excluded_from_percentage() {
        let mut bands = BenchmarkBands::new();
        bands.insert("MFG".into(), (2.5, 3.0));
        let res = PlausibilityChecker::new().check(&b(), &codes(), &bands, None).unwrap();
        assert_eq!(res.sectors[0].status, PlausibilityStatus::NoBenchmark);
        assert_eq!(res.sectors[1].status, PlausibilityStatus::BelowRange);
        assert_eq!(res.benchmarked_sectors, 1);
        assert_eq!(res.multipliers_in_range_pct, 0.0);

        let none = PlausibilityChecker::new().check(&b(), &codes(), &BenchmarkBands::new(), None).unwrap();
        assert_eq!(none.multipliers_in_range_pct, 100.0);
    }

    #[test]
    fn test_cache_returns_same_object() {
        let checker = PlausibilityChecker::new();
        let id = ModelVersionId::new();
        let first = checker.check(&b(), &codes(), &BenchmarkBands::new(), Some(id)).unwrap();
        let second = checker.check(&b(), &codes(), &BenchmarkBands::new(), Some(id)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = checker.check(&b(), &codes(), &BenchmarkBands::new(), Some(ModelVersionId::new())).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(checker.cached(), 2);
    }

    #[test]
    fn test_uncached_calls_recompute() {
        let checker = PlausibilityChecker::new();
        let first = checker.check(&b(), &codes(), &BenchmarkBands::new(), None).unwrap();
        let second = checker.check(&b(), &codes(), &BenchmarkBands::new(), None).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(checker.cached(), 0);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let checker = PlausibilityChecker::new();
        assert!(checker.check(&b(), &["AGR".into()], &BenchmarkBands::new(), None).is_err());
        let mut bands = BenchmarkBands::new();
        bands.insert("AGR".into(), (3.0, 1.0));
        assert!(matches!(checker.check(&b(), &codes(), &bands, None), Err(EngineError::Validation(_))));
    }
}
