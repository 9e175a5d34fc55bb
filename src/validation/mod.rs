//! Matrix-derived quality checks.
//!
//! Each check takes one explicit input struct; `MatrixAuditor` dispatches on
//! the `CheckInput` variant. Blending these scores with non-matrix signals is
//! left to the caller.

pub mod plausibility;
pub mod structural;

pub use plausibility::{
    BenchmarkBands, PlausibilityChecker, PlausibilityInput, PlausibilityResult, PlausibilityStatus,
    SectorPlausibility,
};
pub use structural::{QualityGrade, StructuralInput, StructuralReport, StructuralValidityChecker};

use crate::config::StructuralThresholds;
use crate::error::EngineResult;
use crate::store::LoadedModel;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum CheckInput {
    Structural(StructuralInput),
    Plausibility(PlausibilityInput),
}

#[derive(Debug, Clone)]
pub enum CheckOutcome {
    Structural(StructuralReport),
    Plausibility(Arc<PlausibilityResult>),
}

#[derive(Debug, Default)]
pub struct MatrixAuditor {
    structural: StructuralValidityChecker,
    plausibility: PlausibilityChecker,
}

impl MatrixAuditor {
    pub fn new(thresholds: StructuralThresholds) -> Self {
        Self {
            structural: StructuralValidityChecker::new(thresholds),
            plausibility: PlausibilityChecker::new(),
        }
    }

    pub fn run(&self, input: &CheckInput) -> EngineResult<CheckOutcome> {
        match input {
            CheckInput::Structural(i) => Ok(CheckOutcome::Structural(self.structural.check_input(i))),
            CheckInput::Plausibility(i) => self.plausibility.check_input(i).map(CheckOutcome::Plausibility),
        }
    }

    /// Runs both checks on a stored model; plausibility is cached by its version id.
    pub fn audit_model(
        &self,
        model: &LoadedModel,
        expected_sector_count: usize,
        benchmarks: &BenchmarkBands,
    ) -> EngineResult<(StructuralReport, Arc<PlausibilityResult>)> {
        let codes = model.version.sector_codes();
        let report = self.structural.check(&model.leontief.a, codes, expected_sector_count);
        let plausibility = self
            .plausibility
            .check(&model.leontief.b, codes, benchmarks, Some(model.version.id()))?;
        Ok((report, plausibility))
    }

    pub fn structural(&self) -> &StructuralValidityChecker {
        &self.structural
    }

    pub fn plausibility(&self) -> &PlausibilityChecker {
        &self.plausibility
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ModelStore;
    use nalgebra::{DMatrix, DVector};

    #[test]
    fn test_dispatch_by_variant() {
        let auditor = MatrixAuditor::default();
        let structural = CheckInput::Structural(StructuralInput {
            a: DMatrix::from_diagonal_element(2, 2, 0.96),
            sector_codes: vec!["A".into(), "B".into()],
            expected_sector_count: 2,
        });
        match auditor.run(&structural).unwrap() {
            CheckOutcome::Structural(r) => assert_eq!(r.grade, QualityGrade::D),
            other => panic!("unexpected {:?}", other),
        }

        let plaus = CheckInput::Plausibility(PlausibilityInput {
            b: DMatrix::identity(2, 2),
            sector_codes: vec!["A".into(), "B".into()],
            benchmarks: BenchmarkBands::new(),
            model_version_id: None,
        });
        assert!(matches!(auditor.run(&plaus).unwrap(), CheckOutcome::Plausibility(_)));
    }

    #[test]
    fn test_audit_stored_model() {
        let store = ModelStore::new();
        let mv = store
            .register(
                DMatrix::from_row_slice(2, 2, &[10.0, 5.0, 3.0, 8.0]),
                DVector::from_vec(vec![30.0, 20.0]),
                vec!["A".into(), "B".into()],
                2019,
                "test",
            )
            .unwrap();
        let loaded = store.get(mv.id()).unwrap();
        let auditor = MatrixAuditor::default();

        let (report, first) = auditor.audit_model(&loaded, 2, &BenchmarkBands::new()).unwrap();
        assert_eq!(report.score, 1.0);
        let (_, second) = auditor.audit_model(&loaded, 2, &BenchmarkBands::new()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
