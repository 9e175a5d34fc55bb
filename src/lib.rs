//! Deterministic input-output economics engine.
//!
//! Builds Leontief quantities from immutable model snapshots, re-estimates aging
//! tables by RAS balancing behind a review gate, clamps scenario deltas to
//! feasibility constraints and scores matrices for structural validity and
//! multiplier plausibility.

pub mod balance;
pub mod compute;
pub mod config;
pub mod display;
pub mod error;
pub mod ids;
pub mod nowcast;
pub mod solver;
pub mod store;
pub mod validation;

#[cfg(feature = "python")]
pub mod bindings;

pub use balance::{RasBalancer, RasResult};
pub use compute::{LeontiefResult, LeontiefSolver};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use ids::{ConstraintId, ConstraintSetId, ModelVersionId, NowcastId, RunId};
pub use nowcast::{NowcastCandidate, NowcastRequest, NowcastStatus, NowcastingService};
pub use solver::{ConstraintEngine, ConstraintSet, FeasibilityRequest, FeasibilityResult};
pub use store::{LoadedModel, ModelStore, ModelVersion};
pub use validation::{MatrixAuditor, PlausibilityChecker, StructuralValidityChecker};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::default_ramp_constraints;
    use crate::validation::BenchmarkBands;
    use nalgebra::{DMatrix, DVector};
    use std::sync::Arc;

    #[test]
    fn test_register_nowcast_solve_and_audit() {
        let store = Arc::new(ModelStore::new());
        let base = store
            .register(
                DMatrix::from_row_slice(2, 2, &[10.0, 5.0, 3.0, 8.0]),
                DVector::from_vec(vec![30.0, 20.0]),
                vec!["C".into(), "F".into()],
                2019,
                "GASTAT",
            )
            .unwrap();

        let nowcasts = NowcastingService::new(Arc::clone(&store));
        let totals = DVector::from_vec(vec![35.0, 22.0]);
        let draft = nowcasts
            .create_nowcast(NowcastRequest::new(base.id(), totals.clone(), totals, 2023))
            .unwrap();
        let balanced = draft.z_balanced.clone().unwrap();
        let current = nowcasts.approve_nowcast(draft.id).unwrap();
        let loaded = store.get(current.id()).unwrap();
        assert_eq!(loaded.version.z(), &balanced);
        assert!(loaded.leontief.is_productive());

        // A final-demand shock in construction, clamped by the default ramps.
        let shock = DVector::from_vec(vec![0.0, 10.0]);
        let impact = LeontiefSolver::solve(&loaded.leontief, &shock).unwrap();
        let set = default_ramp_constraints(current.sector_codes());
        let request = FeasibilityRequest::from_model(RunId::new(), &current, impact.delta_x_total.clone(), Some(2026));
        let result = ConstraintEngine::default().solve(&set, &request).unwrap();
        for i in 0..2 {
            let ceiling = [0.12, 0.15][i] * current.x()[i];
            assert!(result.feasible_delta[i] <= ceiling + 1e-9);
            assert!(result.gap_vs_unconstrained[i] >= 0.0);
        }

        let (report, _) = MatrixAuditor::default()
            .audit_model(&loaded, 2, &BenchmarkBands::new())
            .unwrap();
        assert!(report.score > 0.0);
    }
}
