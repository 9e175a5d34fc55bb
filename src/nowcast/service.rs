//! Draft / approve / reject governance around RAS re-estimation.
//!
//! A nowcast is computed eagerly but committed lazily: `create_nowcast` only
//! buffers the balanced matrix, and nothing reaches the `ModelStore` until a
//! reviewer calls `approve_nowcast`.

use super::types::{
    NowcastCandidate, NowcastRequest, NowcastStatus, QualityDimension, QualityWarning, WarningSeverity,
};
use crate::balance::RasBalancer;
use crate::config::{EngineConfig, NowcastConfig};
use crate::error::{EngineError, EngineResult};
use crate::ids::NowcastId;
use crate::store::{ModelStore, ModelVersion};
use nalgebra::{DMatrix, DVector};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Resolved candidates are kept as tombstones for the service's lifetime so
/// that a late approve or reject still reports `InvalidState`. Only the
/// balanced matrix is released on resolution.
pub struct NowcastingService {
    store: Arc<ModelStore>,
    balancer: RasBalancer,
    config: NowcastConfig,
    /// One mutex per candidate; the outer lock only guards the map itself.
    drafts: RwLock<HashMap<NowcastId, Arc<Mutex<NowcastCandidate>>>>,
}

impl NowcastingService {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self::with_config(store, &EngineConfig::default())
    }

    pub fn with_config(store: Arc<ModelStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            balancer: RasBalancer::new(config.ras.clone()),
            config: config.nowcast.clone(),
            drafts: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// Balances the base model toward the requested totals and buffers the result as a draft.
    pub fn create_nowcast(&self, request: NowcastRequest) -> EngineResult<NowcastCandidate> {
        let base = self.store.get_version(request.base_model_id)?;
        let n = base.sector_count();

        if request.target_row_totals.len() != n {
            return Err(EngineError::validation(format!(
                "dimension mismatch: target_row_totals has {} elements, model has {} sectors",
                request.target_row_totals.len(),
                n
            )));
        }
        let target_output = match &request.target_output {
            Some(x) => x.clone(),
            None => scaled_output(base.z(), base.x(), &request.target_row_totals),
        };
        if target_output.len() != n {
            return Err(EngineError::validation(format!(
                "dimension mismatch: target output has {} elements, model has {} sectors",
                target_output.len(),
                n
            )));
        }
        if let Some((j, v)) = target_output.iter().enumerate().find(|(_, v)| !(v.is_finite() && **v > 0.0)) {
            return Err(EngineError::validation(format!(
                "target output for sector '{}' must be strictly positive, got {}",
                base.sector_codes()[j],
                v
            )));
        }
        for p in &request.provenance {
            if base.sector_index(&p.sector_code).is_none() {
                return Err(EngineError::validation(format!(
                    "provenance refers to unknown sector '{}'",
                    p.sector_code
                )));
            }
        }

        let ras = self
            .balancer
            .balance(base.z(), &request.target_row_totals, &request.target_col_totals)?;
        let magnitude = structural_change_magnitude(base.z(), &ras.z_balanced);

        let mut warnings = Vec::new();
        if !ras.converged {
            warnings.push(QualityWarning {
                dimension: QualityDimension::Freshness,
                severity: WarningSeverity::Critical,
                message: "RAS balancing did not converge.".to_string(),
                detail: format!(
                    "Final error {:.6e} after {} iterations.",
                    ras.final_error, ras.iterations
                ),
                recommendation: "Review target totals for consistency.".to_string(),
            });
        }
        if magnitude > self.config.structural_change_warning {
            warn!(
                base_model_id = %request.base_model_id,
                magnitude,
                threshold = self.config.structural_change_warning,
                "nowcast reallocates a large share of flows"
            );
            warnings.push(QualityWarning {
                dimension: QualityDimension::Freshness,
                severity: WarningSeverity::Warning,
                message: format!("High structural change magnitude: {:.4}.", magnitude),
                detail: "The balanced matrix differs substantially from the base model. \
                         Manual review is recommended."
                    .to_string(),
                recommendation: "Compare sector-level changes and validate against external benchmarks."
                    .to_string(),
            });
        }

        let candidate = NowcastCandidate {
            id: NowcastId::new(),
            status: NowcastStatus::Draft,
            base_model_id: request.base_model_id,
            target_year: request.target_year,
            sector_codes: base.sector_codes().to_vec(),
            target_row_totals: request.target_row_totals,
            target_col_totals: request.target_col_totals,
            target_output,
            z_balanced: Some(ras.z_balanced),
            converged: ras.converged,
            iterations: ras.iterations,
            final_error: ras.final_error,
            structural_change_magnitude: magnitude,
            provenance: request.provenance,
            warnings,
            approved_model_version_id: None,
        };

        info!(
            nowcast_id = %candidate.id,
            base_model_id = %candidate.base_model_id,
            target_year = candidate.target_year,
            converged = candidate.converged,
            iterations = candidate.iterations,
            "created nowcast draft"
        );
        self.drafts
            .write()
            .insert(candidate.id, Arc::new(Mutex::new(candidate.clone())));
        Ok(candidate)
    }

    /// Registers the draft's balanced matrix as a new model version.
    ///
    /// Fails with `InvalidState` if the candidate was already resolved. A failed
    /// registration leaves the candidate a draft.
    pub fn approve_nowcast(&self, id: NowcastId) -> EngineResult<Arc<ModelVersion>> {
        let slot = self.slot(id)?;
        let mut candidate = slot.lock();
        ensure_draft(&candidate, "approve")?;

        let z = candidate.z_balanced.clone().ok_or_else(|| EngineError::InvalidState {
            id: id.to_string(),
            current: candidate.status.to_string(),
            attempted: "approve",
        })?;
        let version = self.store.register(
            z,
            candidate.target_output.clone(),
            candidate.sector_codes.clone(),
            candidate.target_year,
            self.config.source_label.clone(),
        )?;

        candidate.status = NowcastStatus::Approved;
        candidate.approved_model_version_id = Some(version.id());
        candidate.z_balanced = None;
        info!(nowcast_id = %id, model_version_id = %version.id(), "approved nowcast");
        Ok(version)
    }

    /// Marks the draft rejected and discards its matrix.
    pub fn reject_nowcast(&self, id: NowcastId) -> EngineResult<()> {
        let slot = self.slot(id)?;
        let mut candidate = slot.lock();
        ensure_draft(&candidate, "reject")?;

        candidate.status = NowcastStatus::Rejected;
        candidate.z_balanced = None;
        info!(nowcast_id = %id, "rejected nowcast");
        Ok(())
    }

    pub fn status(&self, id: NowcastId) -> EngineResult<NowcastStatus> {
        Ok(self.slot(id)?.lock().status)
    }

    /// Snapshot of the candidate as it is now.
    pub fn candidate(&self, id: NowcastId) -> EngineResult<NowcastCandidate> {
        Ok(self.slot(id)?.lock().clone())
    }

    pub fn drafts(&self) -> Vec<NowcastId> {
        let slots: Vec<_> = self
            .drafts
            .read()
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();
        let mut ids: Vec<_> = slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().status == NowcastStatus::Draft)
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    fn slot(&self, id: NowcastId) -> EngineResult<Arc<Mutex<NowcastCandidate>>> {
        self.drafts
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("Nowcast", id))
    }
}

fn ensure_draft(candidate: &NowcastCandidate, attempted: &'static str) -> EngineResult<()> {
    if candidate.status.is_terminal() {
        return Err(EngineError::InvalidState {
            id: candidate.id.to_string(),
            current: candidate.status.to_string(),
            attempted,
        });
    }
    Ok(())
}

/// Base output grown by each sector's row-total ratio. Sectors with an empty
/// base row keep their base output.
fn scaled_output(z0: &DMatrix<f64>, x0: &DVector<f64>, target_rows: &DVector<f64>) -> DVector<f64> {
    DVector::from_fn(x0.len(), |i, _| {
        let base_row = z0.row(i).sum();
        if base_row > 0.0 {
            x0[i] * target_rows[i] / base_row
        } else {
            x0[i]
        }
    })
}

/// Fraction of total flow value reallocated by balancing.
fn structural_change_magnitude(z0: &DMatrix<f64>, z_balanced: &DMatrix<f64>) -> f64 {
    let base: f64 = z0.iter().map(|v| v.abs()).sum();
    if base == 0.0 {
        return 0.0;
    }
    let moved: f64 = z0.iter().zip(z_balanced.iter()).map(|(a, b)| (b - a).abs()).sum();
    moved / base
}
