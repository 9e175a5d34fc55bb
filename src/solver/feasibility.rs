//! Clamps an unconstrained output delta to the tightest capacity and ramp bounds.
//!
//! Every clipping constraint is turned into an implied cap on each sector's
//! delta, computed from the unconstrained values only, so the outcome does not
//! depend on constraint order. A sector's feasible value is then
//! `min(u, max(tightest_upper, tightest_lower))`; contracting sectors (`u <= 0`)
//! are never clipped further.

use super::constraint::{
    BoundScope, Confidence, Constraint, ConstraintScope, ConstraintSet, ConstraintType,
};
use super::diagnostics::{self, DiagnosticInputs, DiagnosticOutcome};
use crate::config::FeasibilityConfig;
use crate::error::{EngineError, EngineResult};
use crate::ids::{ConstraintId, ConstraintSetId, RunId};
use crate::store::ModelVersion;
use nalgebra::DVector;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Implied per-sector caps: (index into the constraint set, cap on the delta).
type Caps = SmallVec<[(usize, f64); 4]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityRequest {
    pub run_id: RunId,
    pub unconstrained_delta: DVector<f64>,
    pub base_output: DVector<f64>,
    pub sector_codes: Vec<String>,
    /// Selects time-windowed constraints; `None` activates all of them.
    pub target_year: Option<i32>,
    #[serde(default)]
    pub diagnostics: DiagnosticInputs,
}

impl FeasibilityRequest {
    /// Uses the model's gross output as the base and its sector codes.
    pub fn from_model(
        run_id: RunId,
        model: &ModelVersion,
        unconstrained_delta: DVector<f64>,
        target_year: Option<i32>,
    ) -> Self {
        Self {
            run_id,
            unconstrained_delta,
            base_output: model.x().clone(),
            sector_codes: model.sector_codes().to_vec(),
            target_year,
            diagnostics: DiagnosticInputs::default(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticInputs) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    fn validate(&self) -> EngineResult<()> {
        let n = self.unconstrained_delta.len();
        if n == 0 {
            return Err(EngineError::validation("unconstrained delta must not be empty"));
        }
        if self.base_output.len() != n || self.sector_codes.len() != n {
            return Err(EngineError::validation(format!(
                "dimension mismatch: delta has {} elements, base output {}, sector codes {}",
                n,
                self.base_output.len(),
                self.sector_codes.len()
            )));
        }
        if self.unconstrained_delta.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::validation("unconstrained delta must be finite"));
        }
        if self.base_output.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(EngineError::validation("base output must be finite and non-negative"));
        }
        if let Some(issue) = self.diagnostics.dimension_issue(n) {
            return Err(EngineError::validation(issue));
        }
        Ok(())
    }
}

/// One constraint that reduced one sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingConstraint {
    pub constraint_id: ConstraintId,
    pub constraint_type: ConstraintType,
    pub confidence: Confidence,
    pub sector_code: String,
    pub unconstrained_value: f64,
    pub constrained_value: f64,
    pub gap: f64,
    /// `gap / unconstrained_value`.
    pub gap_pct: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub total_constraints: usize,
    pub hard_count: usize,
    pub estimated_count: usize,
    pub assumed_count: usize,
    /// Distinct binding constraints by confidence.
    pub binding_by_confidence: BTreeMap<Confidence, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityResult {
    pub run_id: RunId,
    pub constraint_set_id: ConstraintSetId,
    pub target_year: Option<i32>,
    pub sector_codes: Vec<String>,
    pub unconstrained_delta: DVector<f64>,
    pub feasible_delta: DVector<f64>,
    /// `unconstrained - feasible`; never negative.
    pub gap_vs_unconstrained: DVector<f64>,
    pub binding_constraints: Vec<BindingConstraint>,
    pub non_binding_constraints: Vec<ConstraintId>,
    pub diagnostics: Vec<DiagnosticOutcome>,
    pub total_output_gap: f64,
    /// Gap as a fraction of the positive unconstrained total.
    pub total_output_gap_pct: f64,
    pub confidence_summary: ConfidenceSummary,
}

impl FeasibilityResult {
    pub fn is_constrained(&self) -> bool {
        !self.binding_constraints.is_empty()
    }

    pub fn binding_for(&self, sector_code: &str) -> impl Iterator<Item = &BindingConstraint> {
        let code = sector_code.to_string();
        self.binding_constraints.iter().filter(move |b| b.sector_code == code)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConstraintEngine {
    config: FeasibilityConfig,
}

impl ConstraintEngine {
    pub fn new(config: FeasibilityConfig) -> Self {
        Self { config }
    }

    pub fn solve(&self, set: &ConstraintSet, request: &FeasibilityRequest) -> EngineResult<FeasibilityResult> {
        ensure_valid(set)?;
        self.solve_validated(set, request)
    }

    /// Solves many deltas against one constraint set in parallel.
    ///
    /// The set is validated once; per-request failures are returned in place.
    pub fn solve_batch(
        &self,
        set: &ConstraintSet,
        requests: &[FeasibilityRequest],
    ) -> EngineResult<Vec<EngineResult<FeasibilityResult>>> {
        ensure_valid(set)?;
        Ok(requests
            .par_iter()
            .map(|request| self.solve_validated(set, request))
            .collect())
    }

    fn solve_validated(&self, set: &ConstraintSet, request: &FeasibilityRequest) -> EngineResult<FeasibilityResult> {
        request.validate()?;
        let eps = self.config.epsilon;
        let n = request.unconstrained_delta.len();
        let u = &request.unconstrained_delta;
        let base = &request.base_output;

        let mut upper: Vec<Caps> = vec![SmallVec::new(); n];
        let mut lower: Vec<Option<f64>> = vec![None; n];
        let mut active_clipping = Vec::new();
        let mut active_diagnostic = Vec::new();

        for (k, c) in set.constraints.iter().enumerate() {
            if !c.applies_in_year(request.target_year) {
                continue;
            }
            if !c.constraint_type.is_clipping() {
                active_diagnostic.push(k);
                continue;
            }
            active_clipping.push(k);
            let matched = implied_caps(c, k, u, base, &request.sector_codes, &mut upper, &mut lower);
            if matched == 0 {
                warn!(
                    constraint_id = %c.id,
                    scope = %diagnostics::describe_scope(&c.scope),
                    "constraint scope matches no model sector"
                );
            }
        }

        let mut feasible = u.clone();
        let mut binding = Vec::new();
        let mut bound_ids = HashSet::new();

        for i in 0..n {
            if u[i] <= 0.0 {
                continue;
            }
            let Some(tightest) = upper[i].iter().map(|&(_, cap)| cap).reduce(f64::min) else {
                continue;
            };
            let floor = lower[i].unwrap_or(f64::NEG_INFINITY);
            let value = u[i].min(tightest.max(floor));
            if value >= u[i] - eps {
                continue;
            }
            feasible[i] = value;

            for &(k, cap) in upper[i].iter().filter(|(_, cap)| *cap <= tightest + eps) {
                let c = &set.constraints[k];
                if bound_ids.insert(c.id) {
                    debug!(constraint_id = %c.id, sector = %request.sector_codes[i], cap, "constraint binds");
                }
                let gap = u[i] - value;
                binding.push(BindingConstraint {
                    constraint_id: c.id,
                    constraint_type: c.constraint_type,
                    confidence: c.confidence,
                    sector_code: request.sector_codes[i].clone(),
                    unconstrained_value: u[i],
                    constrained_value: value,
                    gap,
                    gap_pct: gap / u[i],
                    rationale: c.rationale.clone(),
                });
            }
        }

        let diagnostics = active_diagnostic
            .iter()
            .map(|&k| diagnostics::evaluate(&set.constraints[k], &feasible, &request.sector_codes, &request.diagnostics))
            .collect();

        let gap_vs_unconstrained = u - &feasible;
        let total_output_gap: f64 = gap_vs_unconstrained.iter().map(|g| g.max(0.0)).sum();
        let positive_total: f64 = u.iter().map(|v| v.max(0.0)).sum();
        let total_output_gap_pct = if positive_total > 0.0 { total_output_gap / positive_total } else { 0.0 };

        let non_binding_constraints = active_clipping
            .iter()
            .map(|&k| set.constraints[k].id)
            .filter(|id| !bound_ids.contains(id))
            .collect();
        let confidence_summary = summarize_confidence(set, &bound_ids);

        info!(
            run_id = %request.run_id,
            constraint_set_id = %set.id,
            binding = bound_ids.len(),
            total_output_gap,
            "feasibility solve complete"
        );

        Ok(FeasibilityResult {
            run_id: request.run_id,
            constraint_set_id: set.id,
            target_year: request.target_year,
            sector_codes: request.sector_codes.clone(),
            unconstrained_delta: u.clone(),
            feasible_delta: feasible,
            gap_vs_unconstrained,
            binding_constraints: binding,
            non_binding_constraints,
            diagnostics,
            total_output_gap,
            total_output_gap_pct,
            confidence_summary,
        })
    }
}

fn ensure_valid(set: &ConstraintSet) -> EngineResult<()> {
    let issues = set.validate();
    if issues.is_empty() {
        return Ok(());
    }
    warn!(constraint_set_id = %set.id, issues = issues.len(), "constraint set failed validation");
    Err(EngineError::InvalidConstraintSet { set_id: set.id.to_string(), issues })
}

/// Records the caps constraint `k` implies on every sector it covers.
/// Returns how many sectors it matched.
fn implied_caps(
    c: &Constraint,
    k: usize,
    u: &DVector<f64>,
    base: &DVector<f64>,
    codes: &[String],
    upper: &mut [Caps],
    lower: &mut [Option<f64>],
) -> usize {
    let indices: Vec<usize> = (0..codes.len()).filter(|&i| c.scope.applies_to(&codes[i])).collect();
    let absolute = c.effective_bound_scope() == BoundScope::AbsoluteTotal;
    let to_delta = |bound: f64, i: usize| if absolute { bound - base[i] } else { bound };

    match (&c.scope, c.constraint_type) {
        // Growth is relative to base output whatever the scope.
        (_, ConstraintType::Ramp) => {
            if let Some(rate) = c.bounds.max_growth_rate {
                for &i in &indices {
                    upper[i].push((k, rate * base[i]));
                }
            }
        }
        (ConstraintScope::Economy { .. }, _) => {
            if let Some(cap) = c.bounds.upper {
                // Aggregate headroom shared in proportion to each sector's positive delta.
                let headroom = if absolute { cap - base.sum() } else { cap };
                let positive: f64 = u.iter().map(|v| v.max(0.0)).sum();
                if positive > headroom.max(0.0) {
                    let scale = headroom.max(0.0) / positive;
                    for &i in indices.iter().filter(|&&i| u[i] > 0.0) {
                        upper[i].push((k, u[i] * scale));
                    }
                }
            }
        }
        _ => {
            for &i in &indices {
                if let Some(cap) = c.bounds.upper {
                    upper[i].push((k, to_delta(cap, i)));
                }
                if let Some(floor) = c.bounds.lower {
                    let floor = to_delta(floor, i);
                    lower[i] = Some(lower[i].map_or(floor, |f| f.max(floor)));
                }
            }
        }
    }
    indices.len()
}

fn summarize_confidence(set: &ConstraintSet, bound_ids: &HashSet<ConstraintId>) -> ConfidenceSummary {
    let mut summary = ConfidenceSummary {
        total_constraints: set.constraints.len(),
        ..ConfidenceSummary::default()
    };
    for conf in [Confidence::Hard, Confidence::Estimated, Confidence::Assumed] {
        summary.binding_by_confidence.insert(conf, 0);
    }
    for c in &set.constraints {
        match c.confidence {
            Confidence::Hard => summary.hard_count += 1,
            Confidence::Estimated => summary.estimated_count += 1,
            Confidence::Assumed => summary.assumed_count += 1,
        }
        if bound_ids.contains(&c.id) {
            *summary.binding_by_confidence.entry(c.confidence).or_insert(0) += 1;
        }
    }
    summary
}
