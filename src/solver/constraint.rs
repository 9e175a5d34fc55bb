//! Constraint model and pre-solve validation.
//!
//! Capacity caps and ramps reshape the output delta. Budget, labor and
//! Saudization constraints are evaluated after the solve and only reported.

use crate::ids::{ConstraintId, ConstraintSetId, ModelVersionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintType {
    CapacityCap,
    Ramp,
    Budget,
    Labor,
    Saudization,
}

impl ConstraintType {
    /// Whether the solver clamps output with this type.
    pub fn is_clipping(self) -> bool {
        matches!(self, ConstraintType::CapacityCap | ConstraintType::Ramp)
    }

    pub fn default_bound_scope(self) -> BoundScope {
        match self {
            ConstraintType::Budget => BoundScope::DeltaOnly,
            _ => BoundScope::AbsoluteTotal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConstraintType::CapacityCap => "CAPACITY_CAP",
            ConstraintType::Ramp => "RAMP",
            ConstraintType::Budget => "BUDGET",
            ConstraintType::Labor => "LABOR",
            ConstraintType::Saudization => "SAUDIZATION",
        }
    }
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an economy-wide bound is split across sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationRule {
    Proportional,
    Equal,
    Priority,
}

impl AllocationRule {
    pub fn is_supported(self) -> bool {
        matches!(self, AllocationRule::Proportional)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintScope {
    Sector(String),
    /// The bound applies to each listed sector individually.
    Sectors(Vec<String>),
    Economy { allocation: Option<AllocationRule> },
}

impl ConstraintScope {
    pub fn economy_proportional() -> Self {
        ConstraintScope::Economy { allocation: Some(AllocationRule::Proportional) }
    }

    pub fn is_economy_wide(&self) -> bool {
        matches!(self, ConstraintScope::Economy { .. })
    }

    pub fn applies_to(&self, sector_code: &str) -> bool {
        match self {
            ConstraintScope::Sector(code) => code == sector_code,
            ConstraintScope::Sectors(codes) => codes.iter().any(|c| c == sector_code),
            ConstraintScope::Economy { .. } => true,
        }
    }
}

/// Whether a bound caps total output (`base + delta`) or the delta alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoundScope {
    AbsoluteTotal,
    DeltaOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Hard,
    Estimated,
    Assumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintUnit {
    Sar,
    SarThousands,
    SarMillions,
    Jobs,
    Fraction,
    GrowthRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub upper: Option<f64>,
    pub lower: Option<f64>,
    /// e.g. 0.12 caps growth at 12% of base output.
    pub max_growth_rate: Option<f64>,
}

impl Bounds {
    pub fn upper(v: f64) -> Self {
        Self { upper: Some(v), ..Self::default() }
    }

    pub fn lower(v: f64) -> Self {
        Self { lower: Some(v), ..Self::default() }
    }

    pub fn growth(rate: f64) -> Self {
        Self { max_growth_rate: Some(rate), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.upper.is_none() && self.lower.is_none() && self.max_growth_rate.is_none()
    }

    fn values(&self) -> impl Iterator<Item = f64> {
        [self.upper, self.lower, self.max_growth_rate].into_iter().flatten()
    }
}

/// Inclusive range of years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i32,
    pub end: i32,
}

impl TimeWindow {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, year: i32) -> bool {
        self.start <= year && year <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: ConstraintId,
    pub constraint_type: ConstraintType,
    pub scope: ConstraintScope,
    pub bounds: Bounds,
    /// Falls back to the type default when unset.
    #[serde(default)]
    pub bound_scope: Option<BoundScope>,
    pub unit: ConstraintUnit,
    pub confidence: Confidence,
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    #[serde(default)]
    pub rationale: String,
}

impl Constraint {
    pub fn new(constraint_type: ConstraintType, scope: ConstraintScope, bounds: Bounds, unit: ConstraintUnit) -> Self {
        Self {
            id: ConstraintId::new(),
            constraint_type,
            scope,
            bounds,
            bound_scope: None,
            unit,
            confidence: Confidence::Estimated,
            time_window: None,
            rationale: String::new(),
        }
    }

    pub fn capacity_cap(sector_code: impl Into<String>, upper: f64) -> Self {
        Self::new(
            ConstraintType::CapacityCap,
            ConstraintScope::Sector(sector_code.into()),
            Bounds::upper(upper),
            ConstraintUnit::SarMillions,
        )
    }

    pub fn ramp(sector_code: impl Into<String>, max_growth_rate: f64) -> Self {
        Self::new(
            ConstraintType::Ramp,
            ConstraintScope::Sector(sector_code.into()),
            Bounds::growth(max_growth_rate),
            ConstraintUnit::GrowthRate,
        )
    }

    pub fn with_bound_scope(mut self, bound_scope: BoundScope) -> Self {
        self.bound_scope = Some(bound_scope);
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_time_window(mut self, start: i32, end: i32) -> Self {
        self.time_window = Some(TimeWindow::new(start, end));
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn effective_bound_scope(&self) -> BoundScope {
        self.bound_scope.unwrap_or_else(|| self.constraint_type.default_bound_scope())
    }

    /// Unwindowed constraints are always active, as is everything when no year is given.
    pub fn applies_in_year(&self, year: Option<i32>) -> bool {
        match (self.time_window, year) {
            (Some(window), Some(year)) => window.contains(year),
            _ => true,
        }
    }

    fn duplicate_key(&self) -> String {
        format!(
            "{}|{:?}|{:?}|{:?}|{:?}",
            self.constraint_type,
            self.scope,
            self.bounds,
            self.effective_bound_scope(),
            self.time_window
        )
    }
}

/// A named, versioned collection of constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    pub id: ConstraintSetId,
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub model_version_id: Option<ModelVersionId>,
    pub constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new(name: impl Into<String>, constraints: Vec<Constraint>) -> Self {
        Self {
            id: ConstraintSetId::new(),
            name: name.into(),
            version: 1,
            model_version_id: None,
            constraints,
        }
    }

    pub fn for_model(mut self, model_version_id: ModelVersionId) -> Self {
        self.model_version_id = Some(model_version_id);
        self
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn get(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.id == id)
    }

    pub fn active(&self, year: Option<i32>) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(move |c| c.applies_in_year(year))
    }

    /// Returns every issue that makes the set ambiguous to solve. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for c in &self.constraints {
            let b = &c.bounds;
            if b.is_empty() {
                issues.push(format!(
                    "Constraint {}: {} has no upper bound, lower bound or growth rate",
                    c.id, c.constraint_type
                ));
            }
            if b.values().any(|v| !v.is_finite()) {
                issues.push(format!("Constraint {}: bounds must be finite numbers", c.id));
            }
            if let (Some(lower), Some(upper)) = (b.lower, b.upper) {
                if lower > upper {
                    issues.push(format!(
                        "Constraint {}: lower bound ({}) > upper bound ({})",
                        c.id, lower, upper
                    ));
                }
            }
            if c.constraint_type == ConstraintType::Ramp {
                match b.max_growth_rate {
                    None => issues.push(format!("Constraint {}: RAMP requires max_growth_rate", c.id)),
                    Some(rate) if rate <= -1.0 => issues.push(format!(
                        "Constraint {}: max_growth_rate ({}) must be greater than -1",
                        c.id, rate
                    )),
                    Some(_) => {}
                }
            }
            if c.constraint_type == ConstraintType::Ramp && (b.upper.is_some() || b.lower.is_some()) {
                issues.push(format!(
                    "Constraint {}: RAMP only uses max_growth_rate; upper and lower bounds would be ignored",
                    c.id
                ));
            }
            if c.constraint_type != ConstraintType::Ramp && b.max_growth_rate.is_some() {
                issues.push(format!(
                    "Constraint {}: max_growth_rate is only used by RAMP, not {}",
                    c.id, c.constraint_type
                ));
            }
            if c.constraint_type == ConstraintType::CapacityCap {
                if b.upper.is_none() && b.lower.is_none() {
                    issues.push(format!("Constraint {}: CAPACITY_CAP requires an upper or lower bound", c.id));
                }
                if c.scope.is_economy_wide() && b.lower.is_some() {
                    issues.push(format!(
                        "Constraint {}: economy-wide lower bound is not supported for CAPACITY_CAP",
                        c.id
                    ));
                }
            }
            if c.constraint_type == ConstraintType::Saudization && b.lower.is_none() {
                issues.push(format!(
                    "Constraint {}: SAUDIZATION requires a lower bound (minimum share)",
                    c.id
                ));
            }
            match &c.scope {
                ConstraintScope::Sector(code) if code.trim().is_empty() => {
                    issues.push(format!("Constraint {}: sector scope has an empty sector code", c.id));
                }
                ConstraintScope::Sectors(codes) if codes.is_empty() => {
                    issues.push(format!("Constraint {}: sector list scope is empty", c.id));
                }
                ConstraintScope::Economy { allocation: None } => {
                    issues.push(format!(
                        "Constraint {}: economy-wide {} missing allocation rule",
                        c.id, c.constraint_type
                    ));
                }
                ConstraintScope::Economy { allocation: Some(rule) } if !rule.is_supported() => {
                    issues.push(format!(
                        "Constraint {}: allocation rule '{:?}' is not supported (only 'proportional')",
                        c.id, rule
                    ));
                }
                _ => {}
            }
            if let Some(window) = c.time_window {
                if window.start > window.end {
                    issues.push(format!(
                        "Constraint {}: time window start ({}) is after end ({})",
                        c.id, window.start, window.end
                    ));
                }
            }
        }

        let mut seen: HashMap<String, Vec<ConstraintId>> = HashMap::new();
        let mut order = Vec::new();
        for c in &self.constraints {
            let key = c.duplicate_key();
            let ids = seen.entry(key.clone()).or_default();
            if ids.is_empty() {
                order.push((key, c.constraint_type, c.scope.clone()));
            }
            ids.push(c.id);
        }
        for (key, ctype, scope) in order {
            let count = seen.get(&key).map_or(0, Vec::len);
            if count > 1 {
                issues.push(format!(
                    "Duplicate constraints: {} entries of {} on {:?} with identical bounds",
                    count, ctype, scope
                ));
            }
        }

        issues
    }
}
