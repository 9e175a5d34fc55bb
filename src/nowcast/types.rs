use crate::ids::{ModelVersionId, NowcastId};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NowcastStatus {
    Draft,
    Approved,
    Rejected,
}

impl NowcastStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NowcastStatus::Draft)
    }
}

impl fmt::Display for NowcastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NowcastStatus::Draft => "DRAFT",
            NowcastStatus::Approved => "APPROVED",
            NowcastStatus::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningSeverity {
    Info,
    Warning,
    Critical,
}

/// Data-quality axis a warning is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityDimension {
    Vintage,
    Mapping,
    Assumptions,
    Constraints,
    Workforce,
    Plausibility,
    Freshness,
}

/// A finding attached to a candidate for the reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityWarning {
    pub dimension: QualityDimension,
    pub severity: WarningSeverity,
    pub message: String,
    pub detail: String,
    pub recommendation: String,
}

/// Where one target total came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTotalProvenance {
    pub sector_code: String,
    pub target_value: f64,
    pub source: String,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

impl TargetTotalProvenance {
    pub fn new(sector_code: impl Into<String>, target_value: f64, source: impl Into<String>) -> Self {
        Self {
            sector_code: sector_code.into(),
            target_value,
            source: source.into(),
            evidence_refs: Vec::new(),
        }
    }
}

/// Inputs of `NowcastingService::create_nowcast`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowcastRequest {
    pub base_model_id: ModelVersionId,
    pub target_row_totals: DVector<f64>,
    pub target_col_totals: DVector<f64>,
    pub target_year: i32,
    #[serde(default)]
    pub provenance: Vec<TargetTotalProvenance>,
    /// Gross output of the new version. Defaults to the base output scaled by
    /// each sector's row-total growth.
    #[serde(default)]
    pub target_output: Option<DVector<f64>>,
}

impl NowcastRequest {
    pub fn new(
        base_model_id: ModelVersionId,
        target_row_totals: DVector<f64>,
        target_col_totals: DVector<f64>,
        target_year: i32,
    ) -> Self {
        Self {
            base_model_id,
            target_row_totals,
            target_col_totals,
            target_year,
            provenance: Vec::new(),
            target_output: None,
        }
    }

    pub fn with_provenance(mut self, provenance: Vec<TargetTotalProvenance>) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_target_output(mut self, x: DVector<f64>) -> Self {
        self.target_output = Some(x);
        self
    }
}

/// A balanced re-estimate held for review.
///
/// `z_balanced` is present only while the candidate is a draft: approval moves
/// the matrix into the `ModelStore` (see `approved_model_version_id`) and
/// rejection discards it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowcastCandidate {
    pub id: NowcastId,
    pub status: NowcastStatus,
    pub base_model_id: ModelVersionId,
    pub target_year: i32,
    pub sector_codes: Vec<String>,
    pub target_row_totals: DVector<f64>,
    pub target_col_totals: DVector<f64>,
    pub target_output: DVector<f64>,
    pub z_balanced: Option<DMatrix<f64>>,
    pub converged: bool,
    pub iterations: usize,
    pub final_error: f64,
    /// `sum|Z_balanced - Z0| / sum|Z0|`.
    pub structural_change_magnitude: f64,
    pub provenance: Vec<TargetTotalProvenance>,
    pub warnings: Vec<QualityWarning>,
    pub approved_model_version_id: Option<ModelVersionId>,
}

impl NowcastCandidate {
    pub fn has_critical_warning(&self) -> bool {
        self.warnings.iter().any(|w| w.severity == WarningSeverity::Critical)
    }
}
