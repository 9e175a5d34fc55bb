//! Runtime configuration for the engine.
//!
//! Every section has a `Default` matching the values the models were calibrated
//! with, so a partial JSON document only needs to name what it overrides.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ras: RasConfig,
    pub nowcast: NowcastConfig,
    pub store: StoreConfig,
    pub structural: StructuralThresholds,
    pub feasibility: FeasibilityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasConfig {
    pub max_iterations: usize,
    /// Maximum relative deviation between achieved and target totals.
    pub tolerance: f64,
}

impl Default for RasConfig {
    fn default() -> Self {
        Self { max_iterations: 1000, tolerance: 1e-8 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NowcastConfig {
    /// Structural change magnitude above which a manual-review warning is raised.
    pub structural_change_warning: f64,
    /// Source label stamped on model versions created by an approved nowcast.
    pub source_label: String,
}

impl Default for NowcastConfig {
    fn default() -> Self {
        Self {
            structural_change_warning: 0.5,
            source_label: "balanced-nowcast".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Pivots smaller than this fraction of the largest pivot count as zero.
    pub singular_pivot_tolerance: f64,
    /// Reject models whose spectral radius is >= 1 at registration.
    pub require_productive: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { singular_pivot_tolerance: 1e-12, require_productive: false }
    }
}

/// Caps applied by the structural validity rules and the grade cut-offs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralThresholds {
    pub spectral_critical: f64,
    pub spectral_high: f64,
    pub spectral_elevated: f64,
    pub high_cap: f64,
    pub elevated_cap: f64,
    pub negative_entry_cap: f64,
    pub column_sum_cap: f64,
    pub sector_count_cap: f64,
    pub grade_a_min: f64,
    pub grade_b_min: f64,
    pub grade_c_min: f64,
    pub grade_d_min: f64,
}

impl Default for StructuralThresholds {
    fn default() -> Self {
        Self {
            spectral_critical: 1.0,
            spectral_high: 0.95,
            spectral_elevated: 0.90,
            high_cap: 0.5,
            elevated_cap: 0.7,
            negative_entry_cap: 0.5,
            column_sum_cap: 0.5,
            sector_count_cap: 0.7,
            grade_a_min: 0.9,
            grade_b_min: 0.75,
            grade_c_min: 0.6,
            grade_d_min: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeasibilityConfig {
    /// Absolute slack used when deciding whether a clamp strictly reduced a value.
    pub epsilon: f64,
}

impl Default for FeasibilityConfig {
    fn default() -> Self {
        Self { epsilon: 1e-9 }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| EngineError::Config(format!("invalid JSON config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> EngineResult<()> {
        if self.ras.max_iterations == 0 {
            return Err(EngineError::Config("ras.max_iterations must be at least 1".into()));
        }
        if !(self.ras.tolerance > 0.0 && self.ras.tolerance.is_finite()) {
            return Err(EngineError::Config(format!(
                "ras.tolerance must be a positive finite number, got {}",
                self.ras.tolerance
            )));
        }
        if !(self.nowcast.structural_change_warning >= 0.0) {
            return Err(EngineError::Config(format!(
                "nowcast.structural_change_warning must be >= 0, got {}",
                self.nowcast.structural_change_warning
            )));
        }
        if self.nowcast.source_label.trim().is_empty() {
            return Err(EngineError::Config("nowcast.source_label must not be empty".into()));
        }
        if !(self.store.singular_pivot_tolerance >= 0.0 && self.store.singular_pivot_tolerance < 1.0) {
            return Err(EngineError::Config(format!(
                "store.singular_pivot_tolerance must be in [0, 1), got {}",
                self.store.singular_pivot_tolerance
            )));
        }
        if !(self.feasibility.epsilon >= 0.0) {
            return Err(EngineError::Config(format!(
                "feasibility.epsilon must be >= 0, got {}",
                self.feasibility.epsilon
            )));
        }
        self.structural.validate()
    }
}

impl StructuralThresholds {
    fn validate(&self) -> EngineResult<()> {
        let caps = [
            ("high_cap", self.high_cap),
            ("elevated_cap", self.elevated_cap),
            ("negative_entry_cap", self.negative_entry_cap),
            ("column_sum_cap", self.column_sum_cap),
            ("sector_count_cap", self.sector_count_cap),
        ];
        for (name, cap) in caps {
            if !(0.0..=1.0).contains(&cap) {
                return Err(EngineError::Config(format!(
                    "structural.{} must be in [0, 1], got {}",
                    name, cap
                )));
            }
        }
        if !(self.spectral_elevated <= self.spectral_high && self.spectral_high <= self.spectral_critical) {
            return Err(EngineError::Config(format!(
                "structural spectral thresholds must be ordered elevated <= high <= critical, got {} / {} / {}",
                self.spectral_elevated, self.spectral_high, self.spectral_critical
            )));
        }
        if !(self.grade_d_min <= self.grade_c_min
            && self.grade_c_min <= self.grade_b_min
            && self.grade_b_min <= self.grade_a_min)
        {
            return Err(EngineError::Config("structural grade cut-offs must be ordered D <= C <= B <= A".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_overrides_only_named_fields() {
        let cfg = EngineConfig::from_json_str(r#"{ "ras": { "tolerance": 1e-6 } }"#).unwrap();
        assert_eq!(cfg.ras.tolerance, 1e-6);
        assert_eq!(cfg.ras.max_iterations, 1000);
        assert_eq!(cfg.nowcast.source_label, "balanced-nowcast");
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let err = EngineConfig::from_json_str(r#"{ "ras": { "max_iterations": 0 } }"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(msg) if msg.contains("max_iterations")));
    }

    #[test]
    fn test_rejects_unordered_spectral_thresholds() {
        let mut cfg = EngineConfig::default();
        cfg.structural.spectral_high = 1.2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "store": {{ "require_productive": true }} }}"#).unwrap();
        let cfg = EngineConfig::from_json_file(file.path()).unwrap();
        assert!(cfg.store.require_productive);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = EngineConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
