use super::types::ModelVersion;
use crate::compute::leontief::{self, LeontiefResult};
use crate::config::StoreConfig;
use crate::error::{EngineError, EngineResult};
use crate::ids::ModelVersionId;
use nalgebra::{DMatrix, DVector};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// A registered model together with its (memoised) Leontief quantities.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub version: Arc<ModelVersion>,
    pub leontief: Arc<LeontiefResult>,
}

/// Owns immutable model snapshots and lazily derives their Leontief results.
///
/// Both maps live for the lifetime of the store; there is no eviction. A cache
/// miss is a pure function of immutable inputs, so two callers racing on the same
/// miss may both compute, but the first insert wins and every caller afterwards
/// receives that same `Arc`.
#[derive(Debug, Default)]
pub struct ModelStore {
    config: StoreConfig,
    models: RwLock<HashMap<ModelVersionId, Arc<ModelVersion>>>,
    leontief: RwLock<HashMap<ModelVersionId, Arc<LeontiefResult>>>,
}

impl ModelStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_config(config: StoreConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn len(&self) -> usize { self.models.read().len() }
    pub fn is_empty(&self) -> bool { self.models.read().is_empty() }
    pub fn contains(&self, id: ModelVersionId) -> bool { self.models.read().contains_key(&id) }

    pub fn ids(&self) -> Vec<ModelVersionId> {
        let mut ids: Vec<_> = self.models.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Validates and permanently stores a new model version.
    pub fn register(
        &self,
        z: DMatrix<f64>,
        x: DVector<f64>,
        sector_codes: Vec<String>,
        base_year: i32,
        source: impl Into<String>,
    ) -> EngineResult<Arc<ModelVersion>> {
        validate_model_inputs(&z, &x, &sector_codes)?;

        if self.config.require_productive {
            let a = leontief::technical_coefficients(&z, &x)?;
            let radius = leontief::spectral_radius(&a);
            if radius >= 1.0 {
                return Err(EngineError::validation(format!(
                    "spectral radius of A is {:.4} (must be < 1): the economy is not productive",
                    radius
                )));
            }
        }

        let version = Arc::new(ModelVersion::new(base_year, sector_codes, z, x, source.into()));
        info!(
            model_version_id = %version.id(),
            sectors = version.sector_count(),
            base_year,
            source = version.source(),
            checksum = version.checksum(),
            "registered model version"
        );
        self.models.write().insert(version.id(), Arc::clone(&version));
        Ok(version)
    }

    /// Returns the snapshot without touching the Leontief cache.
    pub fn get_version(&self, id: ModelVersionId) -> EngineResult<Arc<ModelVersion>> {
        self.models
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("ModelVersion", id))
    }

    /// Returns the snapshot and its Leontief result, computing the latter on first access.
    pub fn get(&self, id: ModelVersionId) -> EngineResult<LoadedModel> {
        let version = self.get_version(id)?;

        if let Some(hit) = self.leontief.read().get(&id).cloned() {
            debug!(model_version_id = %id, "leontief cache hit");
            return Ok(LoadedModel { version, leontief: hit });
        }

        debug!(model_version_id = %id, "leontief cache miss");
        let computed = Arc::new(LeontiefResult::compute(
            version.z(),
            version.x(),
            self.config.singular_pivot_tolerance,
        )?);
        let leontief = Arc::clone(self.leontief.write().entry(id).or_insert(computed));
        Ok(LoadedModel { version, leontief })
    }
}

fn validate_model_inputs(z: &DMatrix<f64>, x: &DVector<f64>, sector_codes: &[String]) -> EngineResult<()> {
    let n = leontief::ensure_square(z, "Z")?;
    if x.len() != n {
        return Err(EngineError::validation(format!(
            "dimension mismatch: Z is {}x{} but x has {} elements",
            n,
            n,
            x.len()
        )));
    }
    if sector_codes.len() != n {
        return Err(EngineError::validation(format!(
            "sector_codes length ({}) must match dimension ({})",
            sector_codes.len(),
            n
        )));
    }

    let mut seen = HashSet::with_capacity(n);
    for code in sector_codes {
        if code.trim().is_empty() {
            return Err(EngineError::validation("sector codes must not be empty"));
        }
        if !seen.insert(code.as_str()) {
            return Err(EngineError::validation(format!("duplicate sector code '{}'", code)));
        }
    }

    for i in 0..n {
        for j in 0..n {
            let v = z[(i, j)];
            if !v.is_finite() || v < 0.0 {
                return Err(EngineError::validation(format!(
                    "Z must be finite and non-negative: Z[{}, {}] ({} -> {}) = {}",
                    i, j, sector_codes[i], sector_codes[j], v
                )));
            }
        }
    }
    for (j, &v) in x.iter().enumerate() {
        if !v.is_finite() || v <= 0.0 {
            return Err(EngineError::validation(format!(
                "x must be strictly positive: output of sector '{}' is {}",
                sector_codes[j], v
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn codes(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("S{}", i)).collect()
    }

    fn two_sector() -> (DMatrix<f64>, DVector<f64>) {
        (
            DMatrix::from_row_slice(2, 2, &[10.0, 5.0, 3.0, 8.0]),
            DVector::from_vec(vec![30.0, 20.0]),
        )
    }

    #[test]
    fn test_register_and_get() {
        let store = ModelStore::new();
        let (z, x) = two_sector();
        let mv = store.register(z.clone(), x, codes(2), 2019, "GASTAT").unwrap();
        assert!(mv.checksum().starts_with("sha256:"));
        assert_eq!(mv.base_year(), 2019);
        assert_eq!(store.len(), 1);

        let loaded = store.get(mv.id()).unwrap();
        assert_eq!(loaded.version.z(), &z);
        assert!((loaded.leontief.multipliers[0] - 28.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_leontief_result_is_memoised() {
        let store = ModelStore::new();
        let (z, x) = two_sector();
        let mv = store.register(z, x, codes(2), 2019, "GASTAT").unwrap();
        let first = store.get(mv.id()).unwrap();
        let second = store.get(mv.id()).unwrap();
        assert!(Arc::ptr_eq(&first.leontief, &second.leontief));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let store = ModelStore::new();
        let err = store.get(ModelVersionId::new()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "ModelVersion", .. }));
    }

    #[test]
    fn test_checksum_is_content_addressed() {
        let store = ModelStore::new();
        let (z, x) = two_sector();
        let a = store.register(z.clone(), x.clone(), codes(2), 2019, "a").unwrap();
        let b = store.register(z, x, codes(2), 2020, "b").unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.checksum(), b.checksum());
    }

    #[rstest]
    #[case::negative_flow(DMatrix::from_row_slice(2, 2, &[1.0, -1.0, 0.0, 1.0]), vec![5.0, 5.0], 2, "non-negative")]
    #[case::zero_output(DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]), vec![5.0, 0.0], 2, "strictly positive")]
    #[case::nan_output(DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]), vec![5.0, f64::NAN], 2, "strictly positive")]
    #[case::short_x(DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]), vec![5.0], 2, "dimension mismatch")]
    #[case::not_square(DMatrix::from_row_slice(1, 2, &[1.0, 1.0]), vec![5.0, 5.0], 2, "square")]
    #[case::code_count(DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]), vec![5.0, 5.0], 3, "sector_codes length")]
    fn test_register_rejects_invalid_inputs(
        #[case] z: DMatrix<f64>,
        #[case] x: Vec<f64>,
        #[case] n_codes: usize,
        #[case] expected: &str,
    ) {
        let store = ModelStore::new();
        let err = store.register(z, DVector::from_vec(x), codes(n_codes), 2019, "test").unwrap_err();
        match err {
            EngineError::Validation(msg) => assert!(msg.contains(expected), "msg: {}", msg),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_sector_codes_rejected() {
        let store = ModelStore::new();
        let (z, x) = two_sector();
        let err = store
            .register(z, x, vec!["A".into(), "A".into()], 2019, "test")
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_non_productive_model_registers_by_default() {
        // Column sums of A exceed 1: spectral radius > 1.
        let z = DMatrix::from_row_slice(2, 2, &[8.0, 8.0, 8.0, 8.0]);
        let x = DVector::from_vec(vec![10.0, 10.0]);
        let store = ModelStore::new();
        assert!(store.register(z.clone(), x.clone(), codes(2), 2019, "test").is_ok());

        let strict = ModelStore::with_config(StoreConfig { require_productive: true, ..StoreConfig::default() });
        let err = strict.register(z, x, codes(2), 2019, "test").unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("spectral radius")));
    }

    #[test]
    fn test_singular_model_fails_on_get() {
        // A = [[0.5, 0.5], [0.5, 0.5]] makes (I - A) singular.
        let z = DMatrix::from_row_slice(2, 2, &[5.0, 5.0, 5.0, 5.0]);
        let x = DVector::from_vec(vec![10.0, 10.0]);
        let store = ModelStore::new();
        let mv = store.register(z, x, codes(2), 2019, "test").unwrap();
        assert!(matches!(store.get(mv.id()), Err(EngineError::SingularMatrix(_))));
        assert!(store.get_version(mv.id()).is_ok());
    }
}
