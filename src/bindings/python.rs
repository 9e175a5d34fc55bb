use crate::balance::RasBalancer;
use crate::display::trace;
use crate::error::EngineError;
use crate::ids::{ModelVersionId, NowcastId};
use crate::nowcast::{NowcastRequest, NowcastingService};
use crate::solver::{ConstraintEngine, ConstraintSet, FeasibilityRequest};
use crate::store::ModelStore;
use crate::validation::{BenchmarkBands, PlausibilityChecker, StructuralValidityChecker};
use nalgebra::{DMatrix, DVector};
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

impl From<EngineError> for PyErr {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound { .. } => PyKeyError::new_err(e.to_string()),
            EngineError::InvalidState { .. } | EngineError::SingularMatrix(_) => PyRuntimeError::new_err(e.to_string()),
            _ => PyValueError::new_err(e.to_string()),
        }
    }
}

fn to_matrix(rows: Vec<Vec<f64>>) -> PyResult<DMatrix<f64>> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != n_cols) {
        return Err(PyValueError::new_err("Matrix rows must all have the same length"));
    }
    Ok(DMatrix::from_row_iterator(n_rows, n_cols, rows.into_iter().flatten()))
}

fn from_matrix(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows()).map(|i| m.row(i).iter().copied().collect()).collect()
}

fn parse_uuid(raw: &str) -> PyResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| PyValueError::new_err(format!("Invalid id '{}': {}", raw, e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> PyResult<String> {
    serde_json::to_string(value).map_err(|e| PyRuntimeError::new_err(e.to_string()))
}

#[pyclass(name = "_ModelStore")]
#[derive(Debug, Clone, Default)]
pub struct PyModelStore {
    inner: Arc<ModelStore>,
}

#[pymethods]
impl PyModelStore {
    #[new]
    pub fn new() -> Self { Self::default() }

    pub fn register(
        &self,
        z: Vec<Vec<f64>>,
        x: Vec<f64>,
        sector_codes: Vec<String>,
        base_year: i32,
        source: String,
    ) -> PyResult<String> {
        let version = self.inner.register(to_matrix(z)?, DVector::from_vec(x), sector_codes, base_year, source)?;
        Ok(version.id().to_string())
    }

    pub fn technical_coefficients(&self, model_version_id: &str) -> PyResult<Vec<Vec<f64>>> {
        let loaded = self.inner.get(ModelVersionId(parse_uuid(model_version_id)?))?;
        Ok(from_matrix(&loaded.leontief.a))
    }

    pub fn leontief_inverse(&self, model_version_id: &str) -> PyResult<Vec<Vec<f64>>> {
        let loaded = self.inner.get(ModelVersionId(parse_uuid(model_version_id)?))?;
        Ok(from_matrix(&loaded.leontief.b))
    }

    pub fn multipliers(&self, model_version_id: &str) -> PyResult<Vec<f64>> {
        let loaded = self.inner.get(ModelVersionId(parse_uuid(model_version_id)?))?;
        Ok(loaded.leontief.multipliers.iter().copied().collect())
    }

    pub fn spectral_radius(&self, model_version_id: &str) -> PyResult<f64> {
        let loaded = self.inner.get(ModelVersionId(parse_uuid(model_version_id)?))?;
        Ok(loaded.leontief.spectral_radius)
    }

    pub fn checksum(&self, model_version_id: &str) -> PyResult<String> {
        let version = self.inner.get_version(ModelVersionId(parse_uuid(model_version_id)?))?;
        Ok(version.checksum().to_string())
    }

    /// Solves a serialized `FeasibilityRequest` against a serialized `ConstraintSet`.
    pub fn solve_feasibility(&self, constraint_set_json: &str, request_json: &str) -> PyResult<String> {
        let set: ConstraintSet =
            serde_json::from_str(constraint_set_json).map_err(|e| PyValueError::new_err(e.to_string()))?;
        let request: FeasibilityRequest =
            serde_json::from_str(request_json).map_err(|e| PyValueError::new_err(e.to_string()))?;
        to_json(&ConstraintEngine::default().solve(&set, &request)?)
    }

    pub fn feasibility_trace(&self, constraint_set_json: &str, request_json: &str) -> PyResult<String> {
        let set: ConstraintSet =
            serde_json::from_str(constraint_set_json).map_err(|e| PyValueError::new_err(e.to_string()))?;
        let request: FeasibilityRequest =
            serde_json::from_str(request_json).map_err(|e| PyValueError::new_err(e.to_string()))?;
        let result = ConstraintEngine::default().solve(&set, &request)?;
        Ok(trace::format_feasibility_trace(&result))
    }

    pub fn __len__(&self) -> usize { self.inner.len() }
}

#[pyclass(name = "_NowcastingService")]
pub struct PyNowcastingService {
    inner: NowcastingService,
}

#[pymethods]
impl PyNowcastingService {
    #[new]
    pub fn new(store: &PyModelStore) -> Self {
        Self { inner: NowcastingService::new(Arc::clone(&store.inner)) }
    }

    pub fn create(
        &self,
        base_model_id: &str,
        target_row_totals: Vec<f64>,
        target_col_totals: Vec<f64>,
        target_year: i32,
    ) -> PyResult<String> {
        let request = NowcastRequest::new(
            ModelVersionId(parse_uuid(base_model_id)?),
            DVector::from_vec(target_row_totals),
            DVector::from_vec(target_col_totals),
            target_year,
        );
        Ok(self.inner.create_nowcast(request)?.id.to_string())
    }

    pub fn approve(&self, nowcast_id: &str) -> PyResult<String> {
        let version = self.inner.approve_nowcast(NowcastId(parse_uuid(nowcast_id)?))?;
        Ok(version.id().to_string())
    }

    pub fn reject(&self, nowcast_id: &str) -> PyResult<()> {
        Ok(self.inner.reject_nowcast(NowcastId(parse_uuid(nowcast_id)?))?)
    }

    pub fn status(&self, nowcast_id: &str) -> PyResult<String> {
        Ok(self.inner.status(NowcastId(parse_uuid(nowcast_id)?))?.to_string())
    }

    pub fn candidate_json(&self, nowcast_id: &str) -> PyResult<String> {
        to_json(&self.inner.candidate(NowcastId(parse_uuid(nowcast_id)?))?)
    }
}

#[pyclass(name = "_PlausibilityChecker")]
#[derive(Debug, Default)]
pub struct PyPlausibilityChecker {
    inner: PlausibilityChecker,
}

#[pymethods]
impl PyPlausibilityChecker {
    #[new]
    pub fn new() -> Self { Self::default() }

    /// Returns (in-range percentage, flagged sector codes).
    #[pyo3(signature = (b, sector_codes, benchmarks, model_version_id=None))]
    pub fn check(
        &self,
        b: Vec<Vec<f64>>,
        sector_codes: Vec<String>,
        benchmarks: BenchmarkBands,
        model_version_id: Option<String>,
    ) -> PyResult<(f64, Vec<String>)> {
        let id = model_version_id.as_deref().map(parse_uuid).transpose()?.map(ModelVersionId);
        let result = self.inner.check(&to_matrix(b)?, &sector_codes, &benchmarks, id)?;
        Ok((result.multipliers_in_range_pct, result.flagged_sectors.clone()))
    }
}

/// Returns (balanced matrix, converged, iterations, final error).
#[pyfunction]
#[pyo3(signature = (z0, target_row_totals, target_col_totals, max_iterations=1000, tolerance=1e-8))]
fn ras_balance(
    z0: Vec<Vec<f64>>,
    target_row_totals: Vec<f64>,
    target_col_totals: Vec<f64>,
    max_iterations: usize,
    tolerance: f64,
) -> PyResult<(Vec<Vec<f64>>, bool, usize, f64)> {
    let res = RasBalancer::balance_with(
        &to_matrix(z0)?,
        &DVector::from_vec(target_row_totals),
        &DVector::from_vec(target_col_totals),
        max_iterations,
        tolerance,
    )?;
    Ok((from_matrix(&res.z_balanced), res.converged, res.iterations, res.final_error))
}

/// Returns (score, grade, penalties).
#[pyfunction]
fn structural_validity(a: Vec<Vec<f64>>, sector_codes: Vec<String>, expected_sector_count: usize) -> PyResult<(f64, String, Vec<String>)> {
    let report = StructuralValidityChecker::default().check(&to_matrix(a)?, &sector_codes, expected_sector_count);
    Ok((report.score, report.grade.to_string(), report.penalties))
}

#[pyfunction]
fn rust_core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Defines the `_core` Python module.
#[pymodule]
fn _core(_py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyModelStore>()?;
    m.add_class::<PyNowcastingService>()?;
    m.add_class::<PyPlausibilityChecker>()?;
    m.add_function(wrap_pyfunction!(ras_balance, m)?)?;
    m.add_function(wrap_pyfunction!(structural_validity, m)?)?;
    m.add_function(wrap_pyfunction!(rust_core_version, m)?)?;
    Ok(())
}
