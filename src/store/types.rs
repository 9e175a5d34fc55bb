use crate::ids::ModelVersionId;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// An immutable snapshot of an input-output table.
///
/// Only the `ModelStore` constructs these, after validating the shape and sign
/// invariants. Nothing hands out `&mut` access, so a registered version never changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelVersion {
    id: ModelVersionId,
    base_year: i32,
    sector_codes: Vec<String>,
    z: DMatrix<f64>,
    x: DVector<f64>,
    source: String,
    checksum: String,
}

impl ModelVersion {
    pub(crate) fn new(
        base_year: i32,
        sector_codes: Vec<String>,
        z: DMatrix<f64>,
        x: DVector<f64>,
        source: String,
    ) -> Self {
        let checksum = content_checksum(&z, &x);
        Self {
            id: ModelVersionId::new(),
            base_year,
            sector_codes,
            z,
            x,
            source,
            checksum,
        }
    }

    pub fn id(&self) -> ModelVersionId { self.id }
    pub fn base_year(&self) -> i32 { self.base_year }
    pub fn sector_codes(&self) -> &[String] { &self.sector_codes }
    pub fn z(&self) -> &DMatrix<f64> { &self.z }
    pub fn x(&self) -> &DVector<f64> { &self.x }
    pub fn source(&self) -> &str { &self.source }
    pub fn checksum(&self) -> &str { &self.checksum }
    pub fn sector_count(&self) -> usize { self.x.len() }

    pub fn sector_index(&self, code: &str) -> Option<usize> {
        self.sector_codes.iter().position(|c| c == code)
    }
}

/// `sha256:<hex>` over `Z` in row-major order followed by `x`, both as little-endian f64.
pub fn content_checksum(z: &DMatrix<f64>, x: &DVector<f64>) -> String {
    let mut hasher = Sha256::new();
    for i in 0..z.nrows() {
        for v in z.row(i).iter() {
            hasher.update(v.to_le_bytes());
        }
    }
    for v in x.iter() {
        hasher.update(v.to_le_bytes());
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
