//! Structural validity of a technical-coefficient matrix.
//!
//! The score starts at 1.0 and each triggered rule caps it; caps combine by
//! minimum, so the worst single finding decides the score. Every triggered rule
//! leaves a penalty line explaining itself.

use crate::compute::leontief::spectral_radius;
use crate::config::StructuralThresholds;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityGrade {
    A,
    B,
    C,
    D,
    F,
}

impl QualityGrade {
    pub fn from_score(score: f64, t: &StructuralThresholds) -> Self {
        if score >= t.grade_a_min {
            QualityGrade::A
        } else if score >= t.grade_b_min {
            QualityGrade::B
        } else if score >= t.grade_c_min {
            QualityGrade::C
        } else if score >= t.grade_d_min {
            QualityGrade::D
        } else {
            QualityGrade::F
        }
    }
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralInput {
    pub a: DMatrix<f64>,
    pub sector_codes: Vec<String>,
    pub expected_sector_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralReport {
    /// In `[0, 1]`.
    pub score: f64,
    pub grade: QualityGrade,
    pub spectral_radius: f64,
    pub negative_entries: usize,
    pub penalties: Vec<String>,
    pub details: String,
}

impl StructuralReport {
    pub fn is_clean(&self) -> bool {
        self.penalties.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StructuralValidityChecker {
    thresholds: StructuralThresholds,
}

impl StructuralValidityChecker {
    pub fn new(thresholds: StructuralThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &StructuralThresholds {
        &self.thresholds
    }

    pub fn check_input(&self, input: &StructuralInput) -> StructuralReport {
        self.check(&input.a, &input.sector_codes, input.expected_sector_count)
    }

    pub fn check(&self, a: &DMatrix<f64>, sector_codes: &[String], expected_sector_count: usize) -> StructuralReport {
        let t = &self.thresholds;
        let mut score: f64 = 1.0;
        let mut penalties = Vec::new();
        let mut cap = |limit: f64, penalty: String, score: &mut f64| {
            *score = score.min(limit);
            penalties.push(penalty);
        };

        let (rows, cols) = a.shape();
        let non_finite = a.iter().filter(|v| !v.is_finite()).count();
        if rows != cols || rows == 0 || non_finite > 0 {
            let reason = if non_finite > 0 {
                format!("{} non-finite coefficient(s) in A matrix", non_finite)
            } else {
                format!("A matrix is {}x{}, expected a non-empty square matrix", rows, cols)
            };
            cap(0.0, reason, &mut score);
            return self.finish(score, f64::NAN, 0, penalties, rows, cols);
        }

        let radius = spectral_radius(a);
        if radius >= t.spectral_critical {
            cap(
                0.0,
                format!(
                    "Spectral radius = {:.4} (>= {:.2}): Leontief inverse does not exist",
                    radius, t.spectral_critical
                ),
                &mut score,
            );
        } else if radius >= t.spectral_high {
            cap(
                t.high_cap,
                format!(
                    "Spectral radius = {:.4} (>= {:.2}): near-singular matrix, results may be unstable",
                    radius, t.spectral_high
                ),
                &mut score,
            );
        } else if radius >= t.spectral_elevated {
            cap(
                t.elevated_cap,
                format!("Spectral radius = {:.4} (>= {:.2}): elevated but acceptable", radius, t.spectral_elevated),
                &mut score,
            );
        }

        let negative = a.iter().filter(|v| **v < 0.0).count();
        if negative > 0 {
            cap(
                t.negative_entry_cap,
                format!("{} negative coefficient(s) in A matrix", negative),
                &mut score,
            );
        }

        for j in 0..cols {
            let sum = a.column(j).sum();
            if sum >= 1.0 {
                let code = sector_codes.get(j).cloned().unwrap_or_else(|| format!("col_{}", j));
                cap(
                    t.column_sum_cap,
                    format!("Column sum for {} = {:.4} (>= 1.0): non-positive value added", code, sum),
                    &mut score,
                );
            }
        }

        if rows != expected_sector_count {
            cap(
                t.sector_count_cap,
                format!("Matrix has {} sectors but taxonomy expects {}", rows, expected_sector_count),
                &mut score,
            );
        }

        self.finish(score, radius, negative, penalties, rows, cols)
    }

    fn finish(
        &self,
        score: f64,
        spectral_radius: f64,
        negative_entries: usize,
        penalties: Vec<String>,
        rows: usize,
        cols: usize,
    ) -> StructuralReport {
        let score = score.clamp(0.0, 1.0);
        StructuralReport {
            score,
            grade: QualityGrade::from_score(score, &self.thresholds),
            spectral_radius,
            negative_entries,
            details: format!(
                "Spectral radius = {:.4}, {}x{} matrix, {} negative coefficients",
                spectral_radius, rows, cols, negative_entries
            ),
            penalties,
        }
    }
}
