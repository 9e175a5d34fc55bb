//! Post-solve pass/fail checks for constraints that never reshape output.

use super::constraint::{BoundScope, Constraint, ConstraintScope, ConstraintType};
use crate::ids::ConstraintId;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Per-sector coefficients the aggregate checks are computed from. Every field
/// is optional; a check whose input is missing is reported `NotEvaluated`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiagnosticInputs {
    /// Spend per unit of output delta.
    pub spend_coefficients: Option<DVector<f64>>,
    /// Jobs per unit of output.
    pub jobs_coefficients: Option<DVector<f64>>,
    /// Current employment, added to the job delta for `AbsoluteTotal` labor bounds.
    pub base_employment: Option<DVector<f64>>,
    /// Projected Saudi share of employment, as a fraction.
    pub saudi_share: Option<DVector<f64>>,
}

impl DiagnosticInputs {
    pub(crate) fn dimension_issue(&self, n: usize) -> Option<String> {
        let fields = [
            ("spend_coefficients", &self.spend_coefficients),
            ("jobs_coefficients", &self.jobs_coefficients),
            ("base_employment", &self.base_employment),
            ("saudi_share", &self.saudi_share),
        ];
        fields.iter().find_map(|(name, v)| match v {
            Some(v) if v.len() != n => Some(format!(
                "dimension mismatch: {} has {} elements, expected {}",
                name,
                v.len(),
                n
            )),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticStatus {
    Pass,
    Fail,
    NotEvaluated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticOutcome {
    pub constraint_id: ConstraintId,
    pub constraint_type: ConstraintType,
    pub status: DiagnosticStatus,
    /// The aggregate that was compared against the bounds.
    pub value: Option<f64>,
    pub message: String,
}

/// Evaluates one non-clipping constraint against the feasible delta.
pub(crate) fn evaluate(
    constraint: &Constraint,
    feasible: &DVector<f64>,
    sector_codes: &[String],
    inputs: &DiagnosticInputs,
) -> DiagnosticOutcome {
    let indices: Vec<usize> = sector_codes
        .iter()
        .enumerate()
        .filter(|(_, code)| constraint.scope.applies_to(code))
        .map(|(i, _)| i)
        .collect();

    let outcome = |status, value, message: String| DiagnosticOutcome {
        constraint_id: constraint.id,
        constraint_type: constraint.constraint_type,
        status,
        value,
        message,
    };

    if indices.is_empty() {
        return outcome(
            DiagnosticStatus::NotEvaluated,
            None,
            format!("scope {} matches no model sector", describe_scope(&constraint.scope)),
        );
    }

    match constraint.constraint_type {
        ConstraintType::Budget => {
            let Some(spend) = &inputs.spend_coefficients else {
                return outcome(DiagnosticStatus::NotEvaluated, None, "no spend coefficients supplied".into());
            };
            let total: f64 = indices.iter().map(|&i| spend[i] * feasible[i]).sum();
            let (status, message) = compare(constraint, total, "spend");
            outcome(status, Some(total), message)
        }
        ConstraintType::Labor => {
            let Some(jobs) = &inputs.jobs_coefficients else {
                return outcome(DiagnosticStatus::NotEvaluated, None, "no jobs coefficients supplied".into());
            };
            let mut total: f64 = indices.iter().map(|&i| jobs[i] * feasible[i]).sum();
            if constraint.effective_bound_scope() == BoundScope::AbsoluteTotal {
                let Some(base) = &inputs.base_employment else {
                    return outcome(
                        DiagnosticStatus::NotEvaluated,
                        None,
                        "absolute labor bound needs base employment".into(),
                    );
                };
                total += indices.iter().map(|&i| base[i]).sum::<f64>();
            }
            let (status, message) = compare(constraint, total, "jobs");
            outcome(status, Some(total), message)
        }
        ConstraintType::Saudization => {
            let Some(share) = &inputs.saudi_share else {
                return outcome(DiagnosticStatus::NotEvaluated, None, "no Saudi share projection supplied".into());
            };
            // Worst sector in scope decides the outcome.
            let mut worst = indices[0];
            for &i in &indices[1..] {
                if share[i] < share[worst] {
                    worst = i;
                }
            }
            let value = share[worst];
            let (status, message) = compare(constraint, value, &format!("Saudi share in {}", sector_codes[worst]));
            outcome(status, Some(value), message)
        }
        ConstraintType::CapacityCap | ConstraintType::Ramp => outcome(
            DiagnosticStatus::NotEvaluated,
            None,
            format!("{} is applied by the solver, not as a diagnostic", constraint.constraint_type),
        ),
    }
}

fn compare(constraint: &Constraint, value: f64, what: &str) -> (DiagnosticStatus, String) {
    let b = &constraint.bounds;
    if let Some(upper) = b.upper {
        if value > upper {
            return (DiagnosticStatus::Fail, format!("{} {:.4} exceeds upper bound {:.4}", what, value, upper));
        }
    }
    if let Some(lower) = b.lower {
        if value < lower {
            return (DiagnosticStatus::Fail, format!("{} {:.4} is below lower bound {:.4}", what, value, lower));
        }
    }
    (DiagnosticStatus::Pass, format!("{} {:.4} within bounds", what, value))
}

pub(crate) fn describe_scope(scope: &ConstraintScope) -> String {
    match scope {
        ConstraintScope::Sector(code) => format!("sector {}", code),
        ConstraintScope::Sectors(codes) => format!("sectors [{}]", codes.join(", ")),
        ConstraintScope::Economy { .. } => "economy".to_string(),
    }
}
