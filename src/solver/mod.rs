//! Feasibility solving: clamps scenario output deltas to real-world limits.
pub mod constraint;
pub mod defaults;
pub mod diagnostics;
pub mod feasibility;

pub use constraint::{
    AllocationRule, BoundScope, Bounds, Confidence, Constraint, ConstraintScope, ConstraintSet, ConstraintType,
    ConstraintUnit, TimeWindow,
};
pub use defaults::default_ramp_constraints;
pub use diagnostics::{DiagnosticInputs, DiagnosticOutcome, DiagnosticStatus};
pub use feasibility::{
    BindingConstraint, ConfidenceSummary, ConstraintEngine, FeasibilityRequest, FeasibilityResult,
};
