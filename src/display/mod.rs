//! Human-readable audit output.
pub mod trace;

pub use trace::{format_feasibility_trace, format_structural_trace};
