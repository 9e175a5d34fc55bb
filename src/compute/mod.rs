//! Leontief algebra and final-demand impact propagation.
pub mod impact;
pub mod leontief;

pub use impact::{LeontiefSolver, PhasedResult, SolveResult};
pub use leontief::{
    leontief_inverse, multipliers, spectral_radius, technical_coefficients, LeontiefResult,
};
