//! Governed re-estimation of an aging base model.
pub mod service;
pub mod types;

pub use service::NowcastingService;
pub use types::{
    NowcastCandidate, NowcastRequest, NowcastStatus, QualityDimension, QualityWarning, TargetTotalProvenance, WarningSeverity,
};
