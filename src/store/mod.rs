//! Immutable model snapshots and their memoised Leontief results.
pub mod registry;
pub mod types;

pub use registry::{LoadedModel, ModelStore};
pub use types::{content_checksum, ModelVersion};
