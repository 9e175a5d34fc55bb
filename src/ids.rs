//! Opaque identifiers. All are random v4 UUIDs wrapped in distinct newtypes so a
//! nowcast id can never be passed where a model version id is expected.
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_id!(
    /// Key of an immutable model snapshot in the `ModelStore`.
    ModelVersionId
);
define_id!(NowcastId);
define_id!(ConstraintId);
define_id!(ConstraintSetId);
define_id!(
    /// Scenario run a feasibility solve belongs to.
    RunId
);
