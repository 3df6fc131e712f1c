//! Identifier newtypes

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a tenant app
    AppId
);

uuid_id!(
    /// Identifier of an entity in the triple store
    EntityId
);

uuid_id!(
    /// Identifier of an attribute in an app's catalog
    AttrId
);

impl AppId {
    /// 64-bit key used for the app's advisory lock.
    ///
    /// Folds both halves of the UUID so that the key is stable across
    /// processes and releases. Distinct apps can fold to the same key; they
    /// then wait on each other's lock.
    pub fn advisory_key(&self) -> i64 {
        let (hi, lo) = self.0.as_u64_pair();
        (hi ^ lo) as i64
    }
}
