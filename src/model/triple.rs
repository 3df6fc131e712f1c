//! Triple: the atomic fact of the triple-store representation

use super::ids::{AttrId, EntityId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// An immutable `(entity, attribute, value, created_at)` fact.
///
/// `created_at` is the logical write time in milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    pub entity_id: EntityId,
    pub attr_id: AttrId,
    pub value: serde_json::Value,
    pub created_at: i64,
}

impl Triple {
    pub fn new(
        entity_id: EntityId,
        attr_id: AttrId,
        value: impl Into<serde_json::Value>,
        created_at: i64,
    ) -> Self {
        Self {
            entity_id,
            attr_id,
            value: value.into(),
            created_at,
        }
    }
}

// JSON values have no total order of their own; comparing their canonical
// text keeps `Triple` usable in ordered sets.
impl Eq for Triple {}

impl Ord for Triple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entity_id
            .cmp(&other.entity_id)
            .then_with(|| self.attr_id.cmp(&other.attr_id))
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.value.to_string().cmp(&other.value.to_string()))
    }
}

impl PartialOrd for Triple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
