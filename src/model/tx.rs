//! Write-steps submitted to the transaction engine

use super::ids::{AttrId, EntityId};
use super::triple::Triple;
use serde::{Deserialize, Serialize};

/// How a write-step addresses an entity: by id, or by a unique attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Lookup {
    Id { id: EntityId },
    Unique { attr_id: AttrId, value: serde_json::Value },
}

impl Lookup {
    pub fn id(id: EntityId) -> Self {
        Lookup::Id { id }
    }

    pub fn unique(attr_id: AttrId, value: impl Into<serde_json::Value>) -> Self {
        Lookup::Unique {
            attr_id,
            value: value.into(),
        }
    }
}

impl From<EntityId> for Lookup {
    fn from(id: EntityId) -> Self {
        Lookup::id(id)
    }
}

/// One ordered write-step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TxStep {
    AddTriple {
        entity: Lookup,
        attr_id: AttrId,
        value: serde_json::Value,
    },
    RetractTriple {
        entity: Lookup,
        attr_id: AttrId,
        value: serde_json::Value,
    },
    DeleteEntity {
        entity: Lookup,
        etype: String,
    },
}

/// What the transaction engine reports back after applying a batch of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TxReport {
    pub tx_id: i64,
    pub added: Vec<Triple>,
    /// Triples removed by `DeleteEntity` and `RetractTriple` steps, in step order
    pub deleted: Vec<Triple>,
}
