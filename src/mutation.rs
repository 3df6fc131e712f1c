//! Entity deletion through the transaction engine

use crate::codec;
use crate::engine::TransactionEngine;
use crate::error::BridgeResult;
use crate::model::{CanonicalRecord, EntityId, Lookup, Triple, TxStep};
use crate::query::Scope;
use rusqlite::Connection;

/// Delete one entity and return what was removed.
///
/// The deleted entity's own triples are decoded into the record the caller
/// would have read before the delete; `None` when the entity had none.
/// References swept from other entities never count as the entity itself.
pub fn delete_entity(
    conn: &Connection,
    tx_engine: &dyn TransactionEngine,
    scope: Scope<'_>,
    lookup: Lookup,
) -> BridgeResult<Option<CanonicalRecord>> {
    let step = TxStep::DeleteEntity {
        entity: lookup.clone(),
        etype: scope.etype.to_string(),
    };
    let report = tx_engine.transact(conn, scope.app_id, scope.attrs, std::slice::from_ref(&step))?;

    let own: Vec<&Triple> = match target_entity(&lookup, &report.deleted) {
        Some(id) => report
            .deleted
            .iter()
            .filter(|t| t.entity_id == id)
            .filter(|t| {
                scope
                    .attrs
                    .seek_by_id(&t.attr_id)
                    .is_some_and(|a| a.forward.etype == scope.etype)
            })
            .collect(),
        None => Vec::new(),
    };
    if own.is_empty() {
        return Ok(None);
    }
    codec::decode(scope.app_id, scope.attrs, scope.etype, own).map(Some)
}

/// Id of the entity `lookup` named, as seen in the deleted triples
fn target_entity(lookup: &Lookup, deleted: &[Triple]) -> Option<EntityId> {
    match lookup {
        Lookup::Id { id } => Some(*id),
        Lookup::Unique { attr_id, value } => deleted
            .iter()
            .find(|t| t.attr_id == *attr_id && t.value == *value)
            .map(|t| t.entity_id),
    }
}
