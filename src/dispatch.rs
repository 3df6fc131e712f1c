//! Operation dispatcher: run the same call against whichever representation
//! is authoritative for the app.

use crate::attrs::resolve_attr_id;
use crate::engine::{Engines, MigrationWindow};
use crate::error::BridgeResult;
use crate::gate::MigrationGate;
use crate::model::{AppId, AppMigrationState, AttrId, Attrs, CanonicalRecord, EntityId, Lookup, Representation, TxReport, TxStep};
use crate::mutation;
use crate::query::{EntityReader, InstaqlForm, Scope, Where};
use crate::storage::{SqliteStore, StoreTx};
use rusqlite::Connection;
use std::sync::Arc;

/// One call with a handler per representation.
///
/// Exactly one of `legacy` and `triples` runs, chosen by the app's migration flag.
pub struct Operation<L, T> {
    pub app_id: AppId,
    pub etype: String,
    pub legacy: L,
    pub triples: T,
}

impl<L, T> Operation<L, T> {
    pub fn new(app_id: AppId, etype: impl Into<String>, legacy: L, triples: T) -> Self {
        Self {
            app_id,
            etype: etype.into(),
            legacy,
            triples,
        }
    }

    /// Build a write-path operation
    pub fn write<R>(app_id: AppId, etype: impl Into<String>, legacy: L, triples: T) -> Self
    where
        L: FnOnce(&StoreTx<'_>) -> BridgeResult<R>,
        T: FnOnce(&WriteCapabilities<'_>) -> BridgeResult<R>,
    {
        Self::new(app_id, etype, legacy, triples)
    }

    /// Build a read-path operation
    pub fn read<R>(app_id: AppId, etype: impl Into<String>, legacy: L, triples: T) -> Self
    where
        L: FnOnce(&Connection) -> BridgeResult<R>,
        T: FnOnce(&ReadCapabilities<'_>) -> BridgeResult<R>,
    {
        Self::new(app_id, etype, legacy, triples)
    }
}

/// Operations bound to one (app, attrs, etype) on one connection
struct Bound<'a> {
    conn: &'a Connection,
    app: &'a AppMigrationState,
    attrs: &'a Attrs,
    etype: &'a str,
    engines: &'a Engines,
}

impl<'a> Bound<'a> {
    fn scope(&self) -> Scope<'a> {
        Scope::new(self.app.app_id, self.attrs, self.etype)
    }

    fn reader(&self) -> EntityReader<'a> {
        EntityReader::new(self.engines.datalog.as_ref(), self.engines.instaql.as_ref())
    }

    fn resolve_id(&self, label: &str) -> BridgeResult<AttrId> {
        resolve_attr_id(self.attrs, self.etype, label)
    }

    fn get_entity(&self, id: EntityId) -> BridgeResult<Option<CanonicalRecord>> {
        self.reader().get_entity(self.conn, self.scope(), id)
    }

    fn get_entity_where(&self, filter: &Where) -> BridgeResult<Option<CanonicalRecord>> {
        self.reader().get_entity_where(self.conn, self.scope(), filter)
    }

    fn get_entities_where(&self, filter: &Where) -> BridgeResult<Vec<CanonicalRecord>> {
        self.reader().get_entities_where(self.conn, self.scope(), filter)
    }

    fn transact(&self, steps: &[TxStep]) -> BridgeResult<TxReport> {
        self.engines.tx.transact(self.conn, self.app.app_id, self.attrs, steps)
    }

    fn delete_entity(&self, lookup: Lookup) -> BridgeResult<Option<CanonicalRecord>> {
        mutation::delete_entity(self.conn, self.engines.tx.as_ref(), self.scope(), lookup)
    }
}

/// What a triples-path write handler may do; everything runs in the call's transaction
pub struct WriteCapabilities<'a> {
    bound: Bound<'a>,
}

impl WriteCapabilities<'_> {
    pub fn app(&self) -> &AppMigrationState {
        self.bound.app
    }

    pub fn attrs(&self) -> &Attrs {
        self.bound.attrs
    }

    /// Attribute id for a label on the bound etype
    pub fn resolve_id(&self, label: &str) -> BridgeResult<AttrId> {
        self.bound.resolve_id(label)
    }

    /// Apply write-steps as given
    pub fn transact(&self, steps: &[TxStep]) -> BridgeResult<TxReport> {
        self.bound.transact(steps)
    }

    pub fn get_entity(&self, id: EntityId) -> BridgeResult<Option<CanonicalRecord>> {
        self.bound.get_entity(id)
    }

    pub fn get_entity_where(&self, filter: &Where) -> BridgeResult<Option<CanonicalRecord>> {
        self.bound.get_entity_where(filter)
    }

    pub fn get_entities_where(&self, filter: &Where) -> BridgeResult<Vec<CanonicalRecord>> {
        self.bound.get_entities_where(filter)
    }

    /// Delete by id or unique value; returns the removed record
    pub fn delete_entity(&self, lookup: impl Into<Lookup>) -> BridgeResult<Option<CanonicalRecord>> {
        self.bound.delete_entity(lookup.into())
    }
}

/// What a triples-path read handler may do; no transaction or lock is held
pub struct ReadCapabilities<'a> {
    bound: Bound<'a>,
}

impl ReadCapabilities<'_> {
    pub fn app(&self) -> &AppMigrationState {
        self.bound.app
    }

    pub fn attrs(&self) -> &Attrs {
        self.bound.attrs
    }

    pub fn resolve_id(&self, label: &str) -> BridgeResult<AttrId> {
        self.bound.resolve_id(label)
    }

    /// Apply write-steps on the pooled connection; each statement commits on its own
    pub fn transact(&self, steps: &[TxStep]) -> BridgeResult<TxReport> {
        self.bound.transact(steps)
    }

    pub fn get_entity(&self, id: EntityId) -> BridgeResult<Option<CanonicalRecord>> {
        self.bound.get_entity(id)
    }

    pub fn get_entity_where(&self, filter: &Where) -> BridgeResult<Option<CanonicalRecord>> {
        self.bound.get_entity_where(filter)
    }

    pub fn get_entities_where(&self, filter: &Where) -> BridgeResult<Vec<CanonicalRecord>> {
        self.bound.get_entities_where(filter)
    }

    pub fn delete_entity(&self, lookup: impl Into<Lookup>) -> BridgeResult<Option<CanonicalRecord>> {
        self.bound.delete_entity(lookup.into())
    }

    /// Raw structured query; returns the engine's nested object tree
    pub fn admin_query(&self, form: &InstaqlForm) -> BridgeResult<serde_json::Value> {
        let b = &self.bound;
        b.engines.instaql.query_tree(b.conn, b.app.app_id, b.attrs, form)
    }
}

/// Entry point for call sites that must work in both representations
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<SqliteStore>,
    engines: Engines,
    gate: MigrationGate,
}

impl Dispatcher {
    /// Use `store` as the connection pool and for every engine
    pub fn new(store: Arc<SqliteStore>, window: Arc<dyn MigrationWindow>) -> Self {
        let engines = Engines::from_backend(store.clone(), window);
        Self::with_engines(store, engines)
    }

    pub fn with_engines(store: Arc<SqliteStore>, engines: Engines) -> Self {
        let gate = MigrationGate::new(engines.apps.clone(), engines.window.clone());
        Self {
            store,
            engines,
            gate,
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn gate(&self) -> &MigrationGate {
        &self.gate
    }

    /// Write path: resolve the app and run one handler, all in one transaction.
    ///
    /// The transaction commits only when the handler succeeds.
    pub fn update_op<R, L, T>(&self, op: Operation<L, T>) -> BridgeResult<R>
    where
        L: FnOnce(&StoreTx<'_>) -> BridgeResult<R>,
        T: FnOnce(&WriteCapabilities<'_>) -> BridgeResult<R>,
    {
        let mut conn = self.store.connection()?;
        let tx = self.store.begin(&mut conn)?;
        let app = self.gate.resolve_app(&tx, op.app_id)?;

        let out = match app.representation() {
            Representation::Legacy => {
                tracing::debug!(app_id = %app.app_id, etype = %op.etype, "update via legacy tables");
                (op.legacy)(&tx)?
            }
            Representation::Triples => {
                tracing::debug!(app_id = %app.app_id, etype = %op.etype, "update via triples");
                let attrs = self.engines.catalog.get_by_app_id(&tx, app.app_id)?;
                let caps = WriteCapabilities {
                    bound: Bound {
                        conn: &tx,
                        app: &app,
                        attrs: &attrs,
                        etype: &op.etype,
                        engines: &self.engines,
                    },
                };
                (op.triples)(&caps)?
            }
        };

        tx.commit()?;
        Ok(out)
    }

    /// Read path: same branching, straight on the pooled connection.
    ///
    /// Multi-query reads may observe different snapshots under concurrent writes.
    pub fn query_op<R, L, T>(&self, op: Operation<L, T>) -> BridgeResult<R>
    where
        L: FnOnce(&Connection) -> BridgeResult<R>,
        T: FnOnce(&ReadCapabilities<'_>) -> BridgeResult<R>,
    {
        let conn = self.store.connection()?;
        let app = self.gate.resolve_app(&*conn, op.app_id)?;

        match app.representation() {
            Representation::Legacy => {
                tracing::debug!(app_id = %app.app_id, etype = %op.etype, "query via legacy tables");
                (op.legacy)(&*conn)
            }
            Representation::Triples => {
                tracing::debug!(app_id = %app.app_id, etype = %op.etype, "query via triples");
                let attrs = self.engines.catalog.get_by_app_id(&conn, app.app_id)?;
                let caps = ReadCapabilities {
                    bound: Bound {
                        conn: &conn,
                        app: &app,
                        attrs: &attrs,
                        etype: &op.etype,
                        engines: &self.engines,
                    },
                };
                (op.triples)(&caps)
            }
        }
    }

    /// Switch an app's representation under its advisory lock
    pub fn cutover(&self, app_id: AppId, users_in_triples: bool) -> BridgeResult<AppMigrationState> {
        let mut conn = self.store.connection()?;
        let tx = self.store.begin(&mut conn)?;
        let state = self.gate.set_users_in_triples(&tx, app_id, users_in_triples)?;
        tx.commit()?;
        Ok(state)
    }
}
