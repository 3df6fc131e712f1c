//! Interfaces to the external collaborators the bridge calls through.
//!
//! Every service takes the connection to run on, so that the write path can
//! hand in its transaction and the read path a plain pool connection.
//! `storage::SqliteStore` implements all of them.

use crate::error::BridgeResult;
use crate::model::{AppId, AppMigrationState, Attrs, EntityId, Triple, TxReport, TxStep};
use crate::query::{InstaqlForm, QueryNode};
use rusqlite::Connection;
use std::sync::Arc;

/// Attribute catalog lookup
pub trait AttrCatalog: Send + Sync {
    fn get_by_app_id(&self, conn: &Connection, app_id: AppId) -> BridgeResult<Attrs>;
}

/// Low-level triple matching
pub trait DatalogEngine: Send + Sync {
    /// All triples of `entity_id` whose attribute belongs to `etype`
    fn fetch_entity_triples(
        &self,
        conn: &Connection,
        app_id: AppId,
        attrs: &Attrs,
        etype: &str,
        entity_id: EntityId,
    ) -> BridgeResult<Vec<Triple>>;
}

/// Structured (InstaQL) query execution
pub trait InstaqlEngine: Send + Sync {
    /// Run a query and return the raw result tree
    fn query(
        &self,
        conn: &Connection,
        app_id: AppId,
        attrs: &Attrs,
        form: &InstaqlForm,
    ) -> BridgeResult<Vec<QueryNode>>;

    /// Run a query and reconstruct the nested object tree
    fn query_tree(
        &self,
        conn: &Connection,
        app_id: AppId,
        attrs: &Attrs,
        form: &InstaqlForm,
    ) -> BridgeResult<serde_json::Value>;
}

/// Ordered write-step application
pub trait TransactionEngine: Send + Sync {
    fn transact(
        &self,
        conn: &Connection,
        app_id: AppId,
        attrs: &Attrs,
        steps: &[TxStep],
    ) -> BridgeResult<TxReport>;
}

/// App rows and their migration flag
pub trait AppDirectory: Send + Sync {
    fn get_app(&self, conn: &Connection, app_id: AppId) -> BridgeResult<Option<AppMigrationState>>;

    /// Returns whether a row was updated
    fn set_users_in_triples(
        &self,
        conn: &Connection,
        app_id: AppId,
        users_in_triples: bool,
    ) -> BridgeResult<bool>;
}

/// Is an app currently inside its migration window?
pub trait MigrationWindow: Send + Sync {
    fn in_migration(&self, app_id: AppId) -> bool;
}

/// The full set of services a dispatcher needs
#[derive(Clone)]
pub struct Engines {
    pub apps: Arc<dyn AppDirectory>,
    pub window: Arc<dyn MigrationWindow>,
    pub catalog: Arc<dyn AttrCatalog>,
    pub datalog: Arc<dyn DatalogEngine>,
    pub instaql: Arc<dyn InstaqlEngine>,
    pub tx: Arc<dyn TransactionEngine>,
}

impl Engines {
    /// Use one backend for every storage-facing service
    pub fn from_backend<B>(backend: Arc<B>, window: Arc<dyn MigrationWindow>) -> Self
    where
        B: AppDirectory + AttrCatalog + DatalogEngine + InstaqlEngine + TransactionEngine + 'static,
    {
        Self {
            apps: backend.clone(),
            window,
            catalog: backend.clone(),
            datalog: backend.clone(),
            instaql: backend.clone(),
            tx: backend,
        }
    }
}
