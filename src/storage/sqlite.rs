//! SQLite storage backend: apps, attribute catalog, and triples

use crate::error::{BridgeError, BridgeResult};
use crate::gate::{AdvisoryLockGuard, AdvisoryLocks};
use crate::model::{AppId, AttrId, Attribute, EntityId, Ident, Triple};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use std::cell::RefCell;
use std::ops::Deref;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Anything the bridge can run queries on: a plain connection or a transaction
pub trait Executor {
    fn connection(&self) -> &Connection;

    /// Take the advisory lock `key` until the enclosing transaction ends.
    ///
    /// Returns `false` when there is no transaction to scope the lock to.
    fn advisory_xact_lock(&self, key: i64) -> BridgeResult<bool>;
}

impl Executor for Connection {
    fn connection(&self) -> &Connection {
        self
    }

    fn advisory_xact_lock(&self, _key: i64) -> BridgeResult<bool> {
        Ok(false)
    }
}

/// A write transaction together with the advisory locks it holds.
///
/// Locks are released after the transaction commits or rolls back.
pub struct StoreTx<'c> {
    tx: Transaction<'c>,
    locks: Arc<AdvisoryLocks>,
    held: RefCell<Vec<AdvisoryLockGuard>>,
}

impl<'c> StoreTx<'c> {
    pub fn commit(self) -> BridgeResult<()> {
        let StoreTx { tx, held, .. } = self;
        tx.commit()?;
        drop(held);
        Ok(())
    }

    pub fn rollback(self) -> BridgeResult<()> {
        let StoreTx { tx, held, .. } = self;
        tx.rollback()?;
        drop(held);
        Ok(())
    }

    pub fn holds_lock(&self, key: i64) -> bool {
        self.held.borrow().iter().any(|g| g.key() == key)
    }
}

impl Deref for StoreTx<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.tx
    }
}

impl Executor for StoreTx<'_> {
    fn connection(&self) -> &Connection {
        &self.tx
    }

    fn advisory_xact_lock(&self, key: i64) -> BridgeResult<bool> {
        if self.holds_lock(key) {
            return Ok(true);
        }
        let guard = self.locks.acquire(key)?;
        self.held.borrow_mut().push(guard);
        Ok(true)
    }
}

/// SQLite-backed store for apps, attributes and triples
///
/// Thread-safe via internal mutex on the connection. Advisory locks live in a
/// registry that several stores on the same file can share.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    locks: Arc<AdvisoryLocks>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> BridgeResult<Self> {
        Self::open_with_locks(path, AdvisoryLocks::new())
    }

    /// Open a store that shares an advisory lock registry with other stores
    pub fn open_with_locks(path: impl AsRef<Path>, locks: Arc<AdvisoryLocks>) -> BridgeResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            locks,
        })
    }

    /// Create an in-memory store (useful for testing)
    pub fn open_in_memory() -> BridgeResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            locks: AdvisoryLocks::new(),
        })
    }

    fn init_schema(conn: &Connection) -> BridgeResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS apps (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                users_in_triples INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS attrs (
                id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL,
                fwd_etype TEXT NOT NULL,
                fwd_label TEXT NOT NULL,
                rev_etype TEXT,
                rev_label TEXT,
                is_unique INTEGER NOT NULL DEFAULT 0,
                is_indexed INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (app_id) REFERENCES apps(id) ON DELETE CASCADE
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_attrs_fwd
                ON attrs(app_id, fwd_etype, fwd_label);

            CREATE TABLE IF NOT EXISTS triples (
                app_id TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                attr_id TEXT NOT NULL,
                value_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (app_id, entity_id, attr_id, value_json),
                FOREIGN KEY (app_id) REFERENCES apps(id) ON DELETE CASCADE,
                FOREIGN KEY (attr_id) REFERENCES attrs(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_triples_attr_value
                ON triples(app_id, attr_id, value_json);

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    }

    /// Check out the pooled connection
    pub fn connection(&self) -> BridgeResult<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock()?)
    }

    /// Begin a write transaction on a checked-out connection
    pub fn begin<'c>(&self, conn: &'c mut Connection) -> BridgeResult<StoreTx<'c>> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(StoreTx {
            tx,
            locks: Arc::clone(&self.locks),
            held: RefCell::new(Vec::new()),
        })
    }

    pub fn locks(&self) -> &Arc<AdvisoryLocks> {
        &self.locks
    }

    // === Admin helpers ===

    /// Register a new app, stored in the legacy representation
    pub fn create_app(&self, title: &str) -> BridgeResult<AppId> {
        let app_id = AppId::new();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO apps (id, title, users_in_triples, created_at) VALUES (?1, ?2, 0, ?3)",
            params![app_id.to_string(), title, chrono::Utc::now().to_rfc3339()],
        )?;
        tracing::info!(%app_id, title, "created app");
        Ok(app_id)
    }

    /// Add attributes to an app's catalog
    pub fn add_attrs(&self, app_id: AppId, attrs: &[Attribute]) -> BridgeResult<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        for attr in attrs {
            insert_attr(&tx, app_id, attr)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Every app id, oldest first
    pub fn list_apps(&self) -> BridgeResult<Vec<AppId>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT id FROM apps ORDER BY created_at, id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let ids: BridgeResult<Vec<AppId>> = rows.map(|id| parse_uuid_col(&id?)).collect();
        ids
    }
}

pub(crate) fn insert_attr(conn: &Connection, app_id: AppId, attr: &Attribute) -> BridgeResult<()> {
    conn.execute(
        r#"
        INSERT INTO attrs (id, app_id, fwd_etype, fwd_label, rev_etype, rev_label, is_unique, is_indexed)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            attr.id.to_string(),
            app_id.to_string(),
            attr.forward.etype,
            attr.forward.label,
            attr.reverse.as_ref().map(|r| r.etype.clone()),
            attr.reverse.as_ref().map(|r| r.label.clone()),
            attr.unique,
            attr.indexed,
        ],
    )?;
    Ok(())
}

pub(crate) fn parse_uuid_col<T: FromStr<Err = uuid::Error>>(s: &str) -> BridgeResult<T> {
    T::from_str(s).map_err(|e| BridgeError::Engine(format!("corrupt id column {s:?}: {e}")))
}

pub(crate) fn row_to_attr(row: &Row<'_>) -> BridgeResult<Attribute> {
    let id: String = row.get(0)?;
    let rev_etype: Option<String> = row.get(3)?;
    let rev_label: Option<String> = row.get(4)?;
    Ok(Attribute {
        id: parse_uuid_col::<AttrId>(&id)?,
        forward: Ident::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
        reverse: rev_etype.zip(rev_label).map(|(e, l)| Ident::new(e, l)),
        unique: row.get(5)?,
        indexed: row.get(6)?,
    })
}

/// Columns: entity_id, attr_id, value_json, created_at
pub(crate) fn row_to_triple(row: &Row<'_>) -> BridgeResult<Triple> {
    let entity_id: String = row.get(0)?;
    let attr_id: String = row.get(1)?;
    let value_json: String = row.get(2)?;
    Ok(Triple {
        entity_id: parse_uuid_col::<EntityId>(&entity_id)?,
        attr_id: parse_uuid_col::<AttrId>(&attr_id)?,
        value: serde_json::from_str(&value_json)?,
        created_at: row.get(3)?,
    })
}
