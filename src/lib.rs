//! Sysbridge: system entities across a live per-app schema migration
//!
//! System entities (users, OAuth providers, OAuth clients, and their codes
//! and links) are moving from fixed-column tables to the generic triple
//! store, one app at a time. This crate lets call sites keep a single code
//! path while that happens.
//!
//! # Core Concepts
//!
//! - **MigrationGate**: decides per app which representation is authoritative,
//!   holding the app's advisory lock while its flag may be flipping
//! - **Codec**: turns one entity's triples into the legacy row shape
//! - **Dispatcher**: runs a legacy handler or hands a triples handler a bundle
//!   of operations bound to the app, its attribute catalog and one etype
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sysbridge::{Dispatcher, Operation, SqliteStore, StaticMigrationWindow};
//!
//! let store = Arc::new(SqliteStore::open_in_memory().unwrap());
//! let app_id = store.create_app("demo").unwrap();
//! let bridge = Dispatcher::new(store, Arc::new(StaticMigrationWindow::default()));
//!
//! let path = bridge
//!     .query_op(Operation::read(app_id, "$users", |_conn| Ok("legacy"), |_caps| Ok("triples")))
//!     .unwrap();
//! assert_eq!(path, "legacy");
//! ```

pub mod attrs;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod gate;
pub mod model;
pub mod mutation;
pub mod query;
pub mod storage;

pub use config::{BridgeConfig, StaticMigrationWindow};
pub use dispatch::{Dispatcher, Operation, ReadCapabilities, WriteCapabilities};
pub use engine::{Engines, MigrationWindow};
pub use error::{BridgeError, BridgeResult};
pub use gate::MigrationGate;
pub use model::{
    AppId, AppMigrationState, AttrId, Attribute, Attrs, CanonicalRecord, EntityId, FieldValue,
    Lookup, Representation, SystemEtype, Triple, TxReport, TxStep,
};
pub use query::{InstaqlForm, Where};
pub use storage::{Executor, SqliteStore, StoreTx};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
