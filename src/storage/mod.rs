//! Storage backend for the bridge
//!
//! `SqliteStore` holds apps, the attribute catalog and triples in one SQLite
//! database and implements every service in [`crate::engine`].

mod engines;
mod sqlite;

pub use sqlite::{Executor, SqliteStore, StoreTx};
