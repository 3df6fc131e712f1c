//! Shared fixtures for the integration tests

#![allow(dead_code)]

use serde_json::json;
use std::sync::Arc;
use sysbridge::model::system_attributes;
use sysbridge::{
    AppId, Dispatcher, EntityId, Lookup, Operation, SqliteStore, StaticMigrationWindow, TxStep,
};

pub const OAUTH_CLIENTS: &str = "$oauthClients";
pub const OAUTH_PROVIDERS: &str = "$oauthProviders";
pub const USERS: &str = "$users";

/// A dispatcher over a store with one app carrying the system catalog
pub struct Harness {
    pub bridge: Dispatcher,
    pub app_id: AppId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_window(|_| StaticMigrationWindow::default())
    }

    /// Build the migration window once the app id is known
    pub fn with_window(window: impl FnOnce(AppId) -> StaticMigrationWindow) -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        Self::on_store(store, window)
    }

    pub fn on_store(
        store: Arc<SqliteStore>,
        window: impl FnOnce(AppId) -> StaticMigrationWindow,
    ) -> Self {
        let app_id = store.create_app("test-app").unwrap();
        store.add_attrs(app_id, &system_attributes()).unwrap();
        let bridge = Dispatcher::new(store, Arc::new(window(app_id)));
        Self { bridge, app_id }
    }

    /// A harness whose app already stores system entities as triples
    pub fn migrated() -> Self {
        let h = Self::new();
        h.bridge.cutover(h.app_id, true).unwrap();
        h
    }

    /// Insert an entity of `etype` with the given forward labels, via the write path
    pub fn insert(&self, etype: &str, fields: &[(&str, serde_json::Value)]) -> EntityId {
        let id = EntityId::new();
        self.bridge
            .update_op(Operation::write(
                self.app_id,
                etype,
                |_tx| panic!("app is not migrated"),
                |caps| {
                    let mut steps = vec![TxStep::AddTriple {
                        entity: Lookup::id(id),
                        attr_id: caps.resolve_id("id")?,
                        value: json!(id.to_string()),
                    }];
                    for (label, value) in fields {
                        steps.push(TxStep::AddTriple {
                            entity: Lookup::id(id),
                            attr_id: caps.resolve_id(label)?,
                            value: value.clone(),
                        });
                    }
                    caps.transact(&steps)
                },
            ))
            .unwrap();
        id
    }

    pub fn provider(&self, name: &str) -> EntityId {
        self.insert(OAUTH_PROVIDERS, &[("name", json!(name))])
    }

    pub fn client(&self, provider: EntityId, client_id: &str, name: &str) -> EntityId {
        self.insert(
            OAUTH_CLIENTS,
            &[
                ("$oauthProvider", json!(provider.to_string())),
                ("clientId", json!(client_id)),
                ("name", json!(name)),
                ("encryptedClientSecret", json!("c0ffee")),
                ("discoveryEndpoint", json!("https://accounts.example.com/.well-known")),
            ],
        )
    }
}
