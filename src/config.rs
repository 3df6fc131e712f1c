//! YAML configuration for the bridge and its CLI

use crate::engine::MigrationWindow;
use crate::error::{BridgeError, BridgeResult};
use crate::model::AppId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level configuration file
///
/// ```yaml
/// database: /var/lib/sysbridge/bridge.db
/// log_filter: sysbridge=debug
/// migration_window:
///   apps:
///     - 6f1b2c4e-0a6d-4d1e-9d2c-3b9a7c5e1f00
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Path to the SQLite database; the CLI falls back to the data dir
    pub database: Option<PathBuf>,
    /// `tracing-subscriber` env-filter directive
    pub log_filter: Option<String>,
    pub migration_window: StaticMigrationWindow,
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> BridgeResult<Self> {
        serde_yaml::from_str(raw).map_err(|e| BridgeError::Config(e.to_string()))
    }
}

/// Apps currently inside their migration window, fixed at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticMigrationWindow {
    apps: HashSet<AppId>,
}

impl StaticMigrationWindow {
    pub fn with_app(mut self, app_id: AppId) -> Self {
        self.apps.insert(app_id);
        self
    }
}

impl MigrationWindow for StaticMigrationWindow {
    fn in_migration(&self, app_id: AppId) -> bool {
        self.apps.contains(&app_id)
    }
}
