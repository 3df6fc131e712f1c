//! Migration gate: decides which representation is authoritative for an app

mod lock;

pub use lock::{AdvisoryLockGuard, AdvisoryLocks};

use crate::engine::{AppDirectory, MigrationWindow};
use crate::error::{BridgeError, BridgeResult};
use crate::model::{AppId, AppMigrationState};
use crate::storage::{Executor, StoreTx};
use std::sync::Arc;

/// Resolves an app's migration state, serializing against cutover writers
#[derive(Clone)]
pub struct MigrationGate {
    apps: Arc<dyn AppDirectory>,
    window: Arc<dyn MigrationWindow>,
}

impl MigrationGate {
    pub fn new(apps: Arc<dyn AppDirectory>, window: Arc<dyn MigrationWindow>) -> Self {
        Self { apps, window }
    }

    /// Look up the app row.
    ///
    /// While the app is inside its migration window the app's advisory lock is
    /// taken first, so the flag cannot flip under the enclosing transaction.
    /// A plain connection takes no lock.
    pub fn resolve_app<E: Executor + ?Sized>(
        &self,
        conn: &E,
        app_id: AppId,
    ) -> BridgeResult<AppMigrationState> {
        if self.window.in_migration(app_id) {
            let locked = conn.advisory_xact_lock(app_id.advisory_key())?;
            tracing::debug!(%app_id, locked, "app in migration window");
        }

        self.apps
            .get_app(conn.connection(), app_id)?
            .ok_or(BridgeError::RecordNotFound(app_id))
    }

    /// Flip the app's migration flag under its advisory lock
    pub fn set_users_in_triples(
        &self,
        tx: &StoreTx<'_>,
        app_id: AppId,
        users_in_triples: bool,
    ) -> BridgeResult<AppMigrationState> {
        tx.advisory_xact_lock(app_id.advisory_key())?;

        if !self.apps.set_users_in_triples(tx, app_id, users_in_triples)? {
            return Err(BridgeError::RecordNotFound(app_id));
        }
        tracing::info!(%app_id, users_in_triples, "switched system entity representation");

        self.apps
            .get_app(tx, app_id)?
            .ok_or(BridgeError::RecordNotFound(app_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticMigrationWindow;
    use crate::model::Representation;
    use crate::storage::SqliteStore;

    fn gate(store: &Arc<SqliteStore>, window: StaticMigrationWindow) -> MigrationGate {
        MigrationGate::new(store.clone(), Arc::new(window))
    }

    #[test]
    fn unknown_app_is_record_not_found() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let gate = gate(&store, StaticMigrationWindow::default());
        let conn = store.connection().unwrap();

        let missing = AppId::new();
        let err = gate.resolve_app(&*conn, missing).unwrap_err();
        assert!(matches!(err, BridgeError::RecordNotFound(id) if id == missing));
    }

    #[test]
    fn lock_taken_only_inside_window() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let in_window = store.create_app("migrating").unwrap();
        let outside = store.create_app("steady").unwrap();
        let gate = gate(&store, StaticMigrationWindow::default().with_app(in_window));

        let mut conn = store.connection().unwrap();
        let tx = store.begin(&mut conn).unwrap();

        gate.resolve_app(&tx, outside).unwrap();
        assert!(!tx.holds_lock(outside.advisory_key()));

        let state = gate.resolve_app(&tx, in_window).unwrap();
        assert_eq!(state.representation(), Representation::Legacy);
        assert!(tx.holds_lock(in_window.advisory_key()));

        tx.commit().unwrap();
        assert!(!store.locks().is_held(in_window.advisory_key()));
    }

    #[test]
    fn cutover_flips_flag() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let app_id = store.create_app("demo").unwrap();
        let gate = gate(&store, StaticMigrationWindow::default());

        {
            let mut conn = store.connection().unwrap();
            let tx = store.begin(&mut conn).unwrap();
            let state = gate.set_users_in_triples(&tx, app_id, true).unwrap();
            assert!(state.users_in_triples);
            tx.commit().unwrap();
        }

        let conn = store.connection().unwrap();
        let state = gate.resolve_app(&*conn, app_id).unwrap();
        assert_eq!(state.representation(), Representation::Triples);
    }

    #[test]
    fn cutover_rolled_back_keeps_legacy() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let app_id = store.create_app("demo").unwrap();
        let gate = gate(&store, StaticMigrationWindow::default());

        {
            let mut conn = store.connection().unwrap();
            let tx = store.begin(&mut conn).unwrap();
            gate.set_users_in_triples(&tx, app_id, true).unwrap();
            tx.rollback().unwrap();
        }

        let conn = store.connection().unwrap();
        assert!(!gate.resolve_app(&*conn, app_id).unwrap().users_in_triples);
    }
}
