// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the BatchStore trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use corral_config::model::StorageConfig;
use corral_core::types::{BatchRecord, ConversationKey};
use corral_core::{AdapterType, BatchStore, CoordinatorError, HealthStatus, PluginAdapter};

use crate::database::Database;
use crate::queries;

/// SQLite-backed batch store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`BatchStore::initialize`].
pub struct SqliteBatchStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteBatchStore {
    /// Create a new SqliteBatchStore with the given configuration.
    ///
    /// The database connection is not opened until [`BatchStore::initialize`]
    /// is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, CoordinatorError> {
        self.db.get().ok_or_else(|| CoordinatorError::Storage {
            source: "store not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteBatchStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, CoordinatorError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CoordinatorError> {
        // Shutdown delegates to close if the DB was initialized.
        if let Some(db) = self.db.get() {
            db.close().await?;
            debug!("shutdown: database closed");
        }
        Ok(())
    }
}

#[async_trait]
impl BatchStore for SqliteBatchStore {
    async fn initialize(&self) -> Result<(), CoordinatorError> {
        let path = self.config.database_path.clone();
        let db = Database::open(&path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| CoordinatorError::Storage {
            source: "store already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite batch store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), CoordinatorError> {
        self.db()?.close().await
    }

    async fn load(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<BatchRecord>, CoordinatorError> {
        queries::batches::load(self.db()?, key).await
    }

    async fn save(
        &self,
        key: &ConversationKey,
        record: &BatchRecord,
    ) -> Result<(), CoordinatorError> {
        queries::batches::save(self.db()?, key, record).await
    }

    async fn touch_heartbeat(
        &self,
        key: &ConversationKey,
        batch_id: &str,
        at_ms: i64,
    ) -> Result<(), CoordinatorError> {
        queries::batches::touch_heartbeat(self.db()?, key, batch_id, at_ms).await
    }

    async fn list_active(&self) -> Result<Vec<ConversationKey>, CoordinatorError> {
        queries::batches::list_active(self.db()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::types::{BatchStatus, PendingMessage};
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    fn msg(request_id: &str) -> PendingMessage {
        PendingMessage {
            text: "hello".to_string(),
            received_at: 1_000,
            request_id: request_id.to_string(),
            user_id: None,
            conversation_id: None,
            original_context: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn store_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = SqliteBatchStore::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.version(), semver::Version::new(0, 1, 0));
        assert_eq!(store.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let store = SqliteBatchStore::new(make_config(db_path.to_str().unwrap()));

        store.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let store = SqliteBatchStore::new(make_config(db_path.to_str().unwrap()));

        store.initialize().await.unwrap();
        let result = store.initialize().await;
        assert!(result.is_err(), "second initialize should fail");
    }

    #[tokio::test]
    async fn health_check_fails_when_not_initialized() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let store = SqliteBatchStore::new(make_config(db_path.to_str().unwrap()));

        let result = store.health_check().await;
        assert!(result.is_err(), "health_check should fail before initialize");
    }

    #[tokio::test]
    async fn disabled_wal_mode_reaches_the_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_wal.db");
        let store = SqliteBatchStore::new(StorageConfig {
            database_path: db_path.to_str().unwrap().to_string(),
            wal_mode: false,
        });
        store.initialize().await.unwrap();

        let key = ConversationKey::from("k");
        store.save(&key, &BatchRecord::default()).await.unwrap();
        assert!(store.load(&key).await.unwrap().is_some());

        // A rollback-journal database never grows a -wal sidecar.
        assert!(!db_path.with_extension("db-wal").exists());

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn full_record_lifecycle_through_store() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lifecycle.db");
        let store = SqliteBatchStore::new(make_config(db_path.to_str().unwrap()));
        store.initialize().await.unwrap();

        let key = ConversationKey::from("discord:99");
        assert!(store.load(&key).await.unwrap().is_none());

        let record = BatchRecord {
            status: BatchStatus::Collecting,
            pending: vec![msg("req-1")],
            last_message_at: Some(1_000),
            collecting_started_at: Some(1_000),
            ..Default::default()
        };
        store.save(&key, &record).await.unwrap();

        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded, record);

        let active = store.list_active().await.unwrap();
        assert_eq!(active, vec![key.clone()]);

        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);

        store.close().await.unwrap();
        store.shutdown().await.unwrap();
    }
}
