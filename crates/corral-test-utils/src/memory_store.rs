// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `BatchStore` for coordinator tests that don't need SQLite.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use corral_core::traits::adapter::PluginAdapter;
use corral_core::traits::store::BatchStore;
use corral_core::types::{AdapterType, BatchRecord, BatchStatus, ConversationKey, HealthStatus};
use corral_core::CoordinatorError;

/// HashMap-backed batch store with the same contract as the SQLite one,
/// including the batch-id guard on heartbeat touches. Save failures can be
/// injected to exercise storage error paths.
pub struct MemoryBatchStore {
    records: Mutex<HashMap<String, BatchRecord>>,
    fail_saves: Mutex<bool>,
}

impl MemoryBatchStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            fail_saves: Mutex::new(false),
        }
    }

    /// Make subsequent saves fail with a storage error.
    pub async fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().await = fail;
    }

    /// Snapshot of the stored record for a key.
    pub async fn record(&self, key: &ConversationKey) -> Option<BatchRecord> {
        self.records.lock().await.get(key.as_str()).cloned()
    }
}

impl Default for MemoryBatchStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MemoryBatchStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, CoordinatorError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CoordinatorError> {
        Ok(())
    }
}

#[async_trait]
impl BatchStore for MemoryBatchStore {
    async fn initialize(&self) -> Result<(), CoordinatorError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), CoordinatorError> {
        Ok(())
    }

    async fn load(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<BatchRecord>, CoordinatorError> {
        Ok(self.records.lock().await.get(key.as_str()).cloned())
    }

    async fn save(
        &self,
        key: &ConversationKey,
        record: &BatchRecord,
    ) -> Result<(), CoordinatorError> {
        if *self.fail_saves.lock().await {
            return Err(CoordinatorError::Storage {
                source: "injected save failure".into(),
            });
        }
        self.records
            .lock()
            .await
            .insert(key.as_str().to_string(), record.clone());
        Ok(())
    }

    async fn touch_heartbeat(
        &self,
        key: &ConversationKey,
        batch_id: &str,
        at_ms: i64,
    ) -> Result<(), CoordinatorError> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(key.as_str())
            && record.batch_id.as_deref() == Some(batch_id)
        {
            record.last_heartbeat = Some(at_ms);
        }
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<ConversationKey>, CoordinatorError> {
        let records = self.records.lock().await;
        let mut keys: Vec<String> = records
            .iter()
            .filter(|(_, r)| r.status != BatchStatus::Idle)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys.into_iter().map(ConversationKey).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn heartbeat_touch_respects_batch_id_guard() {
        let store = MemoryBatchStore::new();
        let key = ConversationKey::from("k");
        let record = BatchRecord {
            status: BatchStatus::Processing,
            batch_id: Some("batch-a".to_string()),
            last_heartbeat: Some(1_000),
            ..Default::default()
        };
        store.save(&key, &record).await.unwrap();

        store.touch_heartbeat(&key, "batch-b", 9_000).await.unwrap();
        assert_eq!(
            store.record(&key).await.unwrap().last_heartbeat,
            Some(1_000)
        );

        store.touch_heartbeat(&key, "batch-a", 9_000).await.unwrap();
        assert_eq!(
            store.record(&key).await.unwrap().last_heartbeat,
            Some(9_000)
        );
    }

    #[tokio::test]
    async fn injected_save_failure_surfaces() {
        let store = MemoryBatchStore::new();
        store.set_fail_saves(true).await;
        let result = store
            .save(&ConversationKey::from("k"), &BatchRecord::default())
            .await;
        assert!(matches!(result, Err(CoordinatorError::Storage { .. })));
    }
}
