// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch store trait for durable per-key batching state.

use async_trait::async_trait;

use crate::error::CoordinatorError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{BatchRecord, ConversationKey};

/// Durable storage for batch records, one record per conversation key.
///
/// The coordinator persists after every record transition; a restart must be
/// able to reconstruct all non-idle keys from this store alone.
#[async_trait]
pub trait BatchStore: PluginAdapter {
    /// Initializes the backend (migrations, connections).
    async fn initialize(&self) -> Result<(), CoordinatorError>;

    /// Closes the backend, flushing pending writes.
    async fn close(&self) -> Result<(), CoordinatorError>;

    /// Loads the record for a key. `None` when the key has never been seen.
    async fn load(&self, key: &ConversationKey)
        -> Result<Option<BatchRecord>, CoordinatorError>;

    /// Persists the full record for a key, replacing any existing row.
    async fn save(
        &self,
        key: &ConversationKey,
        record: &BatchRecord,
    ) -> Result<(), CoordinatorError>;

    /// Updates only `last_heartbeat`, and only while `batch_id` still matches.
    ///
    /// The guard makes a beat from superseded work a no-op, so processor
    /// heartbeats never race the worker's full-record saves.
    async fn touch_heartbeat(
        &self,
        key: &ConversationKey,
        batch_id: &str,
        at_ms: i64,
    ) -> Result<(), CoordinatorError>;

    /// Lists keys whose records are not idle. Drives startup recovery.
    async fn list_active(&self) -> Result<Vec<ConversationKey>, CoordinatorError>;
}
