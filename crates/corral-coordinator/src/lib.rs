// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batching and retry coordination for conversational message streams.
//!
//! The [`Coordinator`] is the public entry point. It:
//! - Admits inbound messages with request-id dedup
//! - Coalesces bursts into batches via a sliding window with a ceiling
//! - Drives each batch through the processor with bounded retry backoff
//! - Aborts and retries in-flight work that stops heartbeating
//! - Persists every record transition and recovers non-idle keys on startup

pub mod admission;
pub mod executor;
pub mod retry;
pub mod scheduler;
pub mod stuck;
mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use corral_config::model::CorralConfig;
use corral_core::types::{Admission, ConversationKey, PendingMessage};
use corral_core::{BatchStore, CoordinatorError, ProcessorAdapter, TransportAdapter};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::worker::{Command, WorkerHandle};

/// The batching coordinator: one worker task per conversation key.
///
/// Workers are spawned on demand and keyed in a map; all record transitions
/// for a key happen inside its worker. Keys are fully independent.
pub struct Coordinator {
    config: CorralConfig,
    store: Arc<dyn BatchStore>,
    processor: Arc<dyn ProcessorAdapter>,
    transport: Arc<dyn TransportAdapter>,
    workers: Mutex<HashMap<String, WorkerHandle>>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a new coordinator over the given adapters.
    ///
    /// The store must already be initialized.
    pub fn new(
        config: CorralConfig,
        store: Arc<dyn BatchStore>,
        processor: Arc<dyn ProcessorAdapter>,
        transport: Arc<dyn TransportAdapter>,
    ) -> Self {
        info!(
            window_ms = config.batch.window_ms,
            max_window_ms = config.batch.max_window_ms,
            max_messages = config.batch.max_messages,
            "coordinator initialized"
        );

        Self {
            config,
            store,
            processor,
            transport,
            workers: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Admit a message for a conversation key.
    ///
    /// Returns [`Admission::Duplicate`] when the request id matches a live
    /// message for the key; redelivery is expected under at-least-once
    /// transports and is not an error. Storage failures propagate.
    pub async fn admit(
        &self,
        key: &ConversationKey,
        message: PendingMessage,
    ) -> Result<Admission, CoordinatorError> {
        let tx = self.worker_sender(key).await?;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Command::Admit {
            message,
            reply: reply_tx,
        })
        .await
        .map_err(|_| {
            CoordinatorError::Internal(format!("worker for key {key} is no longer running"))
        })?;

        reply_rx.await.map_err(|_| {
            CoordinatorError::Internal(format!("worker for key {key} dropped the reply"))
        })?
    }

    /// Spawn workers for every non-idle record in the store.
    ///
    /// A recovered collecting record re-arms its window deadline; a
    /// processing record with no live execution is picked up by the stuck
    /// path once its persisted heartbeat expires. Returns the number of keys
    /// recovered.
    pub async fn recover(&self) -> Result<usize, CoordinatorError> {
        let keys = self.store.list_active().await?;
        let count = keys.len();
        for key in keys {
            debug!(key = %key, "recovering conversation key");
            self.worker_sender(&key).await?;
        }
        if count > 0 {
            info!(keys = count, "recovered active conversation keys");
        }
        Ok(count)
    }

    /// Stop all workers, aborting in-flight executions, and close the store.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        info!("coordinator shutting down");
        self.cancel.cancel();

        let workers = {
            let mut map = self.workers.lock().await;
            std::mem::take(&mut *map)
        };
        for (key, handle) in workers {
            if let Err(e) = handle.join.await {
                warn!(key = %key, error = %e, "worker task did not stop cleanly");
            }
        }

        self.store.close().await
    }

    /// Resolve the worker for a key, spawning it (with its record loaded
    /// from the store) on first use.
    async fn worker_sender(
        &self,
        key: &ConversationKey,
    ) -> Result<mpsc::Sender<Command>, CoordinatorError> {
        let mut workers = self.workers.lock().await;
        if let Some(handle) = workers.get(key.as_str()) {
            return Ok(handle.tx.clone());
        }

        // Load before spawn so a storage failure surfaces to the caller.
        let record = self.store.load(key).await?.unwrap_or_default();
        let handle = worker::spawn(
            key.clone(),
            record,
            Arc::clone(&self.store),
            Arc::clone(&self.processor),
            Arc::clone(&self.transport),
            self.config.clone(),
            self.cancel.child_token(),
        );
        let tx = handle.tx.clone();
        workers.insert(key.as_str().to_string(), handle);
        debug!(key = %key, "worker spawned");
        Ok(tx)
    }
}
