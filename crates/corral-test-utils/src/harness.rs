// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end coordinator testing.
//!
//! `TestHarness` assembles a coordinator over mock adapters and an in-memory
//! store, with short real-time windows so integration tests run in
//! milliseconds.

use std::sync::Arc;

use corral_config::model::{BatchConfig, CorralConfig, HeartbeatConfig, RetryConfig};
use corral_core::types::{epoch_millis, Admission, ConversationKey, PendingMessage};
use corral_core::CoordinatorError;
use corral_coordinator::Coordinator;

use crate::memory_store::MemoryBatchStore;
use crate::mock_processor::{MockOutcome, MockProcessor};
use crate::mock_transport::MockTransport;

/// Builder for creating test coordinators with configurable windows.
pub struct TestHarnessBuilder {
    batch: BatchConfig,
    retry: RetryConfig,
    heartbeat: HeartbeatConfig,
    outcomes: Vec<MockOutcome>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        // Short windows keep tests fast while leaving generous margins
        // against scheduler jitter.
        Self {
            batch: BatchConfig {
                window_ms: 80,
                max_window_ms: 800,
                max_messages: 10,
            },
            retry: RetryConfig {
                initial_delay_ms: 50,
                backoff_multiplier: 2.0,
                max_delay_ms: 400,
                max_retries: 2,
            },
            heartbeat: HeartbeatConfig {
                max_heartbeat_age_ms: 300,
            },
            outcomes: Vec::new(),
        }
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Script the processor's outcomes.
    pub fn with_outcomes(mut self, outcomes: Vec<MockOutcome>) -> Self {
        self.outcomes = outcomes;
        self
    }

    pub fn build(self) -> TestHarness {
        let store = Arc::new(MemoryBatchStore::new());
        let processor = Arc::new(if self.outcomes.is_empty() {
            MockProcessor::new()
        } else {
            MockProcessor::with_outcomes(self.outcomes)
        });
        let transport = Arc::new(MockTransport::new());

        let config = CorralConfig {
            batch: self.batch,
            retry: self.retry,
            heartbeat: self.heartbeat,
            ..Default::default()
        };

        let coordinator = Coordinator::new(
            config.clone(),
            store.clone(),
            processor.clone(),
            transport.clone(),
        );

        TestHarness {
            coordinator,
            store,
            processor,
            transport,
            config,
        }
    }
}

/// A coordinator wired to mocks, plus handles to inspect them.
pub struct TestHarness {
    pub coordinator: Coordinator,
    pub store: Arc<MemoryBatchStore>,
    pub processor: Arc<MockProcessor>,
    pub transport: Arc<MockTransport>,
    pub config: CorralConfig,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Admit a message with the given request id for a key.
    pub async fn admit(
        &self,
        key: &str,
        request_id: &str,
        text: &str,
    ) -> Result<Admission, CoordinatorError> {
        self.coordinator
            .admit(
                &ConversationKey::from(key),
                PendingMessage {
                    text: text.to_string(),
                    received_at: epoch_millis(),
                    request_id: request_id.to_string(),
                    user_id: Some("user-1".to_string()),
                    conversation_id: Some(key.to_string()),
                    original_context: serde_json::json!({ "chat_id": key }),
                },
            )
            .await
    }
}
