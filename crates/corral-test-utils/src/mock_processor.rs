// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock processor adapter for deterministic testing.
//!
//! `MockProcessor` implements `ProcessorAdapter` with scripted outcomes,
//! enabling fast, CI-runnable tests of the retry and stuck-detection paths
//! without a real backend.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use corral_core::traits::adapter::PluginAdapter;
use corral_core::traits::processor::{HeartbeatSink, ProcessorAdapter};
use corral_core::types::{AdapterType, CombinedInput, HealthStatus, ProcessOutput};
use corral_core::CoordinatorError;

/// Scripted result for one `execute` call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return this content.
    Success(String),
    /// Fail with a processing error carrying this message.
    Failure(String),
    /// Never return; exercises the stuck detector. The call beats the
    /// heartbeat sink once on entry, then goes silent.
    Hang,
}

/// A mock processor that pops outcomes from a FIFO queue.
///
/// When the queue is empty, a default `"mock output"` success is returned.
/// Every call beats the heartbeat sink once before resolving, captures its
/// input, and signals `started` so tests can sequence against attempts.
pub struct MockProcessor {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    inputs: Mutex<Vec<CombinedInput>>,
    started: Notify,
}

impl MockProcessor {
    /// Create a mock processor with an empty outcome queue.
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            inputs: Mutex::new(Vec::new()),
            started: Notify::new(),
        }
    }

    /// Create a mock processor pre-loaded with the given outcomes.
    pub fn with_outcomes(outcomes: Vec<MockOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::from(outcomes)),
            inputs: Mutex::new(Vec::new()),
            started: Notify::new(),
        }
    }

    /// Add an outcome to the end of the queue.
    pub async fn add_outcome(&self, outcome: MockOutcome) {
        self.outcomes.lock().await.push_back(outcome);
    }

    /// All inputs `execute` has been called with, in call order.
    pub async fn inputs(&self) -> Vec<CombinedInput> {
        self.inputs.lock().await.clone()
    }

    /// Number of `execute` calls so far.
    pub async fn call_count(&self) -> usize {
        self.inputs.lock().await.len()
    }

    /// Wait until the next `execute` call begins. One pending start is
    /// buffered, so signalling before the wait is not lost.
    pub async fn wait_for_start(&self) {
        self.started.notified().await;
    }

    async fn next_outcome(&self) -> MockOutcome {
        self.outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| MockOutcome::Success("mock output".to_string()))
    }
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProcessor {
    fn name(&self) -> &str {
        "mock-processor"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Processor
    }

    async fn health_check(&self) -> Result<HealthStatus, CoordinatorError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CoordinatorError> {
        Ok(())
    }
}

#[async_trait]
impl ProcessorAdapter for MockProcessor {
    async fn execute(
        &self,
        input: &CombinedInput,
        heartbeat: Arc<dyn HeartbeatSink>,
    ) -> Result<ProcessOutput, CoordinatorError> {
        self.inputs.lock().await.push(input.clone());
        self.started.notify_one();
        heartbeat.beat().await;

        match self.next_outcome().await {
            MockOutcome::Success(content) => Ok(ProcessOutput {
                content,
                tool_calls: None,
            }),
            MockOutcome::Failure(message) => Err(CoordinatorError::Processing {
                message,
                source: None,
            }),
            MockOutcome::Hang => std::future::pending().await,
        }
    }
}
