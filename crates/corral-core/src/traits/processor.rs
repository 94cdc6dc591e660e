// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Processor adapter trait for the opaque batch-processing step.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoordinatorError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CombinedInput, ProcessOutput};

/// Liveness channel handed to long-running processing work.
///
/// Implementations forward each beat to the batch record's heartbeat
/// timestamp; work that never beats is presumed stuck once the heartbeat age
/// limit passes and is aborted and retried.
#[async_trait]
pub trait HeartbeatSink: Send + Sync + 'static {
    /// Signals that the in-flight work is still making progress.
    async fn beat(&self);
}

/// Adapter for the external processing step (typically an LLM or agent turn).
///
/// The coordinator treats `execute` as an opaque async operation: it may take
/// seconds to minutes, it may fail transiently, and it may hang. Retries
/// re-invoke it with a byte-identical input.
#[async_trait]
pub trait ProcessorAdapter: PluginAdapter {
    /// Runs the processing step for one combined batch.
    ///
    /// Long-running implementations should beat the sink periodically;
    /// otherwise the stuck detector aborts them after the configured
    /// heartbeat age.
    async fn execute(
        &self,
        input: &CombinedInput,
        heartbeat: Arc<dyn HeartbeatSink>,
    ) -> Result<ProcessOutput, CoordinatorError>;
}
