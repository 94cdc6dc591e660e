// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation-key worker actor.
//!
//! All record transitions for a key happen inside its worker, so the key has
//! exactly one writer. The run loop is a single `tokio::select!` over the
//! command mailbox, the in-flight execution handle, one computed wake
//! deadline, and the shutdown token. Stale timers are harmless: every wake
//! re-derives the action from the record instead of trusting the wake reason.

use std::sync::Arc;
use std::time::Duration;

use corral_config::model::CorralConfig;
use corral_core::types::{
    epoch_millis, Admission, BatchRecord, BatchStatus, CombinedInput, ConversationKey,
    PendingMessage, ProcessOutput,
};
use corral_core::{BatchStore, CoordinatorError, HeartbeatSink, ProcessorAdapter, TransportAdapter};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::retry::FailureAction;
use crate::scheduler::ScheduleAction;
use crate::{admission, executor, retry, scheduler, stuck};

/// Wake floor after a storage failure in timer context, so a persistently
/// failing save cannot spin the loop.
const STORAGE_RETRY_MS: i64 = 1_000;

pub(crate) enum Command {
    Admit {
        message: PendingMessage,
        reply: oneshot::Sender<Result<Admission, CoordinatorError>>,
    },
}

pub(crate) struct WorkerHandle {
    pub tx: mpsc::Sender<Command>,
    pub join: JoinHandle<()>,
}

struct Execution {
    batch_id: String,
    handle: JoinHandle<Result<ProcessOutput, CoordinatorError>>,
}

/// Forwards processor liveness signals into the store, guarded by batch id.
struct StoreHeartbeat {
    store: Arc<dyn BatchStore>,
    key: ConversationKey,
    batch_id: String,
}

#[async_trait::async_trait]
impl HeartbeatSink for StoreHeartbeat {
    async fn beat(&self) {
        let now = epoch_millis();
        if let Err(e) = self
            .store
            .touch_heartbeat(&self.key, &self.batch_id, now)
            .await
        {
            debug!(key = %self.key, error = %e, "heartbeat touch failed");
        }
    }
}

pub(crate) struct Worker {
    key: ConversationKey,
    record: BatchRecord,
    store: Arc<dyn BatchStore>,
    processor: Arc<dyn ProcessorAdapter>,
    transport: Arc<dyn TransportAdapter>,
    config: CorralConfig,
    rx: mpsc::Receiver<Command>,
    cancel: CancellationToken,
    exec: Option<Execution>,
    /// Epoch-ms deadline of a scheduled retry; in-memory only. After a crash
    /// the stuck path re-detects the batch at heartbeat expiry instead.
    retry_at: Option<i64>,
    storage_backoff: Option<i64>,
}

pub(crate) fn spawn(
    key: ConversationKey,
    record: BatchRecord,
    store: Arc<dyn BatchStore>,
    processor: Arc<dyn ProcessorAdapter>,
    transport: Arc<dyn TransportAdapter>,
    config: CorralConfig,
    cancel: CancellationToken,
) -> WorkerHandle {
    let (tx, rx) = mpsc::channel(64);
    let worker = Worker {
        key,
        record,
        store,
        processor,
        transport,
        config,
        rx,
        cancel,
        exec: None,
        retry_at: None,
        storage_backoff: None,
    };
    let join = tokio::spawn(worker.run());
    WorkerHandle { tx, join }
}

impl Worker {
    async fn run(mut self) {
        debug!(key = %self.key, status = %self.record.status, "worker started");

        loop {
            let deadline = self.next_deadline();
            let sleep_target = deadline.map(instant_at);
            let timer_armed = sleep_target.is_some();
            let has_exec = self.exec.is_some();

            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(Command::Admit { message, reply }) => {
                            let result = self.handle_admit(message).await;
                            let _ = reply.send(result);
                        }
                        None => break,
                    }
                }
                (batch_id, result) = await_execution(&mut self.exec), if has_exec => {
                    self.exec = None;
                    self.handle_exec_result(batch_id, result).await;
                }
                _ = tokio::time::sleep_until(sleep_target.unwrap_or_else(far_future)), if timer_armed => {
                    self.on_wake().await;
                }
                _ = self.cancel.cancelled() => {
                    debug!(key = %self.key, "worker cancelled");
                    break;
                }
            }
        }

        if let Some(exec) = self.exec.take() {
            exec.handle.abort();
        }
        debug!(key = %self.key, "worker stopped");
    }

    /// Admit a message: dedup, persist, and fire the window when due.
    ///
    /// The record is mutated on a copy and only committed once the save
    /// succeeds, so a storage failure surfaces to the caller without leaving
    /// the in-memory state ahead of the store.
    async fn handle_admit(
        &mut self,
        message: PendingMessage,
    ) -> Result<Admission, CoordinatorError> {
        let now = epoch_millis();
        let request_id = message.request_id.clone();

        let mut updated = self.record.clone();
        let admission = admission::admit_message(&mut updated, message, now);
        if let Admission::Duplicate { .. } = admission {
            debug!(key = %self.key, request_id = %request_id, "duplicate request id, dropping redelivery");
            return Ok(admission);
        }

        self.store.save(&self.key, &updated).await?;
        self.record = updated;
        debug!(
            key = %self.key,
            request_id = %request_id,
            pending = self.record.pending.len(),
            "message admitted"
        );

        if let ScheduleAction::FireNow = scheduler::evaluate(&self.record, &self.config.batch, now)
        {
            self.start_batch().await?;
        }
        Ok(admission)
    }

    /// Freeze the pending slot and launch the first attempt.
    async fn start_batch(&mut self) -> Result<(), CoordinatorError> {
        let now = epoch_millis();

        let mut updated = self.record.clone();
        let batch_id = executor::freeze(&mut updated, now);
        let input = executor::combine(&self.key, &updated)?;
        self.store.save(&self.key, &updated).await?;
        self.record = updated;

        info!(
            key = %self.key,
            batch_id = %batch_id,
            messages = input.message_count,
            "batch frozen, starting processing"
        );

        // Provisional reply on the first attempt only; retries reuse it.
        match self
            .transport
            .send(&input.context, executor::PROVISIONAL_REPLY)
            .await
        {
            Ok(message_ref) => {
                self.record.reply_handle = Some(message_ref);
                self.persist("provisional reply").await;
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "provisional reply failed");
            }
        }

        self.spawn_execution(input);
        Ok(())
    }

    fn spawn_execution(&mut self, input: CombinedInput) {
        let processor = Arc::clone(&self.processor);
        let sink: Arc<dyn HeartbeatSink> = Arc::new(StoreHeartbeat {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            batch_id: input.batch_id.clone(),
        });
        let batch_id = input.batch_id.clone();
        let handle = tokio::spawn(async move { processor.execute(&input, sink).await });
        self.exec = Some(Execution { batch_id, handle });
    }

    async fn handle_exec_result(
        &mut self,
        batch_id: String,
        result: Result<ProcessOutput, CoordinatorError>,
    ) {
        // A result from a superseded batch (aborted as stuck, then replaced)
        // must not touch the current record.
        if self.record.batch_id.as_deref() != Some(batch_id.as_str()) {
            debug!(key = %self.key, batch_id = %batch_id, "ignoring stale execution result");
            return;
        }

        match result {
            Ok(output) => self.complete_batch(output).await,
            Err(e) => self.fail_attempt(e).await,
        }
    }

    async fn complete_batch(&mut self, output: ProcessOutput) {
        info!(
            key = %self.key,
            batch_id = self.record.batch_id.as_deref().unwrap_or(""),
            "batch completed"
        );

        if let Err(e) =
            executor::deliver_reply(&self.transport, &self.key, &mut self.record, &output.content)
                .await
        {
            // The work itself succeeded; retrying would re-run the processor.
            error!(key = %self.key, error = %e, "failed to deliver batch reply");
        }

        self.record.status = BatchStatus::Completed;
        self.record.last_error = None;
        self.persist("completion").await;
        self.finish_active_batch().await;
    }

    async fn fail_attempt(&mut self, err: CoordinatorError) {
        self.record.last_error = Some(err.to_string());

        match retry::on_failure(&self.config.retry, self.record.retry_count) {
            FailureAction::Retry { delay_ms } => {
                self.record.retry_count += 1;
                warn!(
                    key = %self.key,
                    batch_id = self.record.batch_id.as_deref().unwrap_or(""),
                    retry = self.record.retry_count,
                    delay_ms,
                    error = %err,
                    "batch attempt failed, scheduling retry"
                );
                self.persist("attempt failure").await;
                self.retry_at = Some(epoch_millis() + delay_ms);
            }
            FailureAction::Abandon => {
                warn!(
                    key = %self.key,
                    batch_id = self.record.batch_id.as_deref().unwrap_or(""),
                    retries = self.record.retry_count,
                    error = %err,
                    "retry budget exhausted, abandoning batch"
                );
                let exhausted = CoordinatorError::RetriesExhausted {
                    attempts: self.record.retry_count + 1,
                    last_error: err.to_string(),
                };
                self.record.last_error = Some(exhausted.to_string());
                self.record.status = BatchStatus::Failed;
                self.persist("abandonment").await;

                // Exactly one user-visible notice per abandoned batch.
                if let Err(e) = executor::deliver_reply(
                    &self.transport,
                    &self.key,
                    &mut self.record,
                    executor::ABANDON_REPLY,
                )
                .await
                {
                    error!(key = %self.key, error = %e, "failed to deliver abandonment notice");
                }

                self.finish_active_batch().await;
            }
        }
    }

    /// Drop all active-batch state and promote the second slot, if any.
    ///
    /// Abandoned or completed in-flight messages are never merged into the
    /// pending batch; it proceeds independently on its own window.
    async fn finish_active_batch(&mut self) {
        self.record.clear_active_batch();
        self.record.status = if self.record.pending.is_empty() {
            BatchStatus::Idle
        } else {
            BatchStatus::Collecting
        };
        self.retry_at = None;
        self.persist("batch reset").await;
    }

    async fn on_wake(&mut self) {
        self.storage_backoff = None;
        let now = epoch_millis();

        match self.record.status {
            BatchStatus::Processing => {
                if let Some(at) = self.retry_at {
                    if now >= at {
                        self.retry_at = None;
                        self.start_retry().await;
                    }
                    return;
                }

                self.refresh_heartbeat().await;
                if let Some(age) = stuck::check(&self.record, &self.config.heartbeat, now) {
                    warn!(
                        key = %self.key,
                        batch_id = self.record.batch_id.as_deref().unwrap_or(""),
                        age_ms = age,
                        "no heartbeat from in-flight batch, aborting attempt"
                    );
                    if let Some(exec) = self.exec.take() {
                        exec.handle.abort();
                    }
                    self.fail_attempt(CoordinatorError::StuckTimeout { age_ms: age })
                        .await;
                }
            }
            BatchStatus::Collecting => {
                if let ScheduleAction::FireNow =
                    scheduler::evaluate(&self.record, &self.config.batch, now)
                    && let Err(e) = self.start_batch().await
                {
                    error!(key = %self.key, error = %e, "failed to start batch from timer");
                    self.storage_backoff = Some(now + STORAGE_RETRY_MS);
                }
            }
            _ => {}
        }
    }

    /// Re-run the frozen batch. The input is recombined from `in_flight`,
    /// which has not changed since the freeze, so it is identical to the
    /// first attempt's.
    async fn start_retry(&mut self) {
        let input = match executor::combine(&self.key, &self.record) {
            Ok(input) => input,
            Err(e) => {
                error!(key = %self.key, error = %e, "cannot rebuild batch input for retry");
                self.finish_active_batch().await;
                return;
            }
        };

        self.record.last_heartbeat = Some(epoch_millis());
        self.persist("retry start").await;
        info!(
            key = %self.key,
            batch_id = %input.batch_id,
            attempt = self.record.retry_count + 1,
            "retrying batch"
        );
        self.spawn_execution(input);
    }

    /// Adopt heartbeat touches written out-of-band by the processor's sink.
    ///
    /// Touches land in the store, not in this worker's copy of the record,
    /// so the stuck check reloads the column first. The batch-id guard on
    /// both sides keeps superseded beats out.
    async fn refresh_heartbeat(&mut self) {
        match self.store.load(&self.key).await {
            Ok(Some(stored)) if stored.batch_id == self.record.batch_id => {
                if stored.last_heartbeat > self.record.last_heartbeat {
                    self.record.last_heartbeat = stored.last_heartbeat;
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(key = %self.key, error = %e, "failed to refresh heartbeat from store");
            }
        }
    }

    async fn persist(&mut self, transition: &str) {
        if let Err(e) = self.store.save(&self.key, &self.record).await {
            // No caller to propagate to in timer context; the next transition
            // rewrites the full row anyway.
            error!(key = %self.key, error = %e, transition, "failed to persist batch record");
            self.storage_backoff = Some(epoch_millis() + STORAGE_RETRY_MS);
        }
    }

    /// The single wake deadline: window fire while collecting, retry or
    /// stuck expiry while processing, floored by the storage backoff.
    fn next_deadline(&self) -> Option<i64> {
        let now = epoch_millis();
        let mut deadline = match self.record.status {
            BatchStatus::Collecting => {
                match scheduler::evaluate(&self.record, &self.config.batch, now) {
                    ScheduleAction::FireNow => Some(now),
                    ScheduleAction::WaitUntil(t) => Some(t),
                    ScheduleAction::Noop => None,
                }
            }
            BatchStatus::Processing => match self.retry_at {
                Some(at) => Some(at),
                None => stuck::deadline(&self.record, &self.config.heartbeat),
            },
            _ => None,
        };

        if let Some(floor) = self.storage_backoff {
            deadline = Some(deadline.map_or(floor, |d| d.max(floor)));
        }
        deadline
    }
}

async fn await_execution(
    exec: &mut Option<Execution>,
) -> (String, Result<ProcessOutput, CoordinatorError>) {
    match exec.as_mut() {
        Some(execution) => {
            let result = (&mut execution.handle).await;
            let batch_id = execution.batch_id.clone();
            let result = result.unwrap_or_else(|e| {
                Err(CoordinatorError::Processing {
                    message: format!("execution task failed: {e}"),
                    source: None,
                })
            });
            (batch_id, result)
        }
        None => std::future::pending().await,
    }
}

fn instant_at(deadline_ms: i64) -> tokio::time::Instant {
    let delta = (deadline_ms - epoch_millis()).max(0) as u64;
    tokio::time::Instant::now() + Duration::from_millis(delta)
}

fn far_future() -> tokio::time::Instant {
    tokio::time::Instant::now() + Duration::from_secs(86_400)
}
