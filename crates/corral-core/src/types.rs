// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Corral workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifies a single conversation. All batching state is scoped to a key;
/// keys are fully independent of each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey(pub String);

impl ConversationKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque reference to a message the transport delivered, used to edit it
/// later (e.g. replacing a provisional "working on it" reply).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef(pub String);

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a conversation key's batch record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// No live messages for this key.
    #[default]
    Idle,
    /// Messages are accumulating; a window timer is armed.
    Collecting,
    /// A frozen batch is in flight through the processor.
    Processing,
    /// Transient: the active batch succeeded; persisted before reset.
    Completed,
    /// Transient: the active batch was abandoned; persisted before reset.
    Failed,
}

/// The type of plugin adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum AdapterType {
    /// Executes the opaque processing step for a combined batch.
    Processor,
    /// Delivers and edits user-visible replies.
    Transport,
    /// Persists batch records.
    Storage,
}

/// Result of an adapter health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

/// A single admitted message waiting to be batched. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMessage {
    /// The message text as received.
    pub text: String,
    /// Arrival time, epoch milliseconds.
    pub received_at: i64,
    /// Caller-supplied idempotency key. Unique within a key's live working
    /// set (pending plus in-flight).
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Opaque transport context carried through to reply delivery.
    #[serde(default)]
    pub original_context: serde_json::Value,
}

/// Per-conversation-key batching state. One record per key; all transitions
/// happen inside that key's worker task and are persisted after every
/// transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BatchRecord {
    pub status: BatchStatus,
    /// The collecting slot. While a batch is processing, this same slot
    /// accumulates the next batch.
    #[serde(default)]
    pub pending: Vec<PendingMessage>,
    /// Frozen messages of the active batch. Non-empty iff processing.
    #[serde(default)]
    pub in_flight: Vec<PendingMessage>,
    /// Identity of the active batch. `Some` iff processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Attempts for the current batch_id. Reset to 0 on each new batch_id.
    #[serde(default)]
    pub retry_count: u32,
    /// Epoch ms of the most recent admission into `pending`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<i64>,
    /// Epoch ms when `pending` last went from empty to non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collecting_started_at: Option<i64>,
    /// Epoch ms of the latest liveness signal from in-flight work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<i64>,
    /// Last failure reason, kept for diagnostics and the abandonment notice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Transport ref of the provisional reply, if one was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_handle: Option<MessageRef>,
}

impl BatchRecord {
    /// True when any live message (pending or in-flight) already carries this
    /// request id. Drives admission dedup.
    pub fn has_live_request_id(&self, request_id: &str) -> bool {
        self.pending
            .iter()
            .chain(self.in_flight.iter())
            .any(|m| m.request_id == request_id)
    }

    /// The earliest-arriving in-flight message. Its `original_context`
    /// addresses the final reply.
    pub fn oldest_in_flight(&self) -> Option<&PendingMessage> {
        self.in_flight.first()
    }

    /// True when the record holds no live messages at all.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    /// Clear all active-batch state. Leaves `pending` untouched so a
    /// second-slot batch survives the reset.
    pub fn clear_active_batch(&mut self) {
        self.in_flight.clear();
        self.batch_id = None;
        self.retry_count = 0;
        self.last_heartbeat = None;
        self.reply_handle = None;
    }
}

/// The frozen, combined input handed to the processor. Identical across
/// retry attempts of the same batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedInput {
    pub conversation_key: ConversationKey,
    pub batch_id: String,
    /// Message texts in arrival order, joined with `\n`.
    pub text: String,
    pub message_count: usize,
    /// The oldest message's original context.
    pub context: serde_json::Value,
}

/// What the processor produced for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
}

/// Outcome of admitting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The message joined the key's pending slot.
    Accepted,
    /// The request id already exists in the key's live working set. Not an
    /// error; redelivery is expected under at-least-once transports.
    Duplicate { request_id: String },
}

/// Current wall-clock time as epoch milliseconds.
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(request_id: &str) -> PendingMessage {
        PendingMessage {
            text: "hello".into(),
            received_at: 1_000,
            request_id: request_id.into(),
            user_id: None,
            conversation_id: None,
            original_context: serde_json::Value::Null,
        }
    }

    #[test]
    fn batch_status_round_trips_lowercase() {
        use std::str::FromStr;

        for status in [
            BatchStatus::Idle,
            BatchStatus::Collecting,
            BatchStatus::Processing,
            BatchStatus::Completed,
            BatchStatus::Failed,
        ] {
            let s = status.to_string();
            assert_eq!(s, s.to_lowercase());
            assert_eq!(BatchStatus::from_str(&s).expect("should parse"), status);
        }
    }

    #[test]
    fn dedup_spans_pending_and_in_flight() {
        let mut record = BatchRecord::default();
        record.pending.push(msg("req-1"));
        record.in_flight.push(msg("req-2"));

        assert!(record.has_live_request_id("req-1"));
        assert!(record.has_live_request_id("req-2"));
        assert!(!record.has_live_request_id("req-3"));
    }

    #[test]
    fn clear_active_batch_preserves_pending() {
        let mut record = BatchRecord {
            status: BatchStatus::Processing,
            pending: vec![msg("next-1")],
            in_flight: vec![msg("req-1")],
            batch_id: Some("batch-a".into()),
            retry_count: 3,
            last_heartbeat: Some(5_000),
            reply_handle: Some(MessageRef("ref-1".into())),
            ..Default::default()
        };

        record.clear_active_batch();

        assert!(record.in_flight.is_empty());
        assert_eq!(record.batch_id, None);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.last_heartbeat, None);
        assert_eq!(record.reply_handle, None);
        assert_eq!(record.pending.len(), 1);
    }

    #[test]
    fn record_serde_round_trip() {
        let record = BatchRecord {
            status: BatchStatus::Processing,
            pending: vec![msg("next-1")],
            in_flight: vec![msg("req-1"), msg("req-2")],
            batch_id: Some("batch-a".into()),
            retry_count: 2,
            last_message_at: Some(2_000),
            collecting_started_at: Some(1_000),
            last_heartbeat: Some(3_000),
            last_error: Some("provider 500".into()),
            reply_handle: Some(MessageRef("ref-1".into())),
        };

        let json = serde_json::to_string(&record).expect("should serialize");
        let parsed: BatchRecord = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(record, parsed);
    }
}
