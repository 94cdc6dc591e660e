// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch freezing, input combination, and reply delivery.

use std::sync::Arc;

use corral_core::types::{BatchRecord, BatchStatus, CombinedInput, ConversationKey};
use corral_core::{CoordinatorError, TransportAdapter};
use tracing::warn;

/// Provisional reply sent when a batch starts its first attempt. Edited in
/// place once the real output is ready.
pub const PROVISIONAL_REPLY: &str = "Working on it...";

/// Single user-visible notice for an abandoned batch.
pub const ABANDON_REPLY: &str =
    "Sorry, I wasn't able to process your messages after several attempts. Please try again.";

/// Freeze the collecting slot into an active batch.
///
/// Moves `pending` into `in_flight`, assigns a fresh batch id, resets the
/// retry count, and stamps the heartbeat. The collecting timestamps are
/// cleared; the next admitted message restarts them for the second slot.
/// Returns the new batch id.
pub fn freeze(record: &mut BatchRecord, now_ms: i64) -> String {
    let batch_id = uuid::Uuid::new_v4().to_string();

    record.in_flight = std::mem::take(&mut record.pending);
    record.status = BatchStatus::Processing;
    record.batch_id = Some(batch_id.clone());
    record.retry_count = 0;
    record.last_heartbeat = Some(now_ms);
    record.last_error = None;
    record.reply_handle = None;
    record.collecting_started_at = None;
    record.last_message_at = None;

    batch_id
}

/// Build the processor input from the frozen batch.
///
/// Texts are joined with `\n` in arrival order and the oldest message's
/// context addresses the reply. `in_flight` is immutable for the batch's
/// lifetime, so retries produce an identical input.
pub fn combine(
    key: &ConversationKey,
    record: &BatchRecord,
) -> Result<CombinedInput, CoordinatorError> {
    let batch_id = record.batch_id.clone().ok_or_else(|| {
        CoordinatorError::Internal("combine called without an active batch".into())
    })?;
    let oldest = record.oldest_in_flight().ok_or_else(|| {
        CoordinatorError::Internal("combine called with empty in-flight slot".into())
    })?;

    let text = record
        .in_flight
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(CombinedInput {
        conversation_key: key.clone(),
        batch_id,
        text,
        message_count: record.in_flight.len(),
        context: oldest.original_context.clone(),
    })
}

/// Deliver a user-visible reply for the active batch.
///
/// Edits the provisional message in place when one exists; otherwise sends a
/// fresh message addressed by the oldest in-flight context. A failed edit
/// falls back to a fresh send.
pub async fn deliver_reply(
    transport: &Arc<dyn TransportAdapter>,
    key: &ConversationKey,
    record: &mut BatchRecord,
    text: &str,
) -> Result<(), CoordinatorError> {
    if let Some(handle) = &record.reply_handle {
        match transport.edit(handle, text).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(key = %key, error = %e, "edit of provisional reply failed, sending fresh message");
            }
        }
    }

    let context = record
        .oldest_in_flight()
        .map(|m| m.original_context.clone())
        .unwrap_or(serde_json::Value::Null);
    let message_ref = transport.send(&context, text).await?;
    record.reply_handle = Some(message_ref);
    Ok(())
}
