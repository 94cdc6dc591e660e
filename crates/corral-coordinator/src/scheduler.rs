// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Window scheduling: sliding debounce with an absolute ceiling.

use corral_config::model::BatchConfig;
use corral_core::types::{BatchRecord, BatchStatus};

/// What the scheduler wants done with the collecting slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAction {
    /// Freeze the pending messages and start processing now.
    FireNow,
    /// Re-evaluate no later than this epoch-ms deadline.
    WaitUntil(i64),
    /// Nothing to schedule (no pending messages, or a batch is in flight).
    Noop,
}

/// Evaluate the window policy for a record at `now_ms`.
///
/// The fire deadline is `min(last_message_at + window_ms,
/// collecting_started_at + max_window_ms)`: each arrival slides the debounce
/// window, but the ceiling anchored at the first message caps how long a
/// steady stream can hold a batch open. Reaching `max_messages` fires
/// immediately. While a batch is processing the pending slot waits, so the
/// result is `Noop`.
pub fn evaluate(record: &BatchRecord, cfg: &BatchConfig, now_ms: i64) -> ScheduleAction {
    if record.status == BatchStatus::Processing || record.pending.is_empty() {
        return ScheduleAction::Noop;
    }

    if record.pending.len() >= cfg.max_messages {
        return ScheduleAction::FireNow;
    }

    let started = record.collecting_started_at.unwrap_or(now_ms);
    let last = record.last_message_at.unwrap_or(now_ms);
    let deadline = (last + cfg.window_ms).min(started + cfg.max_window_ms);

    if deadline <= now_ms {
        ScheduleAction::FireNow
    } else {
        ScheduleAction::WaitUntil(deadline)
    }
}
