// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stuck-work detection via heartbeat age.

use corral_config::model::HeartbeatConfig;
use corral_core::types::{BatchRecord, BatchStatus};

/// Liveness basis for a processing record: the most recent of the last
/// heartbeat and the collecting start. `last_heartbeat` is always stamped
/// when a batch freezes, so the fallback only matters for records written by
/// older code.
fn liveness_basis(record: &BatchRecord) -> Option<i64> {
    match (record.last_heartbeat, record.collecting_started_at) {
        (Some(h), Some(c)) => Some(h.max(c)),
        (Some(h), None) => Some(h),
        (None, Some(c)) => Some(c),
        (None, None) => None,
    }
}

/// Returns the heartbeat age when the in-flight work is presumed stuck.
///
/// Applies only while the record is processing. Stuck means the age of the
/// liveness basis strictly exceeds `max_heartbeat_age_ms`.
pub fn check(record: &BatchRecord, cfg: &HeartbeatConfig, now_ms: i64) -> Option<i64> {
    if record.status != BatchStatus::Processing {
        return None;
    }
    let basis = liveness_basis(record)?;
    let age = now_ms - basis;
    (age > cfg.max_heartbeat_age_ms).then_some(age)
}

/// Epoch-ms deadline at which a silent processing record becomes stuck.
///
/// Used by the worker to arm its wake timer; `None` when the record is not
/// processing.
pub fn deadline(record: &BatchRecord, cfg: &HeartbeatConfig) -> Option<i64> {
    if record.status != BatchStatus::Processing {
        return None;
    }
    liveness_basis(record).map(|basis| basis + cfg.max_heartbeat_age_ms + 1)
}
