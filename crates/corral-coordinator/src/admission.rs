// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message admission: dedup and append into the collecting slot.

use corral_core::types::{Admission, BatchRecord, BatchStatus, PendingMessage};

/// Admit a message into the record's collecting slot.
///
/// Rejects as a duplicate when the request id matches any live message
/// (pending or in-flight). Otherwise appends, stamps the window timestamps,
/// and moves an idle record to collecting. A record that is processing keeps
/// its status; the pending slot simply accumulates the next batch.
pub fn admit_message(
    record: &mut BatchRecord,
    message: PendingMessage,
    now_ms: i64,
) -> Admission {
    if record.has_live_request_id(&message.request_id) {
        return Admission::Duplicate {
            request_id: message.request_id,
        };
    }

    if record.pending.is_empty() {
        record.collecting_started_at = Some(now_ms);
    }
    record.pending.push(message);
    record.last_message_at = Some(now_ms);

    if record.status == BatchStatus::Idle {
        record.status = BatchStatus::Collecting;
    }

    Admission::Accepted
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
    fn first_message_starts_collecting() {
        let mut record = BatchRecord::default();
        let admission = admit_message(&mut record, msg("req-1"), 5_000);

        assert_eq!(admission, Admission::Accepted);
        assert_eq!(record.status, BatchStatus::Collecting);
        assert_eq!(record.pending.len(), 1);
        assert_eq!(record.collecting_started_at, Some(5_000));
        assert_eq!(record.last_message_at, Some(5_000));
    }

    #[test]
    fn subsequent_message_slides_last_message_at_only() {
        let mut record = BatchRecord::default();
        admit_message(&mut record, msg("req-1"), 5_000);
        admit_message(&mut record, msg("req-2"), 5_700);

        assert_eq!(record.pending.len(), 2);
        assert_eq!(record.collecting_started_at, Some(5_000));
        assert_eq!(record.last_message_at, Some(5_700));
    }

    #[test]
    fn duplicate_request_id_is_rejected_without_mutation() {
        let mut record = BatchRecord::default();
        admit_message(&mut record, msg("req-1"), 5_000);
        let snapshot = record.clone();

        let admission = admit_message(&mut record, msg("req-1"), 6_000);
        assert_eq!(
            admission,
            Admission::Duplicate {
                request_id: "req-1".into()
            }
        );
        assert_eq!(record, snapshot);
    }

    #[test]
    fn duplicate_against_in_flight_is_rejected() {
        let mut record = BatchRecord {
            status: BatchStatus::Processing,
            in_flight: vec![msg("req-1")],
            batch_id: Some("batch-a".into()),
            ..Default::default()
        };

        let admission = admit_message(&mut record, msg("req-1"), 6_000);
        assert!(matches!(admission, Admission::Duplicate { .. }));
        assert!(record.pending.is_empty());
    }

    #[test]
    fn admission_during_processing_keeps_status() {
        let mut record = BatchRecord {
            status: BatchStatus::Processing,
            in_flight: vec![msg("req-1")],
            batch_id: Some("batch-a".into()),
            ..Default::default()
        };

        let admission = admit_message(&mut record, msg("req-2"), 6_000);
        assert_eq!(admission, Admission::Accepted);
        assert_eq!(record.status, BatchStatus::Processing);
        assert_eq!(record.pending.len(), 1);
        assert_eq!(record.collecting_started_at, Some(6_000));
    }
}
