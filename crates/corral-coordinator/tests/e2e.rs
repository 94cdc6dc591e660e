// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end integration tests for the batching and retry coordinator.
//!
//! Each test creates an isolated TestHarness with mock adapters and an
//! in-memory store (temp SQLite where persistence itself is under test).
//! Tests are independent and order-insensitive. Windows are shortened to
//! tens of milliseconds; waits poll with generous timeouts to stay robust
//! on loaded CI machines.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use corral_config::model::{BatchConfig, HeartbeatConfig, RetryConfig, StorageConfig};
use corral_coordinator::executor::{ABANDON_REPLY, PROVISIONAL_REPLY};
use corral_coordinator::Coordinator;
use corral_core::types::{
    epoch_millis, Admission, BatchRecord, BatchStatus, ConversationKey, PendingMessage,
};
use corral_core::{BatchStore, CoordinatorError};
use corral_storage::SqliteBatchStore;
use corral_test_utils::{MockOutcome, MockProcessor, MockTransport, TestHarness};

/// Poll `condition` every 10ms until it returns true or `timeout` elapses.
async fn wait_until<F, Fut>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn message(request_id: &str, text: &str) -> PendingMessage {
    PendingMessage {
        text: text.to_string(),
        received_at: epoch_millis(),
        request_id: request_id.to_string(),
        user_id: Some("user-1".to_string()),
        conversation_id: Some("conv-1".to_string()),
        original_context: serde_json::json!({ "chat_id": "conv-1" }),
    }
}

// ---- Test 1: Duplicate suppression ----

#[tokio::test]
async fn duplicate_request_id_is_dropped() {
    // Long windows so the batch cannot fire mid-assertion.
    let harness = TestHarness::builder()
        .with_batch(BatchConfig {
            window_ms: 5_000,
            max_window_ms: 10_000,
            max_messages: 10,
        })
        .build();

    let first = harness.admit("key-a", "req-1", "hi").await.unwrap();
    assert!(matches!(first, Admission::Accepted));

    let second = harness.admit("key-a", "req-1", "hi again").await.unwrap();
    assert!(matches!(
        second,
        Admission::Duplicate { ref request_id } if request_id == "req-1"
    ));

    // The redelivery left no trace in the record.
    let record = harness
        .store
        .record(&ConversationKey::from("key-a"))
        .await
        .unwrap();
    assert_eq!(record.pending.len(), 1);
    assert_eq!(record.pending[0].text, "hi");
}

// ---- Test 2: Burst coalescing ----

#[tokio::test]
async fn burst_coalesces_into_single_batch() {
    let harness = TestHarness::builder().build();

    harness.admit("key-a", "req-1", "hi").await.unwrap();
    harness.admit("key-a", "req-2", "there").await.unwrap();

    let transport = harness.transport.clone();
    wait_until(Duration::from_secs(3), || {
        let transport = transport.clone();
        async move { transport.edits().await.len() == 1 }
    })
    .await;

    // One combined processor call, newline-joined in arrival order.
    let inputs = harness.processor.inputs().await;
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].text, "hi\nthere");
    assert_eq!(inputs[0].message_count, 2);

    // One provisional reply, edited in place with the real output.
    let sends = harness.transport.sends().await;
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].text, PROVISIONAL_REPLY);
    let edits = harness.transport.edits().await;
    assert_eq!(edits[0].message_ref, sends[0].message_ref);
    assert_eq!(edits[0].text, "mock output");
}

// ---- Test 3: Count trigger ----

#[tokio::test]
async fn reaching_max_messages_fires_without_waiting() {
    // Windows far beyond the test's lifetime; only the count can fire.
    let harness = TestHarness::builder()
        .with_batch(BatchConfig {
            window_ms: 30_000,
            max_window_ms: 60_000,
            max_messages: 2,
        })
        .build();

    harness.admit("key-a", "req-1", "one").await.unwrap();
    harness.admit("key-a", "req-2", "two").await.unwrap();

    let processor = harness.processor.clone();
    wait_until(Duration::from_secs(3), || {
        let processor = processor.clone();
        async move { processor.call_count().await == 1 }
    })
    .await;

    let inputs = harness.processor.inputs().await;
    assert_eq!(inputs[0].text, "one\ntwo");
    assert_eq!(inputs[0].message_count, 2);
}

// ---- Test 4: Absolute ceiling ----

#[tokio::test]
async fn steady_stream_cannot_defer_past_ceiling() {
    // Every arrival resets the 200ms debounce, but the 500ms ceiling from
    // the first message still fires.
    let harness = TestHarness::builder()
        .with_batch(BatchConfig {
            window_ms: 200,
            max_window_ms: 500,
            max_messages: 100,
        })
        .build();

    let start = tokio::time::Instant::now();
    let mut admitted = 0;
    while harness.processor.call_count().await == 0 {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "ceiling never fired under a steady stream"
        );
        harness
            .admit("key-a", &format!("req-{admitted}"), "drip")
            .await
            .unwrap();
        admitted += 1;
        tokio::time::sleep(Duration::from_millis(80)).await;
    }

    // The batch fired while messages were still flowing.
    let inputs = harness.processor.inputs().await;
    assert!(inputs[0].message_count >= 2);
    assert!(inputs[0].message_count < admitted + 1);
}

// ---- Test 5: Retry with provisional reuse ----

#[tokio::test]
async fn failed_attempt_retries_and_edits_provisional_reply() {
    let harness = TestHarness::builder()
        .with_outcomes(vec![
            MockOutcome::Failure("backend unavailable".to_string()),
            MockOutcome::Success("recovered".to_string()),
        ])
        .build();

    harness.admit("key-a", "req-1", "hello").await.unwrap();

    let transport = harness.transport.clone();
    wait_until(Duration::from_secs(5), || {
        let transport = transport.clone();
        async move { transport.edits().await.len() == 1 }
    })
    .await;

    assert_eq!(harness.processor.call_count().await, 2);

    // Both attempts saw the identical combined input.
    let inputs = harness.processor.inputs().await;
    assert_eq!(inputs[0], inputs[1]);

    // No second provisional on retry; the first one got the final edit.
    let sends = harness.transport.sends().await;
    assert_eq!(sends.len(), 1);
    let edits = harness.transport.edits().await;
    assert_eq!(edits[0].message_ref, sends[0].message_ref);
    assert_eq!(edits[0].text, "recovered");

    let store = harness.store.clone();
    wait_until(Duration::from_secs(3), || {
        let store = store.clone();
        async move {
            store
                .record(&ConversationKey::from("key-a"))
                .await
                .is_some_and(|r| r.status == BatchStatus::Idle)
        }
    })
    .await;
}

// ---- Test 6: Abandonment ----

#[tokio::test]
async fn exhausted_retries_send_exactly_one_abandonment_notice() {
    // max_retries = 1 allows two attempts total.
    let harness = TestHarness::builder()
        .with_retry(RetryConfig {
            initial_delay_ms: 50,
            backoff_multiplier: 2.0,
            max_delay_ms: 400,
            max_retries: 1,
        })
        .with_outcomes(vec![
            MockOutcome::Failure("boom".to_string()),
            MockOutcome::Failure("boom again".to_string()),
        ])
        .build();

    harness.admit("key-a", "req-1", "doomed").await.unwrap();

    let store = harness.store.clone();
    wait_until(Duration::from_secs(5), || {
        let store = store.clone();
        async move {
            store
                .record(&ConversationKey::from("key-a"))
                .await
                .is_some_and(|r| r.status == BatchStatus::Idle)
        }
    })
    .await;

    assert_eq!(harness.processor.call_count().await, 2);

    // One provisional, edited once with the abandonment notice.
    let sends = harness.transport.sends().await;
    assert_eq!(sends.len(), 1);
    let edits = harness.transport.edits().await;
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].text, ABANDON_REPLY);

    // The key is not poisoned: the next message processes normally.
    harness.admit("key-a", "req-2", "fresh start").await.unwrap();
    let transport = harness.transport.clone();
    wait_until(Duration::from_secs(3), || {
        let transport = transport.clone();
        async move { transport.edits().await.len() == 2 }
    })
    .await;
    let edits = harness.transport.edits().await;
    assert_eq!(edits[1].text, "mock output");
}

// ---- Test 7: Stuck detection ----

#[tokio::test]
async fn hung_attempt_is_aborted_and_retried() {
    let harness = TestHarness::builder()
        .with_heartbeat(HeartbeatConfig {
            max_heartbeat_age_ms: 150,
        })
        .with_outcomes(vec![
            MockOutcome::Hang,
            MockOutcome::Success("after the hang".to_string()),
        ])
        .build();

    harness.admit("key-a", "req-1", "hello").await.unwrap();

    let transport = harness.transport.clone();
    wait_until(Duration::from_secs(5), || {
        let transport = transport.clone();
        async move { transport.edits().await.len() == 1 }
    })
    .await;

    assert_eq!(harness.processor.call_count().await, 2);
    let edits = harness.transport.edits().await;
    assert_eq!(edits[0].text, "after the hang");
}

// ---- Test 8: Messages during processing ----

#[tokio::test]
async fn messages_arriving_mid_batch_form_the_next_batch() {
    let harness = TestHarness::builder()
        .with_outcomes(vec![
            MockOutcome::Success("first reply".to_string()),
            MockOutcome::Success("second reply".to_string()),
        ])
        .build();

    harness.admit("key-a", "req-1", "first").await.unwrap();

    // Wait for the batch to freeze, then admit into the pending slot.
    harness.processor.wait_for_start().await;
    harness.admit("key-a", "req-2", "second").await.unwrap();

    let processor = harness.processor.clone();
    wait_until(Duration::from_secs(5), || {
        let processor = processor.clone();
        async move { processor.call_count().await == 2 }
    })
    .await;

    // Two separate batches, never merged.
    let inputs = harness.processor.inputs().await;
    assert_eq!(inputs[0].text, "first");
    assert_eq!(inputs[1].text, "second");
    assert_ne!(inputs[0].batch_id, inputs[1].batch_id);
}

// ---- Test 9: Recovery ----

#[tokio::test]
async fn recovery_rearms_an_overdue_collecting_record() {
    let harness = TestHarness::builder().build();

    // A record whose window elapsed while the process was down.
    let stale = epoch_millis() - 5_000;
    let record = BatchRecord {
        status: BatchStatus::Collecting,
        pending: vec![message("req-1", "left behind")],
        collecting_started_at: Some(stale),
        last_message_at: Some(stale),
        ..Default::default()
    };
    harness
        .store
        .save(&ConversationKey::from("key-a"), &record)
        .await
        .unwrap();

    let recovered = harness.coordinator.recover().await.unwrap();
    assert_eq!(recovered, 1);

    let processor = harness.processor.clone();
    wait_until(Duration::from_secs(3), || {
        let processor = processor.clone();
        async move { processor.call_count().await == 1 }
    })
    .await;

    let inputs = harness.processor.inputs().await;
    assert_eq!(inputs[0].text, "left behind");
}

// ---- Test 10: Storage failure on admit ----

#[tokio::test]
async fn storage_failure_surfaces_to_the_admit_caller() {
    let harness = TestHarness::builder()
        .with_batch(BatchConfig {
            window_ms: 5_000,
            max_window_ms: 10_000,
            max_messages: 10,
        })
        .build();
    harness.store.set_fail_saves(true).await;

    let result = harness.admit("key-a", "req-1", "hi").await;
    assert!(matches!(result, Err(CoordinatorError::Storage { .. })));

    // The rejected message was not kept in memory either: once storage
    // recovers, the same request id is admitted cleanly.
    harness.store.set_fail_saves(false).await;
    let retried = harness.admit("key-a", "req-1", "hi").await.unwrap();
    assert!(matches!(retried, Admission::Accepted));
}

// ---- Test 11: SQLite end to end ----

#[tokio::test]
async fn sqlite_store_round_trips_a_full_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteBatchStore::new(StorageConfig {
        database_path: dir
            .path()
            .join("corral.db")
            .to_string_lossy()
            .into_owned(),
        wal_mode: true,
    }));
    store.initialize().await.unwrap();

    let processor = Arc::new(MockProcessor::with_outcomes(vec![MockOutcome::Success(
        "persisted reply".to_string(),
    )]));
    let transport = Arc::new(MockTransport::new());

    let mut config = corral_config::model::CorralConfig::default();
    config.batch.window_ms = 80;
    config.batch.max_window_ms = 800;

    let coordinator = Coordinator::new(
        config,
        store.clone(),
        processor.clone(),
        transport.clone(),
    );

    let key = ConversationKey::from("key-a");
    coordinator
        .admit(&key, message("req-1", "hello sqlite"))
        .await
        .unwrap();

    let transport_poll = transport.clone();
    wait_until(Duration::from_secs(5), || {
        let transport = transport_poll.clone();
        async move { transport.edits().await.len() == 1 }
    })
    .await;

    let store_poll = store.clone();
    let key_poll = key.clone();
    wait_until(Duration::from_secs(3), || {
        let store = store_poll.clone();
        let key = key_poll.clone();
        async move {
            store
                .load(&key)
                .await
                .unwrap()
                .is_some_and(|r| r.status == BatchStatus::Idle && r.in_flight.is_empty())
        }
    })
    .await;

    coordinator.shutdown().await.unwrap();
}

// ---- Test 12: Shutdown ----

#[tokio::test]
async fn shutdown_preserves_collecting_state_for_recovery() {
    let harness = TestHarness::builder()
        .with_batch(BatchConfig {
            window_ms: 5_000,
            max_window_ms: 10_000,
            max_messages: 10,
        })
        .build();

    harness.admit("key-a", "req-1", "hi").await.unwrap();
    harness.coordinator.shutdown().await.unwrap();

    // The collecting record survives shutdown for later recovery.
    let record = harness
        .store
        .record(&ConversationKey::from("key-a"))
        .await
        .unwrap();
    assert_eq!(record.status, BatchStatus::Collecting);
    assert_eq!(record.pending.len(), 1);
}

// ---- Property tests: policy invariants ----

mod policy_properties {
    use super::*;
    use corral_coordinator::retry::compute_delay;
    use corral_coordinator::scheduler::{evaluate, ScheduleAction};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn backoff_is_nondecreasing_and_capped(
            initial in 1i64..10_000,
            multiplier in 1.0f64..4.0,
            max_delay in 1i64..200_000,
            attempts in 1u32..32,
        ) {
            let cfg = RetryConfig {
                initial_delay_ms: initial,
                backoff_multiplier: multiplier,
                max_delay_ms: max_delay.max(initial),
                max_retries: 6,
            };
            let mut previous = 0i64;
            for attempt in 0..attempts {
                let delay = compute_delay(&cfg, attempt);
                prop_assert!(delay >= previous);
                prop_assert!(delay <= cfg.max_delay_ms);
                previous = delay;
            }
        }

        #[test]
        fn window_deadline_never_exceeds_ceiling(
            window in 1i64..5_000,
            ceiling_slack in 0i64..50_000,
            started in 0i64..1_000_000,
            gap in 0i64..20_000,
            since_last in 0i64..60_000,
        ) {
            let cfg = BatchConfig {
                window_ms: window,
                max_window_ms: window + ceiling_slack,
                max_messages: usize::MAX,
            };
            let last = started + gap;
            let now = last + since_last;
            let record = BatchRecord {
                status: BatchStatus::Collecting,
                pending: vec![super::message("req-1", "m")],
                collecting_started_at: Some(started),
                last_message_at: Some(last),
                ..Default::default()
            };

            let ceiling = started + cfg.max_window_ms;
            match evaluate(&record, &cfg, now) {
                ScheduleAction::FireNow => {
                    // Only due batches fire.
                    prop_assert!(last + window <= now || ceiling <= now);
                }
                ScheduleAction::WaitUntil(t) => {
                    prop_assert!(t > now);
                    prop_assert!(t <= ceiling);
                }
                ScheduleAction::Noop => prop_assert!(false, "collecting batch with pending messages must be scheduled"),
            }
        }
    }
}
