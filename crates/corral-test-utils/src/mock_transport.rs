// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport adapter that captures sends and edits.

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use corral_core::traits::adapter::PluginAdapter;
use corral_core::traits::transport::TransportAdapter;
use corral_core::types::{AdapterType, HealthStatus, MessageRef};
use corral_core::CoordinatorError;

/// A captured outbound send.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub context: serde_json::Value,
    pub text: String,
    pub message_ref: MessageRef,
}

/// A captured edit.
#[derive(Debug, Clone, PartialEq)]
pub struct EditedMessage {
    pub message_ref: MessageRef,
    pub text: String,
}

/// A mock transport that records all deliveries.
///
/// Sends return sequentially numbered message refs. `delivered` is notified
/// on every send or edit so tests can wait for a reply instead of polling.
pub struct MockTransport {
    sends: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<EditedMessage>>,
    fail_sends: Mutex<bool>,
    delivered: Notify,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sends: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            fail_sends: Mutex::new(false),
            delivered: Notify::new(),
        }
    }

    /// All sends so far, in delivery order.
    pub async fn sends(&self) -> Vec<SentMessage> {
        self.sends.lock().await.clone()
    }

    /// All edits so far, in delivery order.
    pub async fn edits(&self) -> Vec<EditedMessage> {
        self.edits.lock().await.clone()
    }

    /// Make subsequent sends fail with a transport error.
    pub async fn set_fail_sends(&self, fail: bool) {
        *self.fail_sends.lock().await = fail;
    }

    /// Wait for the next send or edit. One pending delivery is buffered.
    pub async fn wait_for_delivery(&self) {
        self.delivered.notified().await;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, CoordinatorError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CoordinatorError> {
        Ok(())
    }
}

#[async_trait]
impl TransportAdapter for MockTransport {
    async fn send(
        &self,
        context: &serde_json::Value,
        text: &str,
    ) -> Result<MessageRef, CoordinatorError> {
        if *self.fail_sends.lock().await {
            return Err(CoordinatorError::transport("mock send failure"));
        }

        let mut sends = self.sends.lock().await;
        let message_ref = MessageRef(format!("mock-msg-{}", sends.len() + 1));
        sends.push(SentMessage {
            context: context.clone(),
            text: text.to_string(),
            message_ref: message_ref.clone(),
        });
        drop(sends);

        self.delivered.notify_one();
        Ok(message_ref)
    }

    async fn edit(&self, message: &MessageRef, text: &str) -> Result<(), CoordinatorError> {
        self.edits.lock().await.push(EditedMessage {
            message_ref: message.clone(),
            text: text.to_string(),
        });
        self.delivered.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sends_get_sequential_refs() {
        let transport = MockTransport::new();
        let r1 = transport
            .send(&serde_json::Value::Null, "one")
            .await
            .unwrap();
        let r2 = transport
            .send(&serde_json::Value::Null, "two")
            .await
            .unwrap();
        assert_eq!(r1, MessageRef("mock-msg-1".to_string()));
        assert_eq!(r2, MessageRef("mock-msg-2".to_string()));
        assert_eq!(transport.sends().await.len(), 2);
    }

    #[tokio::test]
    async fn edits_are_recorded_against_refs() {
        let transport = MockTransport::new();
        let r = transport
            .send(&serde_json::Value::Null, "draft")
            .await
            .unwrap();
        transport.edit(&r, "final").await.unwrap();

        let edits = transport.edits().await;
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].message_ref, r);
        assert_eq!(edits[0].text, "final");
    }

    #[tokio::test]
    async fn failing_sends_return_transport_error() {
        let transport = MockTransport::new();
        transport.set_fail_sends(true).await;
        let result = transport.send(&serde_json::Value::Null, "x").await;
        assert!(matches!(
            result,
            Err(CoordinatorError::Transport { .. })
        ));
    }
}
