// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport adapter trait for delivering replies back to the conversation.

use async_trait::async_trait;

use crate::error::CoordinatorError;
use crate::traits::adapter::PluginAdapter;
use crate::types::MessageRef;

/// Adapter for reply delivery (chat platform, webhook, test capture).
///
/// The coordinator addresses replies with the opaque `original_context` of
/// the oldest message in the batch; the transport knows how to interpret it.
#[async_trait]
pub trait TransportAdapter: PluginAdapter {
    /// Sends a new message into the conversation and returns a reference
    /// usable for later edits.
    async fn send(
        &self,
        context: &serde_json::Value,
        text: &str,
    ) -> Result<MessageRef, CoordinatorError>;

    /// Replaces the content of a previously sent message.
    async fn edit(&self, message: &MessageRef, text: &str) -> Result<(), CoordinatorError>;
}
