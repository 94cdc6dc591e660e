// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Corral batching coordinator.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Corral workspace. All adapter plugins
//! implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CoordinatorError;
pub use types::{
    Admission, AdapterType, BatchRecord, BatchStatus, CombinedInput, ConversationKey,
    HealthStatus, MessageRef, PendingMessage, ProcessOutput,
};

// Re-export all adapter traits at crate root.
pub use traits::{BatchStore, HeartbeatSink, PluginAdapter, ProcessorAdapter, TransportAdapter};
