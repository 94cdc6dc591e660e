// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Corral integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockProcessor`] - Mock processor with scripted success/failure/hang outcomes
//! - [`MockTransport`] - Mock transport capturing sends and edits
//! - [`MemoryBatchStore`] - In-memory batch store with failure injection
//! - [`TestHarness`] - A coordinator wired to all three

pub mod harness;
pub mod memory_store;
pub mod mock_processor;
pub mod mock_transport;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use memory_store::MemoryBatchStore;
pub use mock_processor::{MockOutcome, MockProcessor};
pub use mock_transport::{EditedMessage, MockTransport, SentMessage};
