// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted model types.
//!
//! The storage layer persists the coordinator's own record types directly;
//! the row shape in `migrations/` mirrors [`BatchRecord`] field for field,
//! with message vectors as JSON text columns.

pub use corral_core::types::{BatchRecord, BatchStatus, ConversationKey, PendingMessage};
