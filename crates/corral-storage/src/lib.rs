// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Corral batching coordinator.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed CRUD operations for
//! per-conversation batch records.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod store;
pub mod writer;

pub use database::Database;
pub use store::SqliteBatchStore;
