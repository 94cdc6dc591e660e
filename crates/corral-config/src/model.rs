// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Corral coordinator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Corral configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CorralConfig {
    /// Batching window settings.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Retry and backoff settings.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Stuck-work detection settings.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Batching window configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Sliding debounce window in milliseconds. Each new message while
    /// collecting pushes the fire deadline out by this much.
    #[serde(default = "default_window_ms")]
    pub window_ms: i64,

    /// Absolute ceiling in milliseconds from the first message of a batch.
    /// The window fires no later than this, regardless of ongoing arrivals.
    #[serde(default = "default_max_window_ms")]
    pub max_window_ms: i64,

    /// Maximum number of messages per batch; reaching it fires immediately.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_window_ms: default_max_window_ms(),
            max_messages: default_max_messages(),
        }
    }
}

fn default_window_ms() -> i64 {
    1000
}

fn default_max_window_ms() -> i64 {
    10_000
}

fn default_max_messages() -> usize {
    10
}

/// Retry and backoff configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: i64,

    /// Multiplier applied to the delay on each subsequent retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on any single retry delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: i64,

    /// Maximum retry attempts before a batch is abandoned.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_initial_delay_ms() -> i64 {
    2000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> i64 {
    64_000
}

fn default_max_retries() -> u32 {
    6
}

/// Stuck-work detection configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    /// Maximum age in milliseconds of the last liveness signal before
    /// in-flight work is presumed stuck and aborted.
    #[serde(default = "default_max_heartbeat_age_ms")]
    pub max_heartbeat_age_ms: i64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            max_heartbeat_age_ms: default_max_heartbeat_age_ms(),
        }
    }
}

fn default_max_heartbeat_age_ms() -> i64 {
    20_000
}

/// Storage backend configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("corral").join("corral.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("corral.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}
