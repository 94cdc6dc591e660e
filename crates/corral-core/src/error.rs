// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Corral batching coordinator.

use thiserror::Error;

/// The primary error type used across all Corral adapter traits and
/// coordinator operations.
///
/// Duplicate admission is deliberately *not* an error -- it is reported as
/// [`Admission::Duplicate`](crate::types::Admission) because redelivery of
/// the same logical message is expected under at-least-once transports.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Configuration errors (invalid TOML, out-of-range window or retry values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Batch store errors (database connection, query failure, serialization).
    ///
    /// Propagated to the caller of `admit` or logged from timer context; the
    /// coordinator never retries storage failures itself, since retrying
    /// without confirmed state risks duplicate processing.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The external processing step failed. Retried with bounded backoff.
    #[error("processing error: {message}")]
    Processing {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transport errors (reply delivery or edit failure).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An in-flight batch produced no heartbeat within the allowed age.
    /// Treated as a processing failure for retry purposes.
    #[error("no heartbeat for {age_ms}ms, batch presumed stuck")]
    StuckTimeout { age_ms: i64 },

    /// Terminal: the batch was abandoned after exhausting its retry budget.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Wrap an arbitrary error as a storage failure.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Build a processing failure from a plain message.
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
            source: None,
        }
    }

    /// Build a transport failure from a plain message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }
}
