// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as window ordering and backoff bounds.

use crate::diagnostic::ConfigError;
use crate::model::CorralConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CorralConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.batch.window_ms < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "batch.window_ms must be at least 1, got {}",
                config.batch.window_ms
            ),
        });
    }

    if config.batch.max_window_ms < config.batch.window_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "batch.max_window_ms ({}) must be >= batch.window_ms ({})",
                config.batch.max_window_ms, config.batch.window_ms
            ),
        });
    }

    if config.batch.max_messages < 1 {
        errors.push(ConfigError::Validation {
            message: "batch.max_messages must be at least 1".to_string(),
        });
    }

    if config.retry.initial_delay_ms < 0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "retry.initial_delay_ms must be non-negative, got {}",
                config.retry.initial_delay_ms
            ),
        });
    }

    if config.retry.backoff_multiplier < 1.0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "retry.backoff_multiplier must be at least 1.0, got {}",
                config.retry.backoff_multiplier
            ),
        });
    }

    if config.retry.max_delay_ms < config.retry.initial_delay_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "retry.max_delay_ms ({}) must be >= retry.initial_delay_ms ({})",
                config.retry.max_delay_ms, config.retry.initial_delay_ms
            ),
        });
    }

    if config.retry.max_retries < 1 {
        errors.push(ConfigError::Validation {
            message: "retry.max_retries must be at least 1".to_string(),
        });
    }

    if config.heartbeat.max_heartbeat_age_ms < 1 {
        errors.push(ConfigError::Validation {
            message: format!(
                "heartbeat.max_heartbeat_age_ms must be at least 1, got {}",
                config.heartbeat.max_heartbeat_age_ms
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
