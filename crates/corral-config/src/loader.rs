// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./corral.toml` > `~/.config/corral/corral.toml` > `/etc/corral/corral.toml`
//! with environment variable overrides via `CORRAL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CorralConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/corral/corral.toml` (system-wide)
/// 3. `~/.config/corral/corral.toml` (user XDG config)
/// 4. `./corral.toml` (local directory)
/// 5. `CORRAL_*` environment variables
pub fn load_config() -> Result<CorralConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CorralConfig::default()))
        .merge(Toml::file("/etc/corral/corral.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("corral/corral.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("corral.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and for callers that manage their own config source.
pub fn load_config_from_str(toml_content: &str) -> Result<CorralConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CorralConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CorralConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CorralConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// CRITICAL: Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `CORRAL_BATCH_MAX_WINDOW_MS`
/// must map to `batch.max_window_ms`, not `batch.max.window.ms`.
fn env_provider() -> Env {
    Env::prefixed("CORRAL_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: CORRAL_BATCH_WINDOW_MS -> "batch_window_ms"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("batch_", "batch.", 1)
            .replacen("retry_", "retry.", 1)
            .replacen("heartbeat_", "heartbeat.", 1)
            .replacen("storage_", "storage.", 1);
        mapped.into()
    })
}
