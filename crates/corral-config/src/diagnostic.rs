// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rich diagnostics for configuration failures.
//!
//! Figment reports deserialization problems as flat error values; this module
//! turns them into miette diagnostics. The config surface is four one-level
//! sections (`batch`, `retry`, `heartbeat`, `storage`), so an unknown key can
//! be located by walking the offending TOML file line by line, tracking the
//! current `[section]` header, and pointing a span at the key inside the
//! section figment reported. Unknown keys additionally get a "did you mean?"
//! suggestion via Jaro-Winkler similarity.

use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a candidate key must beat to be suggested. High enough
/// to filter noise, low enough to catch `windw_ms` and `max_retrys`.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration failure, renderable as a miette report.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key that no config section defines.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(corral::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Closest valid key, when one is similar enough.
        suggestion: Option<String>,
        /// Comma-separated keys the section accepts.
        valid_keys: String,
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value of the wrong TOML type, e.g. a string where an integer belongs.
    #[error("invalid value for `{key}`: found {found}")]
    #[diagnostic(code(corral::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
    },

    /// A semantic constraint violation caught after deserialization.
    #[error("validation error: {message}")]
    #[diagnostic(code(corral::config::validation))]
    Validation { message: String },

    /// Anything figment reports that has no richer mapping.
    #[error("configuration error: {0}")]
    #[diagnostic(code(corral::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert a figment error (which may carry several failures) into
/// diagnostics. `sources` pairs each loaded TOML file's path with its
/// content, for span lookup.
pub fn from_figment(err: figment::Error, sources: &[(String, String)]) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(field, allowed) => {
                let valid: Vec<&str> = allowed.to_vec();
                let (span, src) = locate(&error, field, sources);
                ConfigError::UnknownKey {
                    key: field.clone(),
                    suggestion: closest_key(field, &valid),
                    valid_keys: valid.join(", "),
                    span,
                    src,
                }
            }
            Kind::InvalidType(found, expected) => ConfigError::InvalidType {
                key: dotted_path(&error),
                found: found.to_string(),
                expected: expected.clone(),
            },
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

fn dotted_path(error: &figment::error::Error) -> String {
    error
        .path
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Resolve the span of `field` in the file the error came from.
fn locate(
    error: &figment::error::Error,
    field: &str,
    sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });
    let Some(file) = file else {
        return (None, None);
    };
    let Some((name, content)) = sources.iter().find(|(path, _)| *path == file) else {
        return (None, None);
    };

    let section = error.path.first().map(|p| p.to_string());
    match key_span(content, section.as_deref(), field) {
        Some(span) => (Some(span), Some(NamedSource::new(name, content.clone()))),
        None => (None, None),
    }
}

/// Byte span of `key` inside `section` of a TOML document, or at top level
/// when `section` is `None`.
///
/// Walks lines with a running offset, flipping an in-section flag on every
/// `[header]` line, and matches the key only where an `=` follows it. Good
/// for the one-level sections this config uses; nested tables would need a
/// real parser.
pub fn key_span(content: &str, section: Option<&str>, key: &str) -> Option<SourceSpan> {
    let mut in_section = section.is_none();
    let mut offset = 0usize;

    for line in content.lines() {
        let trimmed = line.trim_start();
        if let Some(header) = trimmed.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            in_section = section == Some(header.trim());
        } else if in_section
            && let Some(rest) = trimmed.strip_prefix(key)
            && rest.trim_start().starts_with('=')
        {
            let indent = line.len() - trimmed.len();
            return Some(SourceSpan::new((offset + indent).into(), key.len()));
        }
        offset += line.len() + 1;
    }

    None
}

/// The valid key most similar to `unknown`, if any clears the threshold.
pub fn closest_key(unknown: &str, valid: &[&str]) -> Option<String> {
    valid
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render diagnostics into one report string.
///
/// Uses a colorless unicode theme so the output is stable; callers decide
/// where it goes (typically stderr).
pub fn render_errors(errors: &[ConfigError]) -> String {
    let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());
    let mut report = String::new();
    for error in errors {
        if handler
            .render_report(&mut report, error as &dyn Diagnostic)
            .is_err()
        {
            report.push_str(&format!("error: {error}\n"));
        }
        report.push('\n');
    }
    report
}
