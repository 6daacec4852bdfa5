// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns Figment extraction failures into miette diagnostics.
//!
//! Unknown keys get a "did you mean?" hint ranked by Jaro-Winkler
//! similarity and, when the offending file is known, a labelled span.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Similarity needed before a key is offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// A configuration problem ready for rendering.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(skein::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(code(skein::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(code(skein::config::invalid_value))]
    InvalidValue { key: String, detail: String },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(skein::config::missing_key),
        help("add `{key} = <value>` to skein.toml or set the matching SKEIN_ variable")
    )]
    MissingKey { key: String },

    /// A value that parsed but breaks a semantic rule.
    #[error("validation error: {message}")]
    #[diagnostic(code(skein::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(skein::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert every error inside a `figment::Error` into a [`ConfigError`].
///
/// `toml_sources` pairs a file path with its contents; it is only used to
/// attach spans to unknown keys.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let key = error
                .path
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(".");
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let suggestion = suggest_key(field, expected);
                    let (span, src) = locate(&error, field, toml_sources);
                    ConfigError::UnknownKey {
                        key: qualified(&key, field),
                        suggestion,
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: qualified(&key, field),
                },
                Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                    key,
                    detail: format!("found {actual}"),
                    expected: expected.clone(),
                },
                Kind::InvalidValue(actual, expected) => ConfigError::InvalidValue {
                    key,
                    detail: format!("found {actual}, expected {expected}"),
                },
                Kind::UnknownVariant(actual, variants) => ConfigError::InvalidValue {
                    key,
                    detail: format!("`{actual}` is not one of {}", variants.join(", ")),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn qualified(section: &str, field: &str) -> String {
    match section {
        "" => field.to_string(),
        s if s == field || s.ends_with(&format!(".{field}")) => s.to_string(),
        s => format!("{s}.{field}"),
    }
}

fn locate(
    error: &figment::error::Error,
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some(figment::Source::File(path)) = error.metadata.as_ref().and_then(|m| m.source.as_ref())
    else {
        return (None, None);
    };
    let path = path.display().to_string();
    let Some((name, content)) = toml_sources.iter().find(|(p, _)| *p == path) else {
        return (None, None);
    };
    let section = error.path.first().map(String::as_str);
    match find_key_offset(content, section, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` as a key inside the `[section]` table, or at the
/// top level when `section` is `None`.
pub fn find_key_offset(content: &str, section: Option<&str>, field: &str) -> Option<usize> {
    let start = match section {
        Some(name) => {
            let header = format!("[{name}]");
            content.find(&header)? + header.len()
        }
        None => 0,
    };

    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if section.is_some() && trimmed.starts_with('[') && offset != start {
            break;
        }
        if let Some(rest) = trimmed.strip_prefix(field)
            && rest.trim_start().starts_with('=')
        {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

/// Best-scoring key above the similarity threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render diagnostics to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_close_key() {
        let valid = &["capacity", "batch_size", "flush_interval_ms"];
        assert_eq!(suggest_key("batch_sise", valid), Some("batch_size".to_string()));
        assert_eq!(suggest_key("capasity", valid), Some("capacity".to_string()));
    }

    #[test]
    fn no_suggestion_for_unrelated_key() {
        let valid = &["capacity", "batch_size"];
        assert_eq!(suggest_key("zzzz", valid), None);
    }

    #[test]
    fn finds_key_inside_section() {
        let content = "[client]\nbase_url = \"x\"\n\n[queue]\nbatch_sise = 5\n";
        let offset = find_key_offset(content, Some("queue"), "batch_sise").unwrap();
        assert_eq!(&content[offset..offset + 10], "batch_sise");
    }

    #[test]
    fn stops_at_next_section() {
        let content = "[queue]\ncapacity = 1\n[retry]\nbatch_size = 2\n";
        assert_eq!(find_key_offset(content, Some("queue"), "batch_size"), None);
    }

    #[test]
    fn key_prefix_is_not_a_match() {
        let content = "[queue]\ncapacity_max = 1\ncapacity = 2\n";
        let offset = find_key_offset(content, Some("queue"), "capacity").unwrap();
        assert_eq!(&content[offset..offset + 12], "capacity = 2");
    }

    #[test]
    fn qualified_keys() {
        assert_eq!(qualified("", "client"), "client");
        assert_eq!(qualified("queue", "batch_sise"), "queue.batch_sise");
        assert_eq!(qualified("queue.capacity", "capacity"), "queue.capacity");
    }
}
