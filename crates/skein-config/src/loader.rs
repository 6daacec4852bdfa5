// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order: `/etc/skein/skein.toml`, then `~/.config/skein/skein.toml`,
//! then `./skein.toml`, then `SKEIN_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::SkeinConfig;

/// Config sections, used to map `SKEIN_<SECTION>_<KEY>` onto `section.key`.
const SECTIONS: &[&str] = &[
    "client",
    "queue",
    "retry",
    "circuit",
    "backpressure",
    "errors",
    "shutdown",
];

/// Candidate config files, lowest precedence first.
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/skein/skein.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("skein/skein.toml"));
    }
    paths.push(PathBuf::from("skein.toml"));
    paths
}

/// Load configuration from the standard file hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. Each file from [`config_file_paths`]
/// 3. `SKEIN_*` environment variables
pub fn load_config() -> Result<SkeinConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<SkeinConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SkeinConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file, still honoring env overrides.
pub fn load_config_from_path(path: &Path) -> Result<SkeinConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SkeinConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment behind [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(SkeinConfig::default()));
    for path in config_file_paths() {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Env provider mapping `SKEIN_QUEUE_BATCH_SIZE` to `queue.batch_size`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// keys that contain underscores stay intact.
fn env_provider() -> Env {
    Env::prefixed("SKEIN_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
