// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Skein ingestion pipeline.
//!
//! TOML files are layered with `SKEIN_*` environment overrides via Figment,
//! unknown keys are rejected, and every failure is reported as a miette
//! diagnostic.
//!
//! ```no_run
//! use skein_config::load_and_validate;
//!
//! let config = load_and_validate().unwrap_or_default();
//! println!("batch size: {}", config.queue.batch_size);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::SkeinConfig;

/// Load from the standard file hierarchy plus environment, then validate.
pub fn load_and_validate() -> Result<SkeinConfig, Vec<ConfigError>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Load from a TOML string only, then validate.
pub fn load_and_validate_str(toml_content: &str) -> Result<SkeinConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

/// Load from one explicit file plus environment, then validate.
pub fn load_and_validate_path(path: &Path) -> Result<SkeinConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        read_sources(std::iter::once(path.to_path_buf()))
    })
}

fn finish(
    loaded: Result<SkeinConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<SkeinConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            tracing::debug!(
                capacity = config.queue.capacity,
                batch_size = config.queue.batch_size,
                "configuration loaded"
            );
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// Contents of every config file that exists, keyed the way Figment
/// reports them in error metadata.
fn collect_toml_sources() -> Vec<(String, String)> {
    read_sources(loader::config_file_paths())
}

fn read_sources(paths: impl IntoIterator<Item = std::path::PathBuf>) -> Vec<(String, String)> {
    paths
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            let absolute = if path.is_absolute() {
                path
            } else {
                std::env::current_dir().ok()?.join(path)
            };
            Some((absolute.display().to_string(), content))
        })
        .collect()
}
