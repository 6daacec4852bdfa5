// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `skein config` subcommands.

use clap::Subcommand;
use skein_config::SkeinConfig;
use skein_core::SkeinError;

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML, secrets masked.
    Show,
    /// Validate the configuration and exit.
    Check,
}

pub fn run(config: &SkeinConfig, action: ConfigAction) -> Result<(), SkeinError> {
    match action {
        ConfigAction::Show => {
            print!("{}", render(config)?);
            Ok(())
        }
        // Loading already validated; reaching here means it passed.
        ConfigAction::Check => {
            println!("configuration ok");
            Ok(())
        }
    }
}

/// Effective configuration as TOML with the secret key masked.
fn render(config: &SkeinConfig) -> Result<String, SkeinError> {
    let mut shown = config.clone();
    if !shown.client.secret_key.is_empty() {
        shown.client.secret_key = "********".to_string();
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| SkeinError::Config(format!("failed to render configuration: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_masks_secret_key() {
        let mut config = SkeinConfig::default();
        config.client.public_key = "pk-visible".to_string();
        config.client.secret_key = "sk-hidden".to_string();

        let out = render(&config).unwrap();
        assert!(out.contains("pk-visible"));
        assert!(!out.contains("sk-hidden"));
        assert!(out.contains("[queue]"));
    }

    #[test]
    fn rendered_config_loads_back() {
        let out = render(&SkeinConfig::default()).unwrap();
        let parsed = skein_config::load_and_validate_str(&out).unwrap();
        assert_eq!(parsed, SkeinConfig::default());
    }
}
