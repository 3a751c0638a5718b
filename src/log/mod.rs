pub mod structured_console_encoder;

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use log4rs::{
    Config,
    config::{Deserializers, RawConfig},
};

use crate::log::structured_console_encoder::StructuredConsoleEncoderDeserializer;

const EXTERNAL_CONFIG_PATH: &str = "log4rs.yml";

fn deserializers() -> Deserializers {
    let mut deserializers = Deserializers::default();
    deserializers.insert("structured_console", StructuredConsoleEncoderDeserializer);
    deserializers
}

/// Builds the embedded default logging configuration.
pub fn default_config() -> Result<Config> {
    let yaml_content = include_str!("../../resources/default_log4rs.yml");
    let raw_config: RawConfig =
        serde_yaml::from_str(yaml_content).context("Embedded logging configuration is invalid YAML")?;

    let (appenders, errors) = raw_config.appenders_lossy(&deserializers());
    if !errors.is_empty() {
        return Err(anyhow!("Errors parsing embedded appenders: {:?}", errors));
    }

    Config::builder()
        .appenders(appenders)
        .loggers(raw_config.loggers())
        .build(raw_config.root())
        .context("Failed to build logging config")
}

/// Initializes logging for applications embedding the client.
///
/// Uses `log4rs.yml` from the working directory when present, otherwise the
/// embedded defaults. Fails if a logger is already installed.
pub fn init_logging() -> Result<()> {
    let path = Path::new(EXTERNAL_CONFIG_PATH);

    if path.exists() {
        log4rs::init_file(path, deserializers()).context("Failed to load external log4rs.yml")?;
        info!(path = EXTERNAL_CONFIG_PATH; "Logging initialized from external configuration");
        return Ok(());
    }

    log4rs::init_config(default_config()?).context("Failed to initialize logging from embedded config")?;

    debug!("Logging initialized from embedded defaults (no external log4rs.yml found)");
    Ok(())
}

fn reveal_keys() -> bool {
    static REVEAL_KEYS_CACHE: OnceLock<bool> = OnceLock::new();

    *REVEAL_KEYS_CACHE.get_or_init(|| {
        std::env::var("BITNODES_REVEAL_KEYS")
            .map(|v| {
                let val = v.to_lowercase();
                val == "true" || val == "1"
            })
            .unwrap_or(false)
    })
}

/// Masks a string (like a public key) showing only start and end characters.
/// If BITNODES_REVEAL_KEYS is true, returns the original string.
pub fn mask_string(s: &str) -> String {
    if reveal_keys() {
        return s.to_string();
    }

    if s.len() <= 12 || !s.is_ascii() {
        return "***".to_string();
    }

    format!("{}...{}", &s[0..6], &s[s.len() - 6..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_builds() {
        assert!(default_config().is_ok());
    }

    #[test]
    fn test_mask_string() {
        if reveal_keys() {
            return;
        }
        assert_eq!(mask_string("short"), "***");
        assert_eq!(mask_string("0123456789abcdefXYZ"), "012345...defXYZ");
    }
}
