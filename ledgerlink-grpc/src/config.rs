use anyhow::{Context, Result};
use ledgerlink_connector::config::ConnectorConfig;
use ledgerlink_logger::LogConfig;
use serde::Deserialize;

/// The top-level configuration for the `ledgerlink` binary.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct CliConfig {
    #[serde(default)]
    pub connector: ConnectorConfig,
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
}

/// Loads the configuration from a TOML file, then applies overrides from
/// `LEDGERLINK__*` environment variables (e.g. `LEDGERLINK__CONNECTOR__NODE__HOST`).
pub fn load_config(path: &str) -> Result<CliConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("LEDGERLINK").separator("__"));

    let settings: CliConfig = builder
        .build()
        .context(format!("Failed to build configuration from '{}'", path))?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    Ok(settings)
}
