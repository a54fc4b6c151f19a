//! Configuration
//!
//! Layered, lowest priority first:
//!
//! 1. built-in defaults
//! 2. `tempo.toml` in the working directory, or an explicit `--config` file
//! 3. environment variables `TEMPO_<SECTION>__<KEY>` (a `.env` file is
//!    loaded into the environment first)

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "TEMPO";
pub const DEFAULT_CONFIG_FILE: &str = "tempo.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub compiler: CompilerConfig,
    pub log: LogConfig,
}

/// Settings read by the lowering pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Prefix of generated element IDs
    pub id_prefix: String,
    /// Retry attempts when `retry.times` is omitted
    pub default_retry_times: u64,
    /// Delay between attempts when `retry.delay` is omitted
    pub default_retry_delay: u64,
    /// Run structural verification on every compiled flow
    pub verify: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            id_prefix: "e".to_string(),
            default_retry_times: 1,
            default_retry_delay: 5,
            verify: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `tracing` filter when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load with the default search path
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigBuilder {
    /// Explicit configuration file; it must exist when given
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Ignore `.env` and `TEMPO_*` variables
    pub fn skip_env(mut self, skip: bool) -> Self {
        self.skip_env = skip;
        self
    }

    pub fn build(self) -> Result<Config> {
        let defaults = Config::default();

        let mut builder = config::Config::builder()
            .set_default("compiler.id_prefix", defaults.compiler.id_prefix.clone())?
            .set_default(
                "compiler.default_retry_times",
                defaults.compiler.default_retry_times as i64,
            )?
            .set_default(
                "compiler.default_retry_delay",
                defaults.compiler.default_retry_delay as i64,
            )?
            .set_default("compiler.verify", defaults.compiler.verify)?
            .set_default("log.level", defaults.log.level.clone())?;

        builder = match &self.config_path {
            Some(path) => builder.add_source(config::File::from(path.clone()).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        if !self.skip_env {
            // Missing .env is fine
            let _ = dotenvy::dotenv();
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: Config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if config.compiler.id_prefix.is_empty() {
            anyhow::bail!("compiler.id_prefix must not be empty");
        }

        Ok(config)
    }
}
