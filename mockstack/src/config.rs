//! Configuration management

use mockstack_core::{DEFAULT_ACCOUNT_ID, DEFAULT_REGION};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub scope: ScopeConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub lambda: LambdaConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Account and region used for requests without a usable credential scope
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeConfig {
    #[serde(default = "default_account_id")]
    pub account_id: String,

    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            account_id: default_account_id(),
            region: default_region(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_true")]
    pub iam: bool,

    #[serde(default = "default_true")]
    pub logs: bool,

    #[serde(default = "default_true")]
    pub lambda: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            iam: true,
            logs: true,
            lambda: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LambdaConfig {
    /// Interpreter used for Python runtimes
    #[serde(default = "default_python")]
    pub python: String,
}

impl Default for LambdaConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
        }
    }
}

fn default_port() -> u16 {
    4566
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_account_id() -> String {
    DEFAULT_ACCOUNT_ID.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Without an explicit path an optional `mockstack.toml` in the working
    /// directory is read. `MOCKSTACK_SERVER__PORT=4567` style variables
    /// override file values.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("mockstack").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("MOCKSTACK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }
}
