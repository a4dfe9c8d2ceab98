//! Configuration system for geoenrich.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from the user config directory (`config.toml`) and/or
//! `.geoenrich/config.toml` in the workspace directory.

use crate::error::{ClientError, ConfigError};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the enrichment service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL; endpoint names are joined onto it.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Inline API token. Prefer `api_token_env` outside of tests.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Environment variable holding the API token.
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,
    /// Header the token is sent in.
    #[serde(default = "default_token_header")]
    pub token_header: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            api_token_env: default_api_token_env(),
            token_header: default_token_header(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Resolve the API token from the inline value or the configured environment variable.
    pub fn resolve_token(&self) -> Result<String, ClientError> {
        self.api_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(&self.api_token_env).ok())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::MissingToken {
                env_var: self.api_token_env.clone(),
            })
    }
}

fn default_base_url() -> String {
    "https://api.askiggy.com/v1/".to_string()
}

fn default_api_token_env() -> String {
    "GEOENRICH_API_TOKEN".to_string()
}

fn default_token_header() -> String {
    "X-Iggy-Token".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Batch application settings for feature sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of in-flight requests per feature. 1 means strictly sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                message: "batch.concurrency must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn default_concurrency() -> usize {
    1
}

/// Logging output settings used by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write JSON logs to a daily rolling file.
    #[serde(default)]
    pub json_log: bool,
    /// Directory for JSON logs (defaults to the platform data dir).
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// Platform directories for geoenrich.
pub fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "askiggy", "geoenrich")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `GEOENRICH_`)
/// 3. Workspace-local config (`.geoenrich/config.toml`)
/// 4. User config (`<config dir>/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&EnrichConfig>,
) -> Result<EnrichConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(EnrichConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".geoenrich").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // GEOENRICH_CLIENT__TIMEOUT_SECS, GEOENRICH_BATCH__CONCURRENCY, etc.
    // The token variable itself is read by `resolve_token`, not merged here.
    figment = figment.merge(
        Env::prefixed("GEOENRICH_")
            .split("__")
            .ignore(&["API_TOKEN"]),
    );

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: EnrichConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.batch.validate()?;
    Ok(config)
}

/// Load configuration and then merge one extra TOML file on top of it.
pub fn load_config_with_file(
    workspace: Option<&Path>,
    file: &Path,
) -> Result<EnrichConfig, ConfigError> {
    if !file.exists() {
        return Err(ConfigError::Invalid {
            message: format!("config file not found: {}", file.display()),
        });
    }
    let base = load_config(workspace, None)?;
    let config: EnrichConfig = Figment::from(Serialized::defaults(base))
        .merge(Toml::file(file))
        .extract()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
    config.batch.validate()?;
    Ok(config)
}
