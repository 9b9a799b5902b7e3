//! CLI configuration management
//!
//! Layers, lowest precedence first: `config/default`, the user config file, `--config`, then
//! `GENAI_EVAL__*` environment variables (e.g. `GENAI_EVAL__RUN__MAX_WORKERS=8`).

use anyhow::{Context as _, Result};
use config::{Config as ConfigLoader, Environment, File};
use directories::ProjectDirs;
use genai_eval_core::EvaluationRunConfig;
use genai_eval_sdk::{AuthConfig, SdkConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::output::OutputFormat;

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Concurrency, rate and retry settings forwarded to every run
    pub run: EvaluationRunConfig,

    /// Hosted endpoint settings
    pub endpoint: EndpointSettings,

    /// Global settings
    pub settings: Settings,
}

impl CliConfig {
    /// Load configuration from every layer
    pub fn load(extra: Option<&Path>) -> Result<Self> {
        let mut builder =
            ConfigLoader::builder().add_source(File::with_name("config/default").required(false));

        if let Some(path) = Self::user_config_path() {
            builder = builder.add_source(File::from(path).required(false));
        }

        if let Some(path) = extra {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("GENAI_EVAL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Per-user configuration file, if a home directory can be determined
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "genai-eval", "genai-eval")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Hosted judge and model endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Base URL, including the API version segment
    pub url: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// OAuth access token
    pub bearer_token: Option<String>,

    pub project: Option<String>,

    pub location: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            bearer_token: None,
            project: None,
            location: None,
            timeout_secs: 120,
        }
    }
}

impl EndpointSettings {
    /// SDK configuration for `base_url`
    pub fn sdk_config(&self, base_url: &str, verbose: bool) -> SdkConfig {
        let auth = match (&self.api_key, &self.bearer_token) {
            (Some(key), _) => AuthConfig::ApiKey(key.clone()),
            (None, Some(token)) => AuthConfig::BearerToken(token.clone()),
            (None, None) => AuthConfig::None,
        };

        let mut config = SdkConfig::new(base_url)
            .with_auth(auth)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_logging(verbose);

        if let (Some(project), Some(location)) = (&self.project, &self.location) {
            config = config.with_project(project.clone(), location.clone());
        }
        config
    }
}

/// Global settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default output format
    pub output_format: OutputFormat,

    /// Enable colored output
    pub color: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Table,
            color: true,
        }
    }
}
