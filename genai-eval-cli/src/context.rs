//! CLI execution context

use anyhow::{bail, Context as _, Result};
use genai_eval_core::{EvaluationService, ModelAdapter};
use genai_eval_metrics::LocalEvaluationService;
use genai_eval_sdk::GenAiClient;
use std::sync::Arc;
use tracing::info;

use crate::cli::Cli;
use crate::config::CliConfig;
use crate::output::OutputWriter;

/// Execution context for CLI commands
pub struct Context {
    /// CLI configuration
    pub config: CliConfig,

    /// Output writer
    pub output: OutputWriter,

    /// Verbose mode
    pub verbose: bool,
}

impl Context {
    /// Create a new context from CLI arguments
    pub fn new(cli: &Cli) -> Result<Self> {
        let config = CliConfig::load(cli.config.as_deref())?;
        let format = cli.format.unwrap_or(config.settings.output_format);
        let output = OutputWriter::new(format, cli.no_color || !config.settings.color);

        Ok(Self {
            config,
            output,
            verbose: cli.verbose,
        })
    }

    /// Effective endpoint URL: the flag, then the configured one
    pub fn endpoint_url<'a>(&'a self, url_override: Option<&'a str>) -> Option<&'a str> {
        url_override.or(self.config.endpoint.url.as_deref())
    }

    /// Create an SDK client for the effective endpoint
    pub fn create_client(&self, url_override: Option<&str>) -> Result<GenAiClient> {
        let Some(url) = self.endpoint_url(url_override) else {
            bail!("No endpoint configured. Pass --judge-url or set endpoint.url in the configuration.");
        };
        let config = self.config.endpoint.sdk_config(url, self.verbose);
        GenAiClient::new(config).context("Failed to create API client")
    }

    /// Judge used for scoring
    pub fn evaluation_service(
        &self,
        judge_url: Option<&str>,
        local_judge: bool,
    ) -> Result<Arc<dyn EvaluationService>> {
        if local_judge {
            info!("Using the in-process judge");
            return Ok(Arc::new(LocalEvaluationService::new()));
        }
        let client = self.create_client(judge_url)?;
        info!(url = %client.base_url(), "Using hosted judge");
        Ok(Arc::new(client.evaluation_service()))
    }

    /// Hosted generative model, for inference and rubric generation
    pub fn generative_model(&self, name: &str, url_override: Option<&str>) -> Result<ModelAdapter> {
        let client = self.create_client(url_override)?;
        Ok(ModelAdapter::generative(client.generative_model(name)))
    }
}
