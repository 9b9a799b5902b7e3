//! GenAI Eval SDK
//!
//! HTTP clients for the hosted endpoints an evaluation talks to: the judge
//! (`evaluateInstances`) and generative models (`generateContent`). Both clients
//! implement the core service traits, so they plug straight into an `EvalTask`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use genai_eval_sdk::{GenAiClient, SdkConfig};
//!
//! # fn example() -> Result<(), genai_eval_sdk::SdkError> {
//! let config = SdkConfig::new("https://us-central1-aiplatform.googleapis.com/v1")
//!     .with_bearer_token("token")
//!     .with_project("my-project", "us-central1");
//!
//! let client = GenAiClient::new(config)?;
//! let judge = client.evaluation_service();
//! let model = client.generative_model("gemini-1.5-pro");
//! # let _ = (judge, model);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Failed calls return [`SdkError`]. Each error maps to a judge status code via
//! [`SdkError::judge_code`], which is what the workflow's retry policy inspects.

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod resources;

pub use client::HttpClient;
pub use config::{AuthConfig, SdkConfig};
pub use error::{code_for_status, SdkError, SdkResult};
pub use resources::{
    EvaluationServiceClient, GenerateContentRequest, GenerationConfig, GenerativeModelClient,
};

use std::sync::Arc;

/// Entry point holding one HTTP client shared by every service client.
#[derive(Debug, Clone)]
pub struct GenAiClient {
    http_client: Arc<HttpClient>,
}

impl GenAiClient {
    /// Create a new client with the given configuration.
    pub fn new(config: SdkConfig) -> SdkResult<Self> {
        Ok(Self {
            http_client: Arc::new(HttpClient::new(config)?),
        })
    }

    /// Judge client for the configured project.
    pub fn evaluation_service(&self) -> EvaluationServiceClient {
        EvaluationServiceClient::new(Arc::clone(&self.http_client))
    }

    /// Client for a named model; either a short id or a full resource name.
    pub fn generative_model(&self, model_name: impl Into<String>) -> GenerativeModelClient {
        GenerativeModelClient::new(Arc::clone(&self.http_client), model_name)
    }

    pub fn http_client(&self) -> &HttpClient {
        &self.http_client
    }

    pub fn base_url(&self) -> &str {
        &self.http_client.config().base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genai_eval_core::GenerativeModel;

    #[test]
    fn test_client_new() {
        let client = GenAiClient::new(
            SdkConfig::new("https://api.example.com").with_bearer_token("token"),
        )
        .unwrap();
        assert_eq!(client.base_url(), "https://api.example.com");
        assert_eq!(client.generative_model("m").model_name(), "m");
    }

    #[test]
    fn test_invalid_config() {
        assert!(GenAiClient::new(SdkConfig::new("::not a url::")).is_err());
    }
}
