//! Generative model client
//!
//! Calls `models/{model}:generateContent` and exposes the endpoint as a
//! [`GenerativeModel`] for inference and rubric generation.

use crate::client::HttpClient;
use async_trait::async_trait;
use genai_eval_core::{
    Content, EvalError, GenerationResponse, GenerativeModel, ModelPrompt, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Sampling parameters forwarded with every request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
}

/// Request body of `generateContent`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// A hosted generative model
#[derive(Debug, Clone)]
pub struct GenerativeModelClient {
    client: Arc<HttpClient>,
    model_name: String,
    system_instruction: Option<String>,
    generation_config: Option<GenerationConfig>,
}

impl GenerativeModelClient {
    pub fn new(client: Arc<HttpClient>, model_name: impl Into<String>) -> Self {
        Self {
            client,
            model_name: model_name.into(),
            system_instruction: None,
            generation_config: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    /// Endpoint path, relative to the base URL
    pub fn endpoint(&self) -> String {
        let resource = if self.model_name.contains('/') {
            self.model_name.clone()
        } else {
            format!("models/{}", self.model_name)
        };
        format!("{}:generateContent", self.client.scoped_path(&resource))
    }

    /// Build the request body for a prompt
    pub fn request_for(&self, prompt: ModelPrompt) -> GenerateContentRequest {
        let mut content = match prompt {
            ModelPrompt::Text(text) => Content::text(text),
            ModelPrompt::Parts(parts) => Content::from_parts(parts),
        };
        content.role = Some("user".to_string());

        GenerateContentRequest {
            contents: vec![content],
            system_instruction: self.system_instruction.clone().map(Content::text),
            generation_config: self.generation_config.clone(),
        }
    }
}

#[async_trait]
impl GenerativeModel for GenerativeModelClient {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate_content(&self, prompt: ModelPrompt) -> Result<GenerationResponse> {
        let endpoint = self.endpoint();
        debug!(model = %self.model_name, endpoint = %endpoint, "Generating content");
        self.client
            .post(&endpoint, &self.request_for(prompt))
            .await
            .map_err(|e| EvalError::Inference(format!("{}: {}", self.model_name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SdkConfig;
    use genai_eval_core::Part;

    fn client(config: SdkConfig) -> Arc<HttpClient> {
        Arc::new(HttpClient::new(config).unwrap())
    }

    #[test]
    fn test_endpoint_for_short_and_full_names() {
        let short = GenerativeModelClient::new(
            client(SdkConfig::new("https://api.example.com/v1")),
            "gemini-1.5-pro",
        );
        assert_eq!(short.endpoint(), "models/gemini-1.5-pro:generateContent");

        let scoped = GenerativeModelClient::new(
            client(SdkConfig::new("https://api.example.com/v1").with_project("p", "us-central1")),
            "publishers/google/models/gemini",
        );
        assert_eq!(
            scoped.endpoint(),
            "projects/p/locations/us-central1/publishers/google/models/gemini:generateContent"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let model = GenerativeModelClient::new(
            client(SdkConfig::new("https://api.example.com")),
            "m",
        )
        .with_system_instruction("be brief")
        .with_generation_config(GenerationConfig {
            temperature: Some(0.0),
            max_output_tokens: Some(64),
            ..Default::default()
        });

        let body = serde_json::to_value(model.request_for(ModelPrompt::Parts(vec![
            Part::text("describe"),
            Part::from_uri("gs://b/cat.png", "image/png"),
        ])))
        .unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
        assert!(body["generationConfig"].get("topK").is_none());
    }
}
