//! Evaluation service client
//!
//! Sends judge requests to the hosted `evaluateInstances` endpoint.

use crate::client::HttpClient;
use async_trait::async_trait;
use genai_eval_core::{
    EvaluateInstancesRequest, EvaluateInstancesResponse, EvaluationService, JudgeError,
};
use std::sync::Arc;
use tracing::debug;

/// Client for the judge endpoint
#[derive(Debug, Clone)]
pub struct EvaluationServiceClient {
    client: Arc<HttpClient>,
}

impl EvaluationServiceClient {
    /// Create a new evaluation service client
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    /// Endpoint path, relative to the base URL
    pub fn endpoint(&self) -> String {
        match self.client.config().parent() {
            Some(parent) => format!("{}:evaluateInstances", parent),
            None => "evaluateInstances".to_string(),
        }
    }
}

#[async_trait]
impl EvaluationService for EvaluationServiceClient {
    async fn evaluate_instances(
        &self,
        request: EvaluateInstancesRequest,
    ) -> Result<EvaluateInstancesResponse, JudgeError> {
        let endpoint = self.endpoint();
        debug!(endpoint = %endpoint, "Sending evaluation request");
        self.client
            .post(&endpoint, &request)
            .await
            .map_err(JudgeError::from)
    }
}
