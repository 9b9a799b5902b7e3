use async_trait::async_trait;

use crate::domain::judge::{EvaluateInstancesRequest, EvaluateInstancesResponse};
use crate::domain::model::{GenerationResponse, ModelPrompt, RunnableOutput};
use crate::error::{JudgeError, Result};

/// A remote or local generative model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate_content(&self, prompt: ModelPrompt) -> Result<GenerationResponse>;
}

/// An agent that answers a query and may record tool calls on the way.
#[async_trait]
pub trait Runnable: Send + Sync {
    async fn query(&self, input: &str) -> Result<RunnableOutput>;
}

/// The judge service. One request, one response; retries are the caller's concern.
#[async_trait]
pub trait EvaluationService: Send + Sync {
    async fn evaluate_instances(
        &self,
        request: EvaluateInstancesRequest,
    ) -> std::result::Result<EvaluateInstancesResponse, JudgeError>;
}

#[async_trait]
pub trait MetricCalculator {
    type Input;
    type Output;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output>;
}
