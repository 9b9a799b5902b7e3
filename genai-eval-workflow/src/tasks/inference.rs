use async_trait::async_trait;
use genai_eval_core::{
    probe_multimodal, value_to_text, EvalError, GenerationResponse, ModelAdapter, ModelPrompt,
    MultimodalMode, PromptTemplate, Result, RunnableAdapter, BASELINE_MODEL_RESPONSE_COLUMN,
    FAILURE_COLUMN, LATENCY_COLUMN, PREDICTED_TRAJECTORY_COLUMN, PROMPT_COLUMN, RESPONSE_COLUMN,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{Task, TaskContext, TaskReport};
use crate::rate_limiter::RateLimiter;

/// Prefix of the response recorded for a row whose inference never succeeded.
pub const INFERENCE_ERROR_PREFIX: &str = "Error: ";

/// Fills the `prompt` column from a template before inference.
pub struct PromptAssemblyTask {
    template: PromptTemplate,
}

impl PromptAssemblyTask {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }
}

#[async_trait]
impl Task for PromptAssemblyTask {
    async fn execute(&self, context: &mut TaskContext) -> Result<TaskReport> {
        let prompts = context
            .mapping
            .assemble_prompts(&self.template, &context.dataset)?;
        let processed = prompts.len();
        context.dataset.set_column(
            PROMPT_COLUMN,
            prompts.into_iter().map(Value::String).collect(),
        )?;
        context.mapping.set(PROMPT_COLUMN, PROMPT_COLUMN);
        Ok(TaskReport::completed(processed, 0))
    }

    fn name(&self) -> &str {
        "prompt_assembly"
    }
}

/// Which adapter produces the responses.
#[derive(Debug, Clone)]
pub enum InferenceTarget {
    Model(ModelAdapter),
    Runnable(RunnableAdapter),
}

impl InferenceTarget {
    pub fn name(&self) -> String {
        match self {
            InferenceTarget::Model(model) => model.name(),
            InferenceTarget::Runnable(runnable) => runnable.name().to_string(),
        }
    }
}

/// Outcome of inference for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutcome {
    pub response: String,
    pub latency_in_seconds: Option<f64>,
    pub failure: u8,
    pub predicted_trajectory: Option<Value>,
}

impl InferenceOutcome {
    fn failed(reason: &str) -> Self {
        Self {
            response: format!("{}{}", INFERENCE_ERROR_PREFIX, reason),
            latency_in_seconds: None,
            failure: 1,
            predicted_trajectory: None,
        }
    }
}

struct Generated {
    text: String,
    trajectory: Option<Value>,
}

/// Runs the candidate, a runnable, or the baseline over every row.
pub struct InferenceTask {
    target: InferenceTarget,
    response_column: &'static str,
}

impl InferenceTask {
    pub fn candidate(model: ModelAdapter) -> Self {
        Self {
            target: InferenceTarget::Model(model),
            response_column: RESPONSE_COLUMN,
        }
    }

    pub fn runnable(runnable: RunnableAdapter) -> Self {
        Self {
            target: InferenceTarget::Runnable(runnable),
            response_column: RESPONSE_COLUMN,
        }
    }

    pub fn baseline(model: ModelAdapter) -> Self {
        Self {
            target: InferenceTarget::Model(model),
            response_column: BASELINE_MODEL_RESPONSE_COLUMN,
        }
    }

    pub fn target(&self) -> &InferenceTarget {
        &self.target
    }

    fn is_candidate(&self) -> bool {
        self.response_column == RESPONSE_COLUMN
    }
}

#[async_trait]
impl Task for InferenceTask {
    async fn execute(&self, context: &mut TaskContext) -> Result<TaskReport> {
        let prompt_column = context.mapping.resolve(PROMPT_COLUMN).to_string();
        if !context.dataset.has_column(&prompt_column) {
            return Err(EvalError::Configuration(format!(
                "Inference needs a `{}` column or a prompt template; available columns: {:?}",
                prompt_column,
                context.dataset.columns()
            )));
        }

        let max_workers = match self.target {
            InferenceTarget::Model(_) => context.config.max_workers,
            InferenceTarget::Runnable(_) => context.config.runnable_max_workers,
        };
        let limiter = Arc::new(RateLimiter::new(context.config.generation_qps)?);
        let attempts = context.config.max_inference_attempts.max(1);
        let mode = context.config.multimodal_mode;

        info!(
            adapter = %self.target.name(),
            column = self.response_column,
            rows = context.dataset.len(),
            max_workers,
            "Generating responses"
        );

        let mut jobs = Vec::with_capacity(context.dataset.len());
        for (row_index, value) in context.dataset.column_values(&prompt_column).into_iter().enumerate() {
            let prompt = model_prompt(&value, mode)?;
            let target = self.target.clone();
            let limiter = Arc::clone(&limiter);
            jobs.push(async move { infer_row(target, prompt, limiter, attempts, row_index).await });
        }

        let outcomes = context
            .pool(&format!("inference:{}", self.response_column), max_workers)
            .run(jobs)
            .await?;

        let failed = outcomes.iter().filter(|o| o.failure == 1).count();
        let processed = outcomes.len();
        let mut responses = Vec::with_capacity(processed);
        let mut latencies = Vec::with_capacity(processed);
        let mut failures = Vec::with_capacity(processed);
        let mut trajectories = Vec::with_capacity(processed);
        for outcome in outcomes {
            responses.push(Value::String(outcome.response));
            latencies.push(outcome.latency_in_seconds.map(|l| json!(l)).unwrap_or(Value::Null));
            failures.push(json!(outcome.failure));
            trajectories.push(outcome.predicted_trajectory.unwrap_or(Value::Null));
        }

        context.dataset.set_column(self.response_column, responses)?;
        context.mapping.set(self.response_column, self.response_column);
        if self.is_candidate() {
            context.dataset.set_column(LATENCY_COLUMN, latencies)?;
            context.dataset.set_column(FAILURE_COLUMN, failures)?;
        }
        if matches!(self.target, InferenceTarget::Runnable(_)) {
            context
                .dataset
                .set_column(PREDICTED_TRAJECTORY_COLUMN, trajectories)?;
            context
                .mapping
                .set(PREDICTED_TRAJECTORY_COLUMN, PREDICTED_TRAJECTORY_COLUMN);
        }

        if failed > 0 {
            warn!(failed, total = processed, column = self.response_column, "Some rows failed inference");
        }
        Ok(TaskReport::completed(processed, failed))
    }

    fn name(&self) -> &str {
        if self.is_candidate() {
            "candidate_inference"
        } else {
            "baseline_inference"
        }
    }
}

/// A prompt cell as a model prompt; multimodal cells become parts.
pub(crate) fn model_prompt(value: &Value, mode: MultimodalMode) -> Result<ModelPrompt> {
    Ok(match probe_multimodal(value, mode)? {
        Some(list) => ModelPrompt::Parts(list.parts().cloned().collect()),
        None => ModelPrompt::Text(value_to_text(value)),
    })
}

async fn infer_row(
    target: InferenceTarget,
    prompt: ModelPrompt,
    limiter: Arc<RateLimiter>,
    attempts: u32,
    row_index: usize,
) -> InferenceOutcome {
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        limiter.sleep_and_advance().await;
        let started = Instant::now();
        let result = match &target {
            InferenceTarget::Model(model) => generate_text(model, prompt.clone())
                .await
                .map(|text| Generated {
                    text,
                    trajectory: None,
                }),
            InferenceTarget::Runnable(runnable) => run_agent(runnable, prompt.to_text()).await,
        };
        match result {
            Ok(generated) => {
                return InferenceOutcome {
                    response: generated.text,
                    latency_in_seconds: Some(started.elapsed().as_secs_f64()),
                    failure: 0,
                    predicted_trajectory: generated.trajectory,
                }
            }
            Err(reason) => {
                warn!(row = row_index, attempt, attempts, reason = %reason, "Inference attempt failed");
                last_error = reason;
            }
        }
    }
    InferenceOutcome::failed(&last_error)
}

/// One generation call; failures come back as a human-readable reason.
pub(crate) async fn generate_text(model: &ModelAdapter, prompt: ModelPrompt) -> std::result::Result<String, String> {
    match model {
        ModelAdapter::Generative(model) => {
            let response = model
                .generate_content(prompt)
                .await
                .map_err(|e| e.to_string())?;
            response_text(&response)
        }
        ModelAdapter::Callable { func, .. } => {
            let func = Arc::clone(func);
            let text = prompt.to_text();
            tokio::task::spawn_blocking(move || func(&text))
                .await
                .map_err(|e| format!("model callable panicked: {}", e))?
                .map_err(|e| e.to_string())
        }
    }
}

fn response_text(response: &GenerationResponse) -> std::result::Result<String, String> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        let message = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason_message.as_deref())
            .unwrap_or_default();
        return Err(format!("prompt blocked ({}) {}", reason, message).trim_end().to_string());
    }
    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| "model returned no candidates".to_string())?;
    if let Some(finish_reason) = candidate.finish_reason {
        if !finish_reason.is_successful() {
            return Err(format!("unsuccessful finish reason {:?}", finish_reason));
        }
    }
    match response.text() {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err("candidate text is empty".to_string()),
        None => Err("candidate has no content".to_string()),
    }
}

async fn run_agent(runnable: &RunnableAdapter, input: String) -> std::result::Result<Generated, String> {
    match runnable {
        RunnableAdapter::Runnable { runnable, .. } => {
            let output = runnable.query(&input).await.map_err(|e| e.to_string())?;
            let trajectory: Vec<Value> = output
                .intermediate_steps
                .iter()
                .map(|step| json!({"tool_name": step.tool, "tool_input": step.tool_input}))
                .collect();
            Ok(Generated {
                text: output.output,
                trajectory: Some(Value::Array(trajectory)),
            })
        }
        RunnableAdapter::Callable { func, .. } => {
            let func = Arc::clone(func);
            let response = tokio::task::spawn_blocking(move || func(&input))
                .await
                .map_err(|e| format!("agent callable panicked: {}", e))?
                .map_err(|e| e.to_string())?;
            let text = response
                .response
                .ok_or_else(|| "agent returned no response".to_string())?;
            Ok(Generated {
                text,
                trajectory: response.predicted_trajectory,
            })
        }
    }
}
