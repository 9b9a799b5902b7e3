use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::content::{Content, Part};
use crate::error::Result;
use crate::traits::{GenerativeModel, Runnable};

/// Prompt handed to a generative model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelPrompt {
    Text(String),
    Parts(Vec<Part>),
}

impl ModelPrompt {
    /// Flatten to text; file parts are rendered as their URI.
    pub fn to_text(&self) -> String {
        match self {
            ModelPrompt::Text(text) => text.clone(),
            ModelPrompt::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    Part::Text(text) => text.clone(),
                    Part::FileData(file) => file.file_uri.clone(),
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

impl From<&str> for ModelPrompt {
    fn from(text: &str) -> Self {
        ModelPrompt::Text(text.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    FinishReasonUnspecified,
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Language,
    Blocklist,
    ProhibitedContent,
    Spii,
    MalformedFunctionCall,
    #[serde(other)]
    Other,
}

impl FinishReason {
    pub fn is_successful(&self) -> bool {
        matches!(
            self,
            FinishReason::Stop | FinishReason::MaxTokens | FinishReason::FinishReasonUnspecified
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default, alias = "finish_reason")]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default, alias = "block_reason")]
    pub block_reason: Option<String>,
    #[serde(default, alias = "block_reason_message")]
    pub block_reason_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, alias = "prompt_feedback")]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl GenerationResponse {
    /// A single successful text candidate.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content::text(text)),
                finish_reason: Some(FinishReason::Stop),
            }],
            prompt_feedback: None,
        }
    }

    /// Concatenated text parts of the first candidate.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().filter_map(Part::as_text).collect();
        Some(text)
    }
}

/// One tool invocation recorded by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateStep {
    pub tool: String,
    #[serde(default)]
    pub tool_input: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnableOutput {
    pub output: String,
    #[serde(default)]
    pub intermediate_steps: Vec<IntermediateStep>,
}

/// What a callable agent returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub predicted_trajectory: Option<Value>,
}

pub type TextFn = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;
pub type AgentFn = Arc<dyn Fn(&str) -> Result<AgentResponse> + Send + Sync>;

/// A candidate, baseline or rubric generator model.
#[derive(Clone)]
pub enum ModelAdapter {
    Generative(Arc<dyn GenerativeModel>),
    Callable { name: String, func: TextFn },
}

impl ModelAdapter {
    pub fn generative(model: impl GenerativeModel + 'static) -> Self {
        ModelAdapter::Generative(Arc::new(model))
    }

    pub fn from_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        ModelAdapter::Callable {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> String {
        match self {
            ModelAdapter::Generative(model) => model.model_name().to_string(),
            ModelAdapter::Callable { name, .. } => name.clone(),
        }
    }

    /// Two adapters are the same model when they share a name.
    pub fn same_model(&self, other: &ModelAdapter) -> bool {
        self.name() == other.name()
    }
}

impl fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelAdapter::Generative(model) => f
                .debug_tuple("Generative")
                .field(&model.model_name())
                .finish(),
            ModelAdapter::Callable { name, .. } => {
                f.debug_struct("Callable").field("name", name).finish()
            }
        }
    }
}

/// An agent under evaluation.
#[derive(Clone)]
pub enum RunnableAdapter {
    Runnable { name: String, runnable: Arc<dyn Runnable> },
    Callable { name: String, func: AgentFn },
}

impl RunnableAdapter {
    pub fn new(name: impl Into<String>, runnable: impl Runnable + 'static) -> Self {
        RunnableAdapter::Runnable {
            name: name.into(),
            runnable: Arc::new(runnable),
        }
    }

    pub fn from_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Result<AgentResponse> + Send + Sync + 'static,
    {
        RunnableAdapter::Callable {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RunnableAdapter::Runnable { name, .. } | RunnableAdapter::Callable { name, .. } => name,
        }
    }
}

impl fmt::Debug for RunnableAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnableAdapter")
            .field("name", &self.name())
            .finish()
    }
}
