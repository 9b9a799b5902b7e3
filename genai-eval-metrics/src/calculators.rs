pub mod bleu;
pub mod exact_match;
pub mod rouge;
pub mod tool_call;
pub mod trajectory;

pub use bleu::*;
pub use exact_match::*;
pub use rouge::*;
pub use tool_call::*;
pub use trajectory::*;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricInput {
    pub prediction: String,
    pub reference: Option<String>,
}

impl MetricInput {
    pub fn new(prediction: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            prediction: prediction.into(),
            reference: Some(reference.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricOutput {
    pub score: f64,
    pub metadata: serde_json::Value,
}
