use async_trait::async_trait;
use genai_eval_core::{EvalError, MetricCalculator, Result};
use serde_json::json;

use super::{MetricInput, MetricOutput};

/// Scores 1.0 when the prediction equals the reference, 0.0 otherwise.
#[derive(Debug, Clone, Default)]
pub struct ExactMatchCalculator;

impl ExactMatchCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, prediction: &str, reference: &str) -> f64 {
        if prediction == reference {
            1.0
        } else {
            0.0
        }
    }
}

#[async_trait]
impl MetricCalculator for ExactMatchCalculator {
    type Input = MetricInput;
    type Output = MetricOutput;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        let reference = input
            .reference
            .ok_or_else(|| EvalError::Validation("exact_match requires a reference".to_string()))?;

        Ok(MetricOutput {
            score: self.score(&input.prediction, &reference),
            metadata: json!({
                "metric": "exact_match",
            }),
        })
    }
}
