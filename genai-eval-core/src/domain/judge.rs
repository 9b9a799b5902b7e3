//! Request and response types exchanged with the judge service.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::content::ContentMap;
use super::metric::{AutomaticMetricKind, AutoraterConfig, TrajectoryMetricKind};
use crate::error::{EvalError, Result};

/// A tool call as sent to the judge; `tool_input` is serialized JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub tool_input: String,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, tool_input: &Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_input: tool_input.to_string(),
        }
    }
}

/// Convert a trajectory cell (a JSON array, or a string holding one) into tool calls.
pub fn trajectory_from_value(value: &Value) -> Result<Vec<ToolCall>> {
    let parsed;
    let items = match value {
        Value::Array(items) => items,
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text)
                .map_err(|e| EvalError::Parse(format!("trajectory is not valid JSON: {}", e)))?;
            match &parsed {
                Value::Array(items) => items,
                other => {
                    return Err(EvalError::Parse(format!(
                        "trajectory must be a list, got {}",
                        other
                    )))
                }
            }
        }
        other => {
            return Err(EvalError::Parse(format!(
                "trajectory must be a list, got {}",
                other
            )))
        }
    };

    items
        .iter()
        .map(|item| {
            let name = item
                .get("tool_name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    EvalError::Parse(format!("tool call without `tool_name`: {}", item))
                })?;
            let input = item.get("tool_input").cloned().unwrap_or(Value::Null);
            Ok(ToolCall::new(name, &input))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomaticInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectoryInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_trajectory: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_trajectory: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomOutputFormatConfig {
    pub return_raw_output: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointwiseMetricSpec {
    pub metric_prompt_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_output_format_config: Option<CustomOutputFormatConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairwiseMetricSpec {
    pub metric_prompt_template: String,
    pub candidate_response_field_name: String,
    pub baseline_response_field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_output_format_config: Option<CustomOutputFormatConfig>,
}

/// Model-based instance payload: flat JSON when every input is text, a content map otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceInput {
    JsonInstance(String),
    ContentMapInstance(ContentMap),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvaluationInput {
    Automatic {
        spec: AutomaticMetricKind,
        instance: AutomaticInstance,
    },
    Trajectory {
        spec: TrajectoryMetricKind,
        instance: TrajectoryInstance,
    },
    Pointwise {
        spec: PointwiseMetricSpec,
        instance: InstanceInput,
    },
    Pairwise {
        spec: PairwiseMetricSpec,
        instance: InstanceInput,
    },
    RubricBasedInstructionFollowing {
        instance: InstanceInput,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateInstancesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autorater_config: Option<AutoraterConfig>,
    pub input: EvaluationInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairwiseChoice {
    PairwiseChoiceUnspecified,
    Baseline,
    Candidate,
    Tie,
}

impl PairwiseChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairwiseChoice::PairwiseChoiceUnspecified => "PAIRWISE_CHOICE_UNSPECIFIED",
            PairwiseChoice::Baseline => "BASELINE",
            PairwiseChoice::Candidate => "CANDIDATE",
            PairwiseChoice::Tie => "TIE",
        }
    }
}

impl fmt::Display for PairwiseChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomOutput {
    #[serde(default)]
    pub raw_outputs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointwiseResult {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_output: Option<CustomOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairwiseResult {
    #[serde(default)]
    pub pairwise_choice: Option<PairwiseChoice>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_output: Option<CustomOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricCritiqueResult {
    pub rubric: String,
    #[serde(default)]
    pub verdict: Option<bool>,
}

/// Exactly one populated result family per response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvaluationResults {
    Automatic {
        metric: String,
        scores: Vec<MetricValue>,
    },
    Trajectory {
        metric: String,
        scores: Vec<MetricValue>,
    },
    Pointwise(PointwiseResult),
    Pairwise(PairwiseResult),
    RubricBasedInstructionFollowing {
        #[serde(default)]
        score: Option<f64>,
        #[serde(default)]
        rubric_critique_results: Vec<RubricCritiqueResult>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateInstancesResponse {
    pub results: EvaluationResults,
}

impl EvaluateInstancesResponse {
    pub fn pointwise(score: f64, explanation: impl Into<String>) -> Self {
        Self {
            results: EvaluationResults::Pointwise(PointwiseResult {
                score: Some(score),
                explanation: Some(explanation.into()),
                ..Default::default()
            }),
        }
    }

    pub fn pairwise(choice: PairwiseChoice, explanation: impl Into<String>) -> Self {
        Self {
            results: EvaluationResults::Pairwise(PairwiseResult {
                pairwise_choice: Some(choice),
                explanation: Some(explanation.into()),
                ..Default::default()
            }),
        }
    }

    /// A pointwise response that carries only raw judge text.
    pub fn raw_pointwise(raw_outputs: Vec<String>) -> Self {
        Self {
            results: EvaluationResults::Pointwise(PointwiseResult {
                custom_output: Some(CustomOutput { raw_outputs }),
                ..Default::default()
            }),
        }
    }

    pub fn raw_pairwise(raw_outputs: Vec<String>) -> Self {
        Self {
            results: EvaluationResults::Pairwise(PairwiseResult {
                custom_output: Some(CustomOutput { raw_outputs }),
                ..Default::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trajectory_from_string_and_array() {
        let from_array = trajectory_from_value(&json!([
            {"tool_name": "search", "tool_input": {"q": "rust"}}
        ]))
        .unwrap();
        let from_string =
            trajectory_from_value(&json!(r#"[{"tool_name":"search","tool_input":{"q":"rust"}}]"#))
                .unwrap();
        assert_eq!(from_array, from_string);
        assert_eq!(from_array[0].tool_input, r#"{"q":"rust"}"#);
    }

    #[test]
    fn test_malformed_trajectory() {
        assert!(trajectory_from_value(&json!("not json")).is_err());
        assert!(trajectory_from_value(&json!([{"tool_input": {}}])).is_err());
        assert!(trajectory_from_value(&json!(3)).is_err());
    }

    #[test]
    fn test_results_are_tagged() {
        let response = EvaluateInstancesResponse::pairwise(PairwiseChoice::Tie, "close");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["results"]["type"], "pairwise");
        assert_eq!(value["results"]["pairwise_choice"], "TIE");
    }
}
