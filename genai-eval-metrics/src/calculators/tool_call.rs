//! Tool-call metrics over model outputs of the form
//! `{"content": "...", "tool_calls": [{"name": "...", "arguments": {...}}]}`.

use async_trait::async_trait;
use genai_eval_core::{EvalError, MetricCalculator, Result};
use serde_json::{json, Map, Value};

use super::{MetricInput, MetricOutput};

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// Parse the `tool_calls` list out of a prediction or reference string.
pub fn parse_tool_calls(text: &str) -> Result<Vec<ParsedToolCall>> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| EvalError::Parse(format!("tool call output is not JSON: {}", e)))?;
    let calls = match value.get("tool_calls") {
        Some(Value::Array(calls)) => calls,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            return Err(EvalError::Parse(format!(
                "`tool_calls` must be a list, got {}",
                other
            )))
        }
    };

    calls
        .iter()
        .map(|call| {
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| EvalError::Parse(format!("tool call without `name`: {}", call)))?;
            let arguments = match call.get("arguments") {
                Some(Value::Object(map)) => map.clone(),
                Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
                    Ok(Value::Object(map)) => map,
                    _ => {
                        return Err(EvalError::Parse(format!(
                            "arguments of `{}` are not a JSON object",
                            name
                        )))
                    }
                },
                _ => {
                    return Err(EvalError::Parse(format!(
                        "tool call `{}` without object `arguments`",
                        name
                    )))
                }
            };
            Ok(ParsedToolCall {
                name: name.to_string(),
                arguments,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallCheck {
    Valid,
    NameMatch,
    ParameterKeyMatch,
    ParameterKvMatch { use_strict_string_match: bool },
}

impl ToolCallCheck {
    fn metric_name(&self) -> &'static str {
        match self {
            ToolCallCheck::Valid => "tool_call_valid",
            ToolCallCheck::NameMatch => "tool_name_match",
            ToolCallCheck::ParameterKeyMatch => "tool_parameter_key_match",
            ToolCallCheck::ParameterKvMatch { .. } => "tool_parameter_kv_match",
        }
    }
}

/// Binary tool-call scoring: 1.0 when every aligned call passes the check.
#[derive(Debug, Clone)]
pub struct ToolCallCalculator {
    pub check: ToolCallCheck,
}

impl ToolCallCalculator {
    pub fn new(check: ToolCallCheck) -> Self {
        Self { check }
    }

    fn values_match(predicted: &Value, reference: &Value, strict: bool) -> bool {
        if strict {
            return predicted == reference;
        }
        let normalize = |v: &Value| match v {
            Value::String(s) => s.trim().to_lowercase(),
            other => other.to_string().to_lowercase(),
        };
        normalize(predicted) == normalize(reference)
    }

    fn pair_matches(&self, predicted: &ParsedToolCall, reference: &ParsedToolCall) -> bool {
        match self.check {
            ToolCallCheck::Valid => true,
            ToolCallCheck::NameMatch => predicted.name == reference.name,
            ToolCallCheck::ParameterKeyMatch => {
                predicted.arguments.len() == reference.arguments.len()
                    && reference
                        .arguments
                        .keys()
                        .all(|k| predicted.arguments.contains_key(k))
            }
            ToolCallCheck::ParameterKvMatch {
                use_strict_string_match,
            } => {
                predicted.arguments.len() == reference.arguments.len()
                    && reference.arguments.iter().all(|(k, v)| {
                        predicted
                            .arguments
                            .get(k)
                            .is_some_and(|p| Self::values_match(p, v, use_strict_string_match))
                    })
            }
        }
    }

    pub fn score(&self, prediction: &str, reference: Option<&str>) -> Result<f64> {
        let predicted = match parse_tool_calls(prediction) {
            Ok(calls) => calls,
            Err(_) => return Ok(0.0),
        };
        if self.check == ToolCallCheck::Valid {
            return Ok(if predicted.is_empty() { 0.0 } else { 1.0 });
        }

        let reference = reference.ok_or_else(|| {
            EvalError::Validation(format!("{} requires a reference", self.check.metric_name()))
        })?;
        let expected = parse_tool_calls(reference)?;
        if predicted.len() != expected.len() {
            return Ok(0.0);
        }
        let all = predicted
            .iter()
            .zip(&expected)
            .all(|(p, r)| self.pair_matches(p, r));
        Ok(if all { 1.0 } else { 0.0 })
    }
}

#[async_trait]
impl MetricCalculator for ToolCallCalculator {
    type Input = MetricInput;
    type Output = MetricOutput;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        let score = self.score(&input.prediction, input.reference.as_deref())?;
        Ok(MetricOutput {
            score,
            metadata: json!({ "metric": self.check.metric_name() }),
        })
    }
}
