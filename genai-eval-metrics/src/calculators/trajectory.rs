use async_trait::async_trait;
use genai_eval_core::{EvalError, MetricCalculator, Result, ToolCall, TrajectoryMetricKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::MetricOutput;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrajectoryInput {
    pub predicted: Vec<ToolCall>,
    pub reference: Option<Vec<ToolCall>>,
}

/// A tool call with its input decoded, so key order and spacing do not matter.
#[derive(Debug, Clone, PartialEq)]
struct Step {
    name: String,
    input: Value,
}

impl From<&ToolCall> for Step {
    fn from(call: &ToolCall) -> Self {
        let input = serde_json::from_str(&call.tool_input)
            .unwrap_or_else(|_| Value::String(call.tool_input.clone()));
        Self {
            name: call.tool_name.clone(),
            input,
        }
    }
}

fn steps(calls: &[ToolCall]) -> Vec<Step> {
    calls.iter().map(Step::from).collect()
}

#[derive(Debug, Clone)]
pub struct TrajectoryCalculator {
    pub kind: TrajectoryMetricKind,
}

impl TrajectoryCalculator {
    pub fn new(kind: TrajectoryMetricKind) -> Self {
        Self { kind }
    }

    fn in_order(predicted: &[Step], reference: &[Step]) -> bool {
        let mut remaining = predicted.iter();
        reference
            .iter()
            .all(|wanted| remaining.any(|step| step == wanted))
    }

    fn any_order(predicted: &[Step], reference: &[Step]) -> bool {
        let mut unused: Vec<&Step> = predicted.iter().collect();
        reference.iter().all(|wanted| {
            match unused.iter().position(|step| *step == wanted) {
                Some(index) => {
                    unused.swap_remove(index);
                    true
                }
                None => false,
            }
        })
    }

    fn fraction_found(numerator_side: &[Step], lookup_side: &[Step]) -> f64 {
        if numerator_side.is_empty() {
            return 0.0;
        }
        let found = numerator_side
            .iter()
            .filter(|step| lookup_side.contains(step))
            .count();
        found as f64 / numerator_side.len() as f64
    }

    pub fn score(&self, predicted: &[ToolCall], reference: Option<&[ToolCall]>) -> Result<f64> {
        let predicted = steps(predicted);
        let reference = || {
            reference.map(steps).ok_or_else(|| {
                EvalError::Validation(
                    "trajectory metric requires a reference trajectory".to_string(),
                )
            })
        };
        let flag = |b: bool| if b { 1.0 } else { 0.0 };

        Ok(match &self.kind {
            TrajectoryMetricKind::SingleToolUse { tool_name } => {
                flag(predicted.iter().any(|step| &step.name == tool_name))
            }
            TrajectoryMetricKind::ExactMatch => flag(predicted == reference()?),
            TrajectoryMetricKind::InOrderMatch => flag(Self::in_order(&predicted, &reference()?)),
            TrajectoryMetricKind::AnyOrderMatch => {
                flag(Self::any_order(&predicted, &reference()?))
            }
            TrajectoryMetricKind::Precision => Self::fraction_found(&predicted, &reference()?),
            TrajectoryMetricKind::Recall => Self::fraction_found(&reference()?, &predicted),
        })
    }
}

#[async_trait]
impl MetricCalculator for TrajectoryCalculator {
    type Input = TrajectoryInput;
    type Output = MetricOutput;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        let score = self.score(&input.predicted, input.reference.as_deref())?;
        Ok(MetricOutput {
            score,
            metadata: json!({
                "metric": "trajectory",
                "kind": self.kind,
                "predicted_len": input.predicted.len(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, input: Value) -> ToolCall {
        ToolCall::new(name, &input)
    }

    #[test]
    fn test_input_key_order_is_irrelevant() {
        let a = ToolCall {
            tool_name: "f".into(),
            tool_input: r#"{"a":1,"b":2}"#.into(),
        };
        let b = ToolCall {
            tool_name: "f".into(),
            tool_input: r#"{ "b": 2, "a": 1 }"#.into(),
        };
        let calc = TrajectoryCalculator::new(TrajectoryMetricKind::ExactMatch);
        assert_eq!(calc.score(&[a], Some(&[b])).unwrap(), 1.0);
    }

    #[test]
    fn test_any_order_respects_multiplicity() {
        let calc = TrajectoryCalculator::new(TrajectoryMetricKind::AnyOrderMatch);
        let x = call("x", json!({}));
        assert_eq!(
            calc.score(&[x.clone()], Some(&[x.clone(), x.clone()])).unwrap(),
            0.0
        );
    }
}
