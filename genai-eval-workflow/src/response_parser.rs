use genai_eval_core::{
    CritiqueMetric, CustomOutputConfig, EvalError, EvaluateInstancesResponse, EvaluationResults,
    Metric, Result, Row,
};
use serde_json::{json, Value};

pub const ERROR_EXPLANATION: &str = "Error";

/// Fields extracted from one judge response, before they are prefixed with the metric name.
pub fn parse_response(metric: &Metric, response: &EvaluateInstancesResponse) -> Result<Row> {
    check_family(metric, &response.results)?;
    let mut row = Row::new();
    match &response.results {
        EvaluationResults::Automatic { scores, .. } | EvaluationResults::Trajectory { scores, .. } => {
            let score = scores.first().and_then(|v| v.score);
            row.insert("score".to_string(), number(score));
        }
        EvaluationResults::Pointwise(result) => {
            if let Some(config) = raw_output_config(metric) {
                let raw = result
                    .custom_output
                    .as_ref()
                    .map(|c| c.raw_outputs.clone())
                    .unwrap_or_default();
                return parse_raw(config, &raw);
            }
            row.insert("score".to_string(), number(result.score));
            row.insert("explanation".to_string(), text(result.explanation.as_deref()));
        }
        EvaluationResults::Pairwise(result) => {
            if let Some(config) = raw_output_config(metric) {
                let raw = result
                    .custom_output
                    .as_ref()
                    .map(|c| c.raw_outputs.clone())
                    .unwrap_or_default();
                return parse_raw(config, &raw);
            }
            row.insert(
                "pairwise_choice".to_string(),
                text(result.pairwise_choice.map(|c| c.as_str())),
            );
            row.insert("explanation".to_string(), text(result.explanation.as_deref()));
        }
        EvaluationResults::RubricBasedInstructionFollowing {
            score,
            rubric_critique_results,
        } => {
            let verdicts: Vec<Value> = rubric_critique_results
                .iter()
                .map(|r| json!({"rubric": r.rubric, "verdict": r.verdict.unwrap_or(false)}))
                .collect();
            row.insert(
                "rubric_level_instruction_following".to_string(),
                Value::Array(verdicts),
            );
            row.insert("score".to_string(), number(*score));
        }
    }
    Ok(row)
}

/// Fields recorded for a row whose judge call failed.
pub fn error_fields(metric: &Metric) -> Row {
    let mut row = Row::new();
    if metric.is_pairwise() {
        row.insert("pairwise_choice".to_string(), Value::Null);
    } else {
        row.insert("score".to_string(), Value::Null);
    }
    row.insert(
        "explanation".to_string(),
        Value::String(ERROR_EXPLANATION.to_string()),
    );
    row
}

fn raw_output_config(metric: &Metric) -> Option<&CustomOutputConfig> {
    let config = match metric {
        Metric::Pointwise(m) => m.custom_output_config.as_ref(),
        Metric::Pairwise(m) => m.custom_output_config.as_ref(),
        Metric::RubricBased(m) => match &m.critique_metric {
            CritiqueMetric::Pointwise(c) => c.custom_output_config.as_ref(),
            CritiqueMetric::Pairwise(c) => c.custom_output_config.as_ref(),
        },
        _ => None,
    };
    config.filter(|c| c.return_raw_output)
}

fn parse_raw(config: &CustomOutputConfig, raw_outputs: &[String]) -> Result<Row> {
    match &config.parsing_fn {
        Some(parse) => parse(raw_outputs),
        None => {
            let mut row = Row::new();
            row.insert("raw_output".to_string(), json!(raw_outputs));
            Ok(row)
        }
    }
}

/// A response from the wrong result family means the judge answered a different question.
fn check_family(metric: &Metric, results: &EvaluationResults) -> Result<()> {
    let matches = match results {
        EvaluationResults::Automatic { .. } => matches!(metric, Metric::Automatic(_)),
        EvaluationResults::Trajectory { .. } => matches!(metric, Metric::Trajectory(_)),
        EvaluationResults::Pointwise(_) | EvaluationResults::RubricBasedInstructionFollowing { .. } => {
            metric.is_model_based() && !metric.is_pairwise()
        }
        EvaluationResults::Pairwise(_) => metric.is_pairwise(),
    };
    if matches {
        Ok(())
    } else {
        Err(EvalError::Parse(format!(
            "judge returned {} results for metric `{}`",
            family_name(results),
            metric.name()
        )))
    }
}

fn family_name(results: &EvaluationResults) -> &'static str {
    match results {
        EvaluationResults::Automatic { .. } => "automatic",
        EvaluationResults::Trajectory { .. } => "trajectory",
        EvaluationResults::Pointwise(_) => "pointwise",
        EvaluationResults::Pairwise(_) => "pairwise",
        EvaluationResults::RubricBasedInstructionFollowing { .. } => "rubric-based instruction following",
    }
}

fn number(value: Option<f64>) -> Value {
    value.map(|v| json!(v)).unwrap_or(Value::Null)
}

fn text(value: Option<&str>) -> Value {
    value
        .map(|v| Value::String(v.to_string()))
        .unwrap_or(Value::Null)
}
