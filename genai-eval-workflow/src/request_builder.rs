use genai_eval_core::{
    extract_placeholders, format_rubrics_as_questions, is_rubric_critique_template, trajectory_from_value,
    value_to_text, AutomaticInstance, AutoraterConfig, CritiqueMetric, CustomOutputConfig,
    CustomOutputFormatConfig, EvalError, EvaluateInstancesRequest, EvaluationInput, Metric,
    MultimodalMode, PairwiseMetric, PairwiseMetricSpec, PointwiseMetric, PointwiseMetricSpec,
    Result, Row, ToolCall, TrajectoryInstance, BASELINE_MODEL_RESPONSE_COLUMN,
    PREDICTED_TRAJECTORY_COLUMN, REFERENCE_COLUMN, REFERENCE_TRAJECTORY_COLUMN, RESPONSE_COLUMN,
    RUBRICS_COLUMN, RUBRIC_BASED_INSTRUCTION_FOLLOWING,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::error;

use crate::column_mapping::MetricColumnMapping;
use crate::multimodal::build_instance;

/// Turns one `(metric, row)` pair into a judge request.
pub struct RequestBuilder<'a> {
    mapping: &'a MetricColumnMapping,
    multimodal_mode: MultimodalMode,
    autorater_config: Option<&'a AutoraterConfig>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(
        mapping: &'a MetricColumnMapping,
        multimodal_mode: MultimodalMode,
        autorater_config: Option<&'a AutoraterConfig>,
    ) -> Self {
        Self {
            mapping,
            multimodal_mode,
            autorater_config,
        }
    }

    pub fn build(&self, metric: &Metric, row: &Row, row_index: usize) -> Result<EvaluateInstancesRequest> {
        let input = match metric {
            Metric::Automatic(m) => EvaluationInput::Automatic {
                spec: m.kind.clone(),
                instance: AutomaticInstance {
                    prediction: self.text(row, RESPONSE_COLUMN),
                    reference: self.text(row, REFERENCE_COLUMN),
                },
            },
            Metric::Trajectory(m) => EvaluationInput::Trajectory {
                spec: m.kind.clone(),
                instance: TrajectoryInstance {
                    predicted_trajectory: self.trajectory(row, PREDICTED_TRAJECTORY_COLUMN, &m.name, row_index),
                    reference_trajectory: self.trajectory(row, REFERENCE_TRAJECTORY_COLUMN, &m.name, row_index),
                },
            },
            Metric::Pointwise(m) => self.pointwise(m, row)?,
            Metric::Pairwise(m) => self.pairwise(m, row)?,
            Metric::RubricBased(m) => match &m.critique_metric {
                CritiqueMetric::Pointwise(c) => self.pointwise(c, row)?,
                CritiqueMetric::Pairwise(c) => self.pairwise(c, row)?,
            },
            Metric::Custom(m) => {
                return Err(EvalError::Internal(format!(
                    "custom metric `{}` is computed locally and has no judge request",
                    m.name
                )))
            }
        };

        Ok(EvaluateInstancesRequest {
            autorater_config: self.autorater_for(metric),
            input,
        })
    }

    /// Metric-level config wins over the task-level one; empty configs are dropped.
    fn autorater_for(&self, metric: &Metric) -> Option<AutoraterConfig> {
        metric
            .autorater_config()
            .filter(|c| !c.is_empty())
            .or(self.autorater_config.filter(|c| !c.is_empty()))
            .cloned()
    }

    fn text(&self, row: &Row, logical: &str) -> Option<String> {
        row.get(self.mapping.resolve(logical))
            .filter(|v| !v.is_null())
            .map(value_to_text)
    }

    fn trajectory(&self, row: &Row, logical: &str, metric: &str, row_index: usize) -> Option<Vec<ToolCall>> {
        let value = row.get(self.mapping.resolve(logical)).filter(|v| !v.is_null())?;
        match trajectory_from_value(value) {
            Ok(calls) => Some(calls),
            Err(e) => {
                error!(metric, row = row_index, column = logical, error = %e, "Malformed trajectory");
                None
            }
        }
    }

    fn pointwise(&self, metric: &PointwiseMetric, row: &Row) -> Result<EvaluationInput> {
        let instance = build_instance(
            &self.instance_inputs(&metric.metric_prompt_template, row),
            self.multimodal_mode,
        )?;
        if metric.metric_name == RUBRIC_BASED_INSTRUCTION_FOLLOWING {
            return Ok(EvaluationInput::RubricBasedInstructionFollowing { instance });
        }
        Ok(EvaluationInput::Pointwise {
            spec: PointwiseMetricSpec {
                metric_prompt_template: metric.metric_prompt_template.clone(),
                system_instruction: metric.system_instruction.clone(),
                custom_output_format_config: output_format(metric.custom_output_config.as_ref()),
            },
            instance,
        })
    }

    fn pairwise(&self, metric: &PairwiseMetric, row: &Row) -> Result<EvaluationInput> {
        let instance = build_instance(
            &self.instance_inputs(&metric.metric_prompt_template, row),
            self.multimodal_mode,
        )?;
        Ok(EvaluationInput::Pairwise {
            spec: PairwiseMetricSpec {
                metric_prompt_template: metric.metric_prompt_template.clone(),
                candidate_response_field_name: self.mapping.resolve(RESPONSE_COLUMN).to_string(),
                baseline_response_field_name: self
                    .mapping
                    .resolve(BASELINE_MODEL_RESPONSE_COLUMN)
                    .to_string(),
                system_instruction: metric.system_instruction.clone(),
                custom_output_format_config: output_format(metric.custom_output_config.as_ref()),
            },
            instance,
        })
    }

    /// Every template variable read through the mapping.
    fn instance_inputs(&self, template: &str, row: &Row) -> BTreeMap<String, Value> {
        let critique_template = is_rubric_critique_template(template);
        extract_placeholders(template)
            .into_iter()
            .map(|name| {
                let value = row
                    .get(self.mapping.resolve(&name))
                    .cloned()
                    .unwrap_or(Value::Null);
                let value = match value {
                    Value::Array(items) => {
                        let items: Vec<String> = items.iter().map(value_to_text).collect();
                        if name == RUBRICS_COLUMN && critique_template {
                            Value::String(format_rubrics_as_questions(&items))
                        } else {
                            Value::String(items.join("\n"))
                        }
                    }
                    other => other,
                };
                (name, value)
            })
            .collect()
    }
}

fn output_format(config: Option<&CustomOutputConfig>) -> Option<CustomOutputFormatConfig> {
    config
        .filter(|c| c.return_raw_output)
        .map(|_| CustomOutputFormatConfig {
            return_raw_output: true,
        })
}
