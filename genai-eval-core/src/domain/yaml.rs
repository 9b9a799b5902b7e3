//! YAML interchange format for model-based metrics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::metric::{
    AutoraterConfig, CritiqueMetric, CustomOutputConfig, Metric, PairwiseMetric, PointwiseMetric,
    RawOutputParser, RubricBasedMetric, RubricGenerationConfig,
};
use super::model::ModelAdapter;
use super::prompt::extract_placeholders;
use super::rubric::{parse_pairwise_rubric_result, parse_pointwise_rubric_result};
use crate::error::{EvalError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDocument {
    pub metadata: MetricMetadata,
    pub steps: Vec<MetricStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricMetadata {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub required_inputs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    PointwiseMetric,
    PairwiseMetric,
    Rubric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStep {
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub prompt: StepPrompt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<StepModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<StepOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPrompt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepModel {
    pub model_name_or_endpoint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flip_enabled: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutput {
    #[serde(rename = "type")]
    pub output_type: OutputType,
}

fn default_version() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S").to_string()
}

impl MetricDocument {
    /// Describe a pointwise, pairwise or rubric-based metric.
    pub fn from_metric(metric: &Metric) -> Result<Self> {
        let mut steps = Vec::new();
        let critique = match metric {
            Metric::Pointwise(m) => CritiqueMetric::Pointwise(m.clone()),
            Metric::Pairwise(m) => CritiqueMetric::Pairwise(m.clone()),
            Metric::RubricBased(m) => {
                steps.push(MetricStep {
                    step_type: StepType::Rubric,
                    prompt: StepPrompt {
                        system_instruction: None,
                        template: m.generation_config.prompt_template.clone(),
                    },
                    model: m.generation_config.model.as_ref().map(|model| StepModel {
                        model_name_or_endpoint: model.name(),
                    }),
                    options: None,
                    output: None,
                });
                m.critique_metric.clone()
            }
            other => {
                return Err(EvalError::Validation(format!(
                    "metric `{}` is computed, not model-based, and has no YAML form",
                    other.name()
                )))
            }
        };

        let (step_type, name, template, system_instruction, autorater, custom_output) =
            match &critique {
                CritiqueMetric::Pointwise(m) => (
                    StepType::PointwiseMetric,
                    &m.metric_name,
                    &m.metric_prompt_template,
                    &m.system_instruction,
                    &m.autorater_config,
                    &m.custom_output_config,
                ),
                CritiqueMetric::Pairwise(m) => (
                    StepType::PairwiseMetric,
                    &m.metric_name,
                    &m.metric_prompt_template,
                    &m.system_instruction,
                    &m.autorater_config,
                    &m.custom_output_config,
                ),
            };

        let options = autorater.as_ref().and_then(|config| {
            (config.sampling_count.is_some() || config.flip_enabled.is_some()).then(|| {
                StepOptions {
                    sample_count: config.sampling_count,
                    flip_enabled: config.flip_enabled,
                }
            })
        });

        steps.push(MetricStep {
            step_type,
            prompt: StepPrompt {
                system_instruction: system_instruction.clone(),
                template: template.clone(),
            },
            model: autorater
                .as_ref()
                .and_then(|config| config.autorater_model.clone())
                .map(|model_name_or_endpoint| StepModel {
                    model_name_or_endpoint,
                }),
            options,
            output: custom_output
                .as_ref()
                .filter(|config| config.return_raw_output)
                .map(|_| StepOutput {
                    output_type: OutputType::Raw,
                }),
        });

        let required_inputs: BTreeSet<String> = steps
            .iter()
            .flat_map(|step| extract_placeholders(&step.prompt.template))
            .collect();

        Ok(Self {
            metadata: MetricMetadata {
                name: name.clone(),
                version: default_version(),
                required_inputs: required_inputs.into_iter().collect(),
            },
            steps,
        })
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.metadata.version = version.into();
        self
    }

    pub fn to_yaml(&self) -> Result<String> {
        self.validate()?;
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let document: MetricDocument = serde_yaml::from_str(text)?;
        document.validate()?;
        Ok(document)
    }

    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.trim().is_empty() {
            return Err(EvalError::Validation("metric name is empty".to_string()));
        }

        let metric_steps = self
            .steps
            .iter()
            .filter(|s| s.step_type != StepType::Rubric)
            .count();
        if metric_steps != 1 {
            return Err(EvalError::Validation(format!(
                "expected exactly one pointwise or pairwise step, found {}",
                metric_steps
            )));
        }
        if self
            .steps
            .iter()
            .filter(|s| s.step_type == StepType::Rubric)
            .count()
            > 1
        {
            return Err(EvalError::Validation(
                "at most one rubric step is allowed".to_string(),
            ));
        }

        let declared: BTreeSet<&str> = self
            .metadata
            .required_inputs
            .iter()
            .map(String::as_str)
            .collect();
        for step in &self.steps {
            let undeclared: Vec<String> = extract_placeholders(&step.prompt.template)
                .into_iter()
                .filter(|p| !declared.contains(p.as_str()))
                .collect();
            if !undeclared.is_empty() {
                return Err(EvalError::Validation(format!(
                    "template placeholders {:?} are not listed in required_inputs {:?}",
                    undeclared, self.metadata.required_inputs
                )));
            }
        }
        Ok(())
    }

    /// Build the metric, resolving rubric generator model names through `resolve_model`.
    pub fn to_metric_with<F>(&self, resolve_model: F) -> Result<Metric>
    where
        F: Fn(&str) -> Option<ModelAdapter>,
    {
        self.validate()?;
        let rubric_step = self.steps.iter().find(|s| s.step_type == StepType::Rubric);
        let step = self
            .steps
            .iter()
            .find(|s| s.step_type != StepType::Rubric)
            .ok_or_else(|| EvalError::Validation("missing metric step".to_string()))?;

        let autorater = AutoraterConfig {
            autorater_model: step.model.as_ref().map(|m| m.model_name_or_endpoint.clone()),
            sampling_count: step.options.as_ref().and_then(|o| o.sample_count),
            flip_enabled: step.options.as_ref().and_then(|o| o.flip_enabled),
        };
        let autorater_config = (!autorater.is_empty()).then_some(autorater);
        let raw_output = step.output.is_some();
        let name = self.metadata.name.clone();
        let template = step.prompt.template.clone();
        let system_instruction = step.prompt.system_instruction.clone();

        let critique = match step.step_type {
            StepType::PointwiseMetric => {
                let custom_output_config = raw_output.then(|| CustomOutputConfig {
                    return_raw_output: true,
                    parsing_fn: rubric_step.map(|_| {
                        Arc::new(parse_pointwise_rubric_result) as RawOutputParser
                    }),
                });
                CritiqueMetric::Pointwise(PointwiseMetric {
                    metric_name: name,
                    metric_prompt_template: template,
                    system_instruction,
                    autorater_config,
                    custom_output_config,
                })
            }
            _ => {
                let custom_output_config = raw_output.then(|| CustomOutputConfig {
                    return_raw_output: true,
                    parsing_fn: rubric_step.map(|_| {
                        Arc::new(parse_pairwise_rubric_result) as RawOutputParser
                    }),
                });
                CritiqueMetric::Pairwise(PairwiseMetric {
                    metric_name: name,
                    metric_prompt_template: template,
                    system_instruction,
                    autorater_config,
                    custom_output_config,
                    baseline_model: None,
                })
            }
        };

        Ok(match rubric_step {
            Some(rubric) => {
                let model = match &rubric.model {
                    Some(m) => Some(resolve_model(&m.model_name_or_endpoint).ok_or_else(|| {
                        EvalError::Configuration(format!(
                            "unknown rubric generation model `{}`",
                            m.model_name_or_endpoint
                        ))
                    })?),
                    None => None,
                };
                Metric::RubricBased(RubricBasedMetric {
                    generation_config: RubricGenerationConfig {
                        prompt_template: rubric.prompt.template.clone(),
                        model,
                        parsing_fn: None,
                    },
                    critique_metric: critique,
                })
            }
            None => critique.into_metric(),
        })
    }

    /// Build the metric; a rubric step naming a generator model is left unresolved and
    /// falls back to the run's default generator.
    pub fn to_metric(&self) -> Result<Metric> {
        let mut document = self.clone();
        for step in &mut document.steps {
            if step.step_type == StepType::Rubric {
                step.model = None;
            }
        }
        document.to_metric_with(|_| None)
    }
}

pub fn metric_to_yaml(metric: &Metric) -> Result<String> {
    MetricDocument::from_metric(metric)?.to_yaml()
}

pub fn metric_from_yaml(text: &str) -> Result<Metric> {
    MetricDocument::from_yaml(text)?.to_metric()
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTWISE_YAML: &str = r#"
metadata:
  name: clarity
  required_inputs: [prompt, response]
steps:
  - type: pointwise_metric
    prompt:
      system_instruction: You are a strict grader.
      template: "Rate the clarity of {response} for {prompt}."
    model:
      model_name_or_endpoint: gemini-1.5-pro
    options:
      sample_count: 4
"#;

    #[test]
    fn test_version_defaults_to_timestamp() {
        let document = MetricDocument::from_yaml(POINTWISE_YAML).unwrap();
        assert_eq!(document.metadata.version.len(), 14);
        assert!(document.metadata.version.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_undeclared_placeholder_is_rejected() {
        let text = POINTWISE_YAML.replace("[prompt, response]", "[response]");
        assert!(matches!(
            MetricDocument::from_yaml(&text),
            Err(EvalError::Validation(_))
        ));
    }

    #[test]
    fn test_two_metric_steps_are_rejected() {
        let text = format!(
            "{}  - type: pairwise_metric\n    prompt:\n      template: \"{{response}}\"\n",
            POINTWISE_YAML
        );
        assert!(MetricDocument::from_yaml(&text).is_err());
    }

    #[test]
    fn test_automatic_metric_has_no_yaml_form() {
        let metric = crate::domain::library::MetricRegistry::new()
            .resolve("bleu")
            .unwrap();
        assert!(metric_to_yaml(&metric).is_err());
    }
}
