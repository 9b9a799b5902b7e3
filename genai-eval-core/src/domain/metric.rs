use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::dataset::{
    Row, PREDICTED_TRAJECTORY_COLUMN, REFERENCE_COLUMN, REFERENCE_TRAJECTORY_COLUMN,
    RESPONSE_COLUMN,
};
use super::model::ModelAdapter;
use super::prompt::extract_placeholders;
use crate::error::{EvalError, Result};

/// Parses the raw judge outputs of one row into named fields.
pub type RawOutputParser = Arc<dyn Fn(&[String]) -> Result<Row> + Send + Sync>;

/// Parses the text returned by a rubric generator into named fields.
pub type RubricParser = Arc<dyn Fn(&str) -> Result<Row> + Send + Sync>;

/// A client-side metric computed from one dataset row.
pub type CustomMetricFn = Arc<dyn Fn(&Row) -> Result<Row> + Send + Sync>;

/// Judge-side sampling options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoraterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autorater_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flip_enabled: Option<bool>,
}

impl AutoraterConfig {
    pub fn is_empty(&self) -> bool {
        self.autorater_model.is_none() && self.sampling_count.is_none() && self.flip_enabled.is_none()
    }
}

#[derive(Clone, Default)]
pub struct CustomOutputConfig {
    pub return_raw_output: bool,
    pub parsing_fn: Option<RawOutputParser>,
}

impl CustomOutputConfig {
    pub fn raw() -> Self {
        Self {
            return_raw_output: true,
            parsing_fn: None,
        }
    }

    pub fn with_parser<F>(parser: F) -> Self
    where
        F: Fn(&[String]) -> Result<Row> + Send + Sync + 'static,
    {
        Self {
            return_raw_output: true,
            parsing_fn: Some(Arc::new(parser)),
        }
    }
}

impl fmt::Debug for CustomOutputConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomOutputConfig")
            .field("return_raw_output", &self.return_raw_output)
            .field("parsing_fn", &self.parsing_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum AutomaticMetricKind {
    ExactMatch,
    Bleu {
        use_effective_order: bool,
    },
    Rouge {
        rouge_type: String,
        use_stemmer: bool,
        split_summaries: bool,
    },
    ToolCallValid,
    ToolNameMatch,
    ToolParameterKeyMatch,
    ToolParameterKvMatch {
        use_strict_string_match: bool,
    },
}

impl AutomaticMetricKind {
    /// Tool metrics compare serialized tool calls rather than free text.
    pub fn is_tool_metric(&self) -> bool {
        matches!(
            self,
            AutomaticMetricKind::ToolCallValid
                | AutomaticMetricKind::ToolNameMatch
                | AutomaticMetricKind::ToolParameterKeyMatch
                | AutomaticMetricKind::ToolParameterKvMatch { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum TrajectoryMetricKind {
    ExactMatch,
    InOrderMatch,
    AnyOrderMatch,
    Precision,
    Recall,
    SingleToolUse { tool_name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutomaticMetric {
    pub name: String,
    pub kind: AutomaticMetricKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryMetric {
    pub name: String,
    pub kind: TrajectoryMetricKind,
}

impl TrajectoryMetric {
    /// Scores 1 when any predicted step calls `tool_name`.
    pub fn single_tool_use(tool_name: impl Into<String>) -> Self {
        Self {
            name: "trajectory_single_tool_use".to_string(),
            kind: TrajectoryMetricKind::SingleToolUse {
                tool_name: tool_name.into(),
            },
        }
    }

    /// The tool name of a single-tool-use metric must be set before it can score.
    pub fn validate(&self) -> Result<()> {
        match &self.kind {
            TrajectoryMetricKind::SingleToolUse { tool_name } if tool_name.trim().is_empty() => {
                Err(EvalError::Configuration(format!(
                    "`{}` needs a tool name; use `trajectory_single_tool_use:<tool>`",
                    self.name
                )))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PointwiseMetric {
    pub metric_name: String,
    pub metric_prompt_template: String,
    pub system_instruction: Option<String>,
    pub autorater_config: Option<AutoraterConfig>,
    pub custom_output_config: Option<CustomOutputConfig>,
}

impl PointwiseMetric {
    pub fn new(metric_name: impl Into<String>, metric_prompt_template: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            metric_prompt_template: metric_prompt_template.into(),
            system_instruction: None,
            autorater_config: None,
            custom_output_config: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_autorater_config(mut self, config: AutoraterConfig) -> Self {
        self.autorater_config = Some(config);
        self
    }

    pub fn with_custom_output(mut self, config: CustomOutputConfig) -> Self {
        self.custom_output_config = Some(config);
        self
    }
}

#[derive(Debug, Clone)]
pub struct PairwiseMetric {
    pub metric_name: String,
    pub metric_prompt_template: String,
    pub system_instruction: Option<String>,
    pub autorater_config: Option<AutoraterConfig>,
    pub custom_output_config: Option<CustomOutputConfig>,
    pub baseline_model: Option<ModelAdapter>,
}

impl PairwiseMetric {
    pub fn new(metric_name: impl Into<String>, metric_prompt_template: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            metric_prompt_template: metric_prompt_template.into(),
            system_instruction: None,
            autorater_config: None,
            custom_output_config: None,
            baseline_model: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_autorater_config(mut self, config: AutoraterConfig) -> Self {
        self.autorater_config = Some(config);
        self
    }

    pub fn with_custom_output(mut self, config: CustomOutputConfig) -> Self {
        self.custom_output_config = Some(config);
        self
    }

    pub fn with_baseline_model(mut self, model: ModelAdapter) -> Self {
        self.baseline_model = Some(model);
        self
    }
}

#[derive(Clone)]
pub struct RubricGenerationConfig {
    pub prompt_template: String,
    pub model: Option<ModelAdapter>,
    pub parsing_fn: Option<RubricParser>,
}

impl RubricGenerationConfig {
    pub fn new(prompt_template: impl Into<String>) -> Self {
        Self {
            prompt_template: prompt_template.into(),
            model: None,
            parsing_fn: None,
        }
    }
}

impl fmt::Debug for RubricGenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RubricGenerationConfig")
            .field("prompt_template", &self.prompt_template)
            .field("model", &self.model)
            .field("parsing_fn", &self.parsing_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum CritiqueMetric {
    Pointwise(PointwiseMetric),
    Pairwise(PairwiseMetric),
}

impl CritiqueMetric {
    pub fn into_metric(self) -> Metric {
        match self {
            CritiqueMetric::Pointwise(m) => Metric::Pointwise(m),
            CritiqueMetric::Pairwise(m) => Metric::Pairwise(m),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RubricBasedMetric {
    pub generation_config: RubricGenerationConfig,
    pub critique_metric: CritiqueMetric,
}

#[derive(Clone)]
pub struct CustomMetric {
    pub name: String,
    pub metric_fn: CustomMetricFn,
}

impl CustomMetric {
    pub fn new<F>(name: impl Into<String>, metric_fn: F) -> Self
    where
        F: Fn(&Row) -> Result<Row> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            metric_fn: Arc::new(metric_fn),
        }
    }
}

impl fmt::Debug for CustomMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMetric")
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Metric {
    Automatic(AutomaticMetric),
    Trajectory(TrajectoryMetric),
    Pointwise(PointwiseMetric),
    Pairwise(PairwiseMetric),
    RubricBased(RubricBasedMetric),
    Custom(CustomMetric),
}

impl Metric {
    pub fn name(&self) -> &str {
        match self {
            Metric::Automatic(m) => &m.name,
            Metric::Trajectory(m) => &m.name,
            Metric::Pointwise(m) => &m.metric_name,
            Metric::Pairwise(m) => &m.metric_name,
            Metric::RubricBased(m) => match &m.critique_metric {
                CritiqueMetric::Pointwise(c) => &c.metric_name,
                CritiqueMetric::Pairwise(c) => &c.metric_name,
            },
            Metric::Custom(m) => &m.name,
        }
    }

    /// Judged by a model rather than computed.
    pub fn is_model_based(&self) -> bool {
        matches!(
            self,
            Metric::Pointwise(_) | Metric::Pairwise(_) | Metric::RubricBased(_)
        )
    }

    pub fn is_pairwise(&self) -> bool {
        match self {
            Metric::Pairwise(_) => true,
            Metric::RubricBased(m) => matches!(m.critique_metric, CritiqueMetric::Pairwise(_)),
            _ => false,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Metric::Custom(_))
    }

    pub fn metric_prompt_template(&self) -> Option<&str> {
        match self {
            Metric::Pointwise(m) => Some(&m.metric_prompt_template),
            Metric::Pairwise(m) => Some(&m.metric_prompt_template),
            Metric::RubricBased(m) => match &m.critique_metric {
                CritiqueMetric::Pointwise(c) => Some(&c.metric_prompt_template),
                CritiqueMetric::Pairwise(c) => Some(&c.metric_prompt_template),
            },
            _ => None,
        }
    }

    pub fn autorater_config(&self) -> Option<&AutoraterConfig> {
        match self {
            Metric::Pointwise(m) => m.autorater_config.as_ref(),
            Metric::Pairwise(m) => m.autorater_config.as_ref(),
            Metric::RubricBased(m) => match &m.critique_metric {
                CritiqueMetric::Pointwise(c) => c.autorater_config.as_ref(),
                CritiqueMetric::Pairwise(c) => c.autorater_config.as_ref(),
            },
            _ => None,
        }
    }

    pub fn baseline_model(&self) -> Option<&ModelAdapter> {
        match self {
            Metric::Pairwise(m) => m.baseline_model.as_ref(),
            Metric::RubricBased(RubricBasedMetric {
                critique_metric: CritiqueMetric::Pairwise(c),
                ..
            }) => c.baseline_model.as_ref(),
            _ => None,
        }
    }

    /// Logical column names this metric reads from each row.
    pub fn required_inputs(&self) -> BTreeSet<String> {
        match self {
            Metric::Automatic(_) => [RESPONSE_COLUMN, REFERENCE_COLUMN]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            Metric::Trajectory(m) => {
                let mut inputs = BTreeSet::from([PREDICTED_TRAJECTORY_COLUMN.to_string()]);
                if !matches!(m.kind, TrajectoryMetricKind::SingleToolUse { .. }) {
                    inputs.insert(REFERENCE_TRAJECTORY_COLUMN.to_string());
                }
                inputs
            }
            Metric::Pointwise(_) | Metric::Pairwise(_) | Metric::RubricBased(_) => self
                .metric_prompt_template()
                .map(extract_placeholders)
                .unwrap_or_default(),
            Metric::Custom(_) => BTreeSet::new(),
        }
    }
}

impl From<PointwiseMetric> for Metric {
    fn from(metric: PointwiseMetric) -> Self {
        Metric::Pointwise(metric)
    }
}

impl From<PairwiseMetric> for Metric {
    fn from(metric: PairwiseMetric) -> Self {
        Metric::Pairwise(metric)
    }
}

impl From<RubricBasedMetric> for Metric {
    fn from(metric: RubricBasedMetric) -> Self {
        Metric::RubricBased(metric)
    }
}

impl From<CustomMetric> for Metric {
    fn from(metric: CustomMetric) -> Self {
        Metric::Custom(metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_inputs_from_template() {
        let metric: Metric =
            PointwiseMetric::new("clarity", "Rate {response} given {prompt} and {prompt}").into();
        assert_eq!(
            metric.required_inputs(),
            BTreeSet::from(["prompt".to_string(), "response".to_string()])
        );
        assert!(metric.is_model_based());
        assert!(!metric.is_pairwise());
    }

    #[test]
    fn test_single_tool_use_needs_no_reference() {
        let metric = Metric::Trajectory(TrajectoryMetric {
            name: "trajectory_single_tool_use".to_string(),
            kind: TrajectoryMetricKind::SingleToolUse {
                tool_name: "search".to_string(),
            },
        });
        assert_eq!(
            metric.required_inputs(),
            BTreeSet::from([PREDICTED_TRAJECTORY_COLUMN.to_string()])
        );
    }

    #[test]
    fn test_rubric_metric_takes_critique_name() {
        let metric: Metric = RubricBasedMetric {
            generation_config: RubricGenerationConfig::new("Write rubrics for {prompt}"),
            critique_metric: CritiqueMetric::Pairwise(PairwiseMetric::new(
                "pairwise_rb_custom",
                "{prompt} {response} {baseline_model_response} {rubrics}",
            )),
        }
        .into();
        assert_eq!(metric.name(), "pairwise_rb_custom");
        assert!(metric.is_pairwise());
    }
}
