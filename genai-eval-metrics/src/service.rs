//! In-process judge for computation-based metrics.

use async_trait::async_trait;
use genai_eval_core::{
    AutomaticMetricKind, EvaluateInstancesRequest, EvaluateInstancesResponse, EvaluationInput,
    EvaluationResults, EvaluationService, JudgeError, MetricCalculator, MetricValue,
    TrajectoryMetricKind,
};
use tracing::debug;

use crate::calculators::{
    BleuCalculator, ExactMatchCalculator, MetricInput, RougeCalculator, ToolCallCalculator,
    ToolCallCheck, TrajectoryCalculator, TrajectoryInput,
};

/// Answers automatic and trajectory requests locally; model-based requests are rejected.
#[derive(Debug, Clone, Default)]
pub struct LocalEvaluationService;

impl LocalEvaluationService {
    pub fn new() -> Self {
        Self
    }

    fn automatic_name(kind: &AutomaticMetricKind) -> &'static str {
        match kind {
            AutomaticMetricKind::ExactMatch => "exact_match",
            AutomaticMetricKind::Bleu { .. } => "bleu",
            AutomaticMetricKind::Rouge { .. } => "rouge",
            AutomaticMetricKind::ToolCallValid => "tool_call_valid",
            AutomaticMetricKind::ToolNameMatch => "tool_name_match",
            AutomaticMetricKind::ToolParameterKeyMatch => "tool_parameter_key_match",
            AutomaticMetricKind::ToolParameterKvMatch { .. } => "tool_parameter_kv_match",
        }
    }

    fn trajectory_name(kind: &TrajectoryMetricKind) -> &'static str {
        match kind {
            TrajectoryMetricKind::ExactMatch => "trajectory_exact_match",
            TrajectoryMetricKind::InOrderMatch => "trajectory_in_order_match",
            TrajectoryMetricKind::AnyOrderMatch => "trajectory_any_order_match",
            TrajectoryMetricKind::Precision => "trajectory_precision",
            TrajectoryMetricKind::Recall => "trajectory_recall",
            TrajectoryMetricKind::SingleToolUse { .. } => "trajectory_single_tool_use",
        }
    }

    async fn score_automatic(
        kind: &AutomaticMetricKind,
        input: MetricInput,
    ) -> genai_eval_core::Result<f64> {
        let output = match kind {
            AutomaticMetricKind::ExactMatch => ExactMatchCalculator::new().calculate(input).await?,
            AutomaticMetricKind::Bleu {
                use_effective_order,
            } => BleuCalculator::new(*use_effective_order).calculate(input).await?,
            AutomaticMetricKind::Rouge {
                rouge_type,
                use_stemmer,
                split_summaries,
            } => {
                RougeCalculator::from_type(rouge_type, *use_stemmer, *split_summaries)?
                    .calculate(input)
                    .await?
            }
            AutomaticMetricKind::ToolCallValid => {
                ToolCallCalculator::new(ToolCallCheck::Valid).calculate(input).await?
            }
            AutomaticMetricKind::ToolNameMatch => {
                ToolCallCalculator::new(ToolCallCheck::NameMatch)
                    .calculate(input)
                    .await?
            }
            AutomaticMetricKind::ToolParameterKeyMatch => {
                ToolCallCalculator::new(ToolCallCheck::ParameterKeyMatch)
                    .calculate(input)
                    .await?
            }
            AutomaticMetricKind::ToolParameterKvMatch {
                use_strict_string_match,
            } => {
                ToolCallCalculator::new(ToolCallCheck::ParameterKvMatch {
                    use_strict_string_match: *use_strict_string_match,
                })
                .calculate(input)
                .await?
            }
        };
        Ok(output.score)
    }
}

#[async_trait]
impl EvaluationService for LocalEvaluationService {
    async fn evaluate_instances(
        &self,
        request: EvaluateInstancesRequest,
    ) -> Result<EvaluateInstancesResponse, JudgeError> {
        match request.input {
            EvaluationInput::Automatic { spec, instance } => {
                let prediction = instance
                    .prediction
                    .ok_or_else(|| JudgeError::invalid_argument("missing `prediction`"))?;
                let needs_reference = !matches!(spec, AutomaticMetricKind::ToolCallValid);
                if needs_reference && instance.reference.is_none() {
                    return Err(JudgeError::invalid_argument("missing `reference`"));
                }
                let input = MetricInput {
                    prediction,
                    reference: instance.reference,
                };
                let score = Self::score_automatic(&spec, input)
                    .await
                    .map_err(|e| JudgeError::invalid_argument(e.to_string()))?;
                debug!(metric = Self::automatic_name(&spec), score, "computed locally");

                Ok(EvaluateInstancesResponse {
                    results: EvaluationResults::Automatic {
                        metric: Self::automatic_name(&spec).to_string(),
                        scores: vec![MetricValue { score: Some(score) }],
                    },
                })
            }
            EvaluationInput::Trajectory { spec, instance } => {
                let predicted = instance.predicted_trajectory.ok_or_else(|| {
                    JudgeError::invalid_argument("missing `predicted_trajectory`")
                })?;
                let calculator = TrajectoryCalculator::new(spec.clone());
                let output = calculator
                    .calculate(TrajectoryInput {
                        predicted,
                        reference: instance.reference_trajectory,
                    })
                    .await
                    .map_err(|e| JudgeError::invalid_argument(e.to_string()))?;

                Ok(EvaluateInstancesResponse {
                    results: EvaluationResults::Trajectory {
                        metric: Self::trajectory_name(&spec).to_string(),
                        scores: vec![MetricValue {
                            score: Some(output.score),
                        }],
                    },
                })
            }
            EvaluationInput::Pointwise { .. }
            | EvaluationInput::Pairwise { .. }
            | EvaluationInput::RubricBasedInstructionFollowing { .. } => Err(
                JudgeError::invalid_argument("model-based metrics need a remote judge service"),
            ),
        }
    }
}
