use async_trait::async_trait;
use genai_eval_core::{
    parse_rubrics, EvalError, Metric, ModelAdapter, PromptTemplate, Result, Row, RubricBasedMetric,
    RubricParser, RUBRICS_COLUMN,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::inference::generate_text;
use super::{Task, TaskContext, TaskReport};
use crate::multimodal::assemble_prompt;
use crate::rate_limiter::RateLimiter;

/// Generates per-row rubrics for every rubric-based metric.
///
/// Skipped when the mapped `rubrics` column already exists.
#[derive(Debug, Default)]
pub struct RubricGenerationTask;

impl RubricGenerationTask {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Task for RubricGenerationTask {
    async fn execute(&self, context: &mut TaskContext) -> Result<TaskReport> {
        let rubric_metrics: Vec<(String, RubricBasedMetric)> = context
            .metrics
            .iter()
            .filter_map(|m| match m {
                Metric::RubricBased(rb) => Some((m.name().to_string(), rb.clone())),
                _ => None,
            })
            .collect();

        let mut report = TaskReport::skipped();
        for (metric_name, metric) in rubric_metrics {
            let rubrics_column = context.mapping.resolve(RUBRICS_COLUMN).to_string();
            if context.dataset.has_column(&rubrics_column) {
                info!(
                    metric = %metric_name,
                    column = %rubrics_column,
                    "Rubrics column present; skipping generation"
                );
                continue;
            }
            let generated =
                generate_for_metric(context, &metric_name, &metric, &rubrics_column).await?;
            report.skipped = false;
            report.processed += generated.processed;
            report.failed += generated.failed;
        }
        Ok(report)
    }

    fn name(&self) -> &str {
        "rubric_generation"
    }
}

async fn generate_for_metric(
    context: &mut TaskContext,
    metric_name: &str,
    metric: &RubricBasedMetric,
    rubrics_column: &str,
) -> Result<TaskReport> {
    let model: ModelAdapter = metric
        .generation_config
        .model
        .clone()
        .or_else(|| context.rubric_generator.clone())
        .ok_or_else(|| {
            EvalError::Configuration(format!(
                "Rubric-based metric `{}` has no generation model and no default rubric generator is configured",
                metric_name
            ))
        })?;
    let parser: RubricParser = match &metric.generation_config.parsing_fn {
        Some(parser) => Arc::clone(parser),
        None => Arc::new(parse_rubrics),
    };
    let template = PromptTemplate::new(&metric.generation_config.prompt_template);
    let limiter = Arc::new(RateLimiter::new(context.config.generation_qps)?);
    let mode = context.config.multimodal_mode;

    info!(
        metric = %metric_name,
        generator = %model.name(),
        rows = context.dataset.len(),
        "Generating rubrics"
    );

    let mut jobs = Vec::with_capacity(context.dataset.len());
    for (row_index, row) in context.dataset.rows().iter().enumerate() {
        let mapping = &context.mapping;
        let prompt = assemble_prompt(&template, |name| row.get(mapping.resolve(name)), mode)?;
        let model = model.clone();
        let parser = Arc::clone(&parser);
        let limiter = Arc::clone(&limiter);
        let metric_name = metric_name.to_string();
        jobs.push(async move {
            limiter.sleep_and_advance().await;
            let parsed = match generate_text(&model, prompt).await {
                Ok(text) => parser(&text).map_err(|e| e.to_string()),
                Err(reason) => Err(reason),
            };
            parsed.map_err(|reason| {
                warn!(metric = %metric_name, row = row_index, reason = %reason, "Rubric generation failed; using empty rubrics");
            })
        });
    }

    let outcomes = context
        .pool("rubric_generation", context.config.max_workers)
        .run(jobs)
        .await?;

    let failed = outcomes.iter().filter(|o| o.is_err()).count();
    let processed = outcomes.len();
    for (row_index, outcome) in outcomes.into_iter().enumerate() {
        let mut fields: Row = outcome.unwrap_or_default();
        let rubrics = fields
            .remove(RUBRICS_COLUMN)
            .filter(Value::is_array)
            .unwrap_or_else(|| Value::Array(Vec::new()));
        context.dataset.set_value(row_index, rubrics_column, rubrics)?;
        for (key, value) in fields {
            context.dataset.set_value(row_index, &key, value)?;
        }
    }
    context.mapping.set(RUBRICS_COLUMN, rubrics_column);

    Ok(TaskReport::completed(processed, failed))
}
