use async_trait::async_trait;
use genai_eval_core::{
    CustomMetric, Dataset, EvalError, EvaluateInstancesRequest, EvaluationService, Metric, Result,
    Row,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{Task, TaskContext, TaskReport};
use crate::column_mapping::MetricColumnMapping;
use crate::rate_limiter::RateLimiter;
use crate::request_builder::RequestBuilder;
use crate::response_parser::{error_fields, parse_response};
use crate::retry::{retry, ExponentialBackoff, RetryConfig};

type Job = Pin<Box<dyn Future<Output = JobOutcome> + Send>>;

struct JobOutcome {
    metric_index: usize,
    row_index: usize,
    fields: Row,
    failed: bool,
}

/// Fail when a metric reads a column the dataset does not have.
pub fn validate_metric_inputs(metrics: &[Metric], mapping: &MetricColumnMapping, dataset: &Dataset) -> Result<()> {
    for metric in metrics {
        let missing = mapping.missing(&metric.required_inputs(), dataset);
        if !missing.is_empty() {
            return Err(EvalError::MissingColumns {
                metric: metric.name().to_string(),
                missing,
                available: dataset.columns().to_vec(),
            });
        }
    }
    Ok(())
}

/// Scores every `(metric, row)` pair and writes `{metric}/{field}` columns.
///
/// Judge metrics go through the rate limiter and retry policy; custom metrics run on the
/// blocking pool. Both share one worker pool capped at `max_workers`.
#[derive(Debug, Default)]
pub struct MetricEvaluationTask;

impl MetricEvaluationTask {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Task for MetricEvaluationTask {
    async fn execute(&self, context: &mut TaskContext) -> Result<TaskReport> {
        validate_metric_inputs(&context.metrics, &context.mapping, &context.dataset)?;

        let limiter = Arc::new(RateLimiter::new(context.config.evaluation_service_qps)?);
        let policy = Arc::new(ExponentialBackoff::new(RetryConfig::with_timeout(
            context.retry_timeout,
        )));
        let rows = context.dataset.len();
        let custom_count = context.metrics.iter().filter(|m| m.is_custom()).count();
        let api_count = context.metrics.len() - custom_count;

        info!(
            api_metrics = api_count,
            custom_metrics = custom_count,
            rows,
            total = (api_count + custom_count) * rows,
            qps = context.config.evaluation_service_qps,
            "Computing metrics"
        );

        let mut jobs: Vec<Job> = Vec::with_capacity(context.metrics.len() * rows);
        {
            let builder = RequestBuilder::new(
                &context.mapping,
                context.config.multimodal_mode,
                context.autorater_config.as_ref(),
            );
            for (metric_index, metric) in context.metrics.iter().enumerate() {
                if let Metric::Custom(custom) = metric {
                    for (row_index, row) in context.dataset.rows().iter().enumerate() {
                        jobs.push(Box::pin(custom_row(
                            custom.clone(),
                            row.clone(),
                            metric_index,
                            row_index,
                        )));
                    }
                    continue;
                }
                for (row_index, row) in context.dataset.rows().iter().enumerate() {
                    match builder.build(metric, row, row_index) {
                        Ok(request) => jobs.push(Box::pin(judge_row(
                            Arc::clone(&context.service),
                            Arc::clone(&limiter),
                            Arc::clone(&policy),
                            metric.clone(),
                            request,
                            metric_index,
                            row_index,
                        ))),
                        Err(e) => {
                            error!(metric = %metric.name(), row = row_index, error = %e, "Failed to build judge request");
                            let fields = error_fields(metric);
                            jobs.push(Box::pin(async move {
                                JobOutcome {
                                    metric_index,
                                    row_index,
                                    fields,
                                    failed: true,
                                }
                            }));
                        }
                    }
                }
            }
        }

        let outcomes = context
            .pool("evaluation", context.config.max_workers)
            .run(jobs)
            .await?;

        let processed = outcomes.len();
        let failed = outcomes.iter().filter(|o| o.failed).count();
        let names: Vec<String> = context.metrics.iter().map(|m| m.name().to_string()).collect();
        for outcome in outcomes {
            let metric_name = &names[outcome.metric_index];
            for (key, value) in outcome.fields {
                context.dataset.set_value(
                    outcome.row_index,
                    &format!("{}/{}", metric_name, key),
                    value,
                )?;
            }
        }

        if failed > 0 {
            warn!(failed, total = processed, "Some metric rows failed");
        }
        Ok(TaskReport::completed(processed, failed))
    }

    fn name(&self) -> &str {
        "evaluation"
    }
}

async fn judge_row(
    service: Arc<dyn EvaluationService>,
    limiter: Arc<RateLimiter>,
    policy: Arc<ExponentialBackoff>,
    metric: Metric,
    request: EvaluateInstancesRequest,
    metric_index: usize,
    row_index: usize,
) -> JobOutcome {
    let result = retry(policy.as_ref(), || {
        let service = Arc::clone(&service);
        let limiter = Arc::clone(&limiter);
        let request = request.clone();
        async move {
            limiter.sleep_and_advance().await;
            service.evaluate_instances(request).await
        }
    })
    .await;

    let parsed = match result {
        Ok(response) => parse_response(&metric, &response).map_err(|e| {
            error!(metric = %metric.name(), row = row_index, error = %e, "Failed to parse judge response");
        }),
        Err(e) => {
            error!(
                metric = %metric.name(),
                row = row_index,
                attempts = e.attempts,
                error = %e.error,
                "Judge request failed"
            );
            Err(())
        }
    };

    match parsed {
        Ok(fields) => JobOutcome {
            metric_index,
            row_index,
            fields,
            failed: false,
        },
        Err(()) => JobOutcome {
            metric_index,
            row_index,
            fields: error_fields(&metric),
            failed: true,
        },
    }
}

async fn custom_row(metric: CustomMetric, row: Row, metric_index: usize, row_index: usize) -> JobOutcome {
    let func = Arc::clone(&metric.metric_fn);
    let result = tokio::task::spawn_blocking(move || func(&row)).await;
    let output = match result {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            error!(metric = %metric.name, row = row_index, error = %e, "Custom metric failed");
            return JobOutcome {
                metric_index,
                row_index,
                fields: error_fields(&Metric::Custom(metric)),
                failed: true,
            };
        }
        Err(e) => {
            error!(metric = %metric.name, row = row_index, error = %e, "Custom metric panicked");
            return JobOutcome {
                metric_index,
                row_index,
                fields: error_fields(&Metric::Custom(metric)),
                failed: true,
            };
        }
    };

    // The entry named after the metric is its score.
    let fields = output
        .into_iter()
        .map(|(key, value)| {
            if key == metric.name {
                ("score".to_string(), value)
            } else {
                (key, value)
            }
        })
        .collect();
    JobOutcome {
        metric_index,
        row_index,
        fields,
        failed: false,
    }
}
