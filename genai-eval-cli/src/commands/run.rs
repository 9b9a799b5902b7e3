//! `genai-eval run`

use anyhow::{Context as _, Result};
use genai_eval_core::{Dataset, MetricDocument};
use genai_eval_workflow::{EvalTask, EvaluateOptions, MetricSpec, ProgressUpdate};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cli::RunArgs;
use crate::context::Context;

/// Execute an evaluation run
pub async fn execute(ctx: &Context, args: RunArgs) -> Result<()> {
    let dataset = Dataset::load(&args.dataset)
        .with_context(|| format!("Failed to load dataset {:?}", args.dataset))?;
    info!(rows = dataset.len(), dataset = %args.dataset.display(), "Dataset loaded");

    let judge_url = args.judge_url.as_deref();
    let metrics = args
        .metrics
        .iter()
        .map(|raw| metric_spec(ctx, raw, judge_url))
        .collect::<Result<Vec<_>>>()?;

    let service = ctx.evaluation_service(judge_url, args.local_judge)?;
    let mapping: BTreeMap<String, String> = args.mappings.iter().cloned().collect();

    let progress = ctx.output.progress_bar();
    let bar = progress.clone();
    let on_progress = Arc::new(move |update: ProgressUpdate| {
        bar.set_message(update.phase);
        bar.set_length(update.total as u64);
        bar.set_position(update.completed as u64);
    });

    let mut builder = EvalTask::builder(dataset, service)
        .metrics(metrics)
        .metric_column_mapping(mapping)
        .run_config(ctx.config.run.clone())
        .progress(on_progress)
        .dataset_uri(args.dataset.display().to_string());

    if let Some(experiment) = &args.experiment {
        builder = builder.experiment(experiment.clone());
    }
    if let Some(output) = &args.output {
        builder = builder.output_uri_prefix(output.clone());
    }
    if !args.local_judge && ctx.endpoint_url(judge_url).is_some() {
        let generator = &ctx.config.run.default_rubric_generation_model;
        builder = builder.rubric_generator(ctx.generative_model(generator, judge_url)?);
    }

    let task = builder.build().context("Invalid evaluation")?;

    let mut options = EvaluateOptions::default();
    if let Some(model) = &args.model {
        options = options.with_model(ctx.generative_model(model, judge_url)?);
    }
    if let Some(template) = &args.prompt_template {
        options = options.with_prompt_template(template.clone());
    }
    if let Some(file_name) = &args.output_file {
        options = options.with_output_file_name(file_name.clone());
    }

    let result = task.evaluate(options).await;
    progress.finish_and_clear();
    let result = result.context("Evaluation failed")?;

    ctx.output.write_result(&result)?;
    if let Some(output) = &args.output {
        ctx.output
            .success(&format!("Results written under {}", output));
    }
    Ok(())
}

/// A library metric name, or a path to a metric YAML document.
fn metric_spec(ctx: &Context, raw: &str, judge_url: Option<&str>) -> Result<MetricSpec> {
    if !is_yaml_path(raw) {
        return Ok(MetricSpec::Name(raw.to_string()));
    }

    let text = std::fs::read_to_string(raw)
        .with_context(|| format!("Failed to read metric file {}", raw))?;
    let document = MetricDocument::from_yaml(&text)
        .with_context(|| format!("Invalid metric file {}", raw))?;
    debug!(metric = %document.metadata.name, file = raw, "Loaded metric definition");

    let metric = document
        .to_metric_with(|model| ctx.generative_model(model, judge_url).ok())
        .with_context(|| format!("Failed to build metric from {}", raw))?;
    Ok(MetricSpec::Instance(metric))
}

fn is_yaml_path(raw: &str) -> bool {
    matches!(
        Path::new(raw).extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yaml_path() {
        assert!(is_yaml_path("metrics/helpfulness.yaml"));
        assert!(is_yaml_path("m.yml"));
        assert!(!is_yaml_path("exact_match"));
        assert!(!is_yaml_path("rouge_l_sum"));
    }
}
