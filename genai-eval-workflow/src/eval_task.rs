use chrono::Utc;
use genai_eval_core::{
    AutoraterConfig, Dataset, EvalError, EvalResult, EvaluationRunConfig, EvaluationService,
    Metric, MetricRegistry, ModelAdapter, PromptTemplate, Result, Row, RunnableAdapter,
    BASELINE_MODEL_RESPONSE_COLUMN, PROMPT_COLUMN, RESPONSE_COLUMN,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::column_mapping::MetricColumnMapping;
use crate::executor::ProgressCallback;
use crate::output::{write_result, LocalOutputSink, OutputRequest, OutputSink};
use crate::tasks::{
    InferenceTask, MetricEvaluationTask, PromptAssemblyTask, RubricGenerationTask, SummaryTask,
    Task, TaskContext,
};

/// A metric given by library name or as an instance.
#[derive(Debug, Clone)]
pub enum MetricSpec {
    Name(String),
    Instance(Metric),
}

impl From<&str> for MetricSpec {
    fn from(name: &str) -> Self {
        MetricSpec::Name(name.to_string())
    }
}

impl From<String> for MetricSpec {
    fn from(name: String) -> Self {
        MetricSpec::Name(name)
    }
}

impl From<Metric> for MetricSpec {
    fn from(metric: Metric) -> Self {
        MetricSpec::Instance(metric)
    }
}

/// Per-call arguments of [`EvalTask::evaluate`].
#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    pub model: Option<ModelAdapter>,
    pub runnable: Option<RunnableAdapter>,
    pub prompt_template: Option<String>,
    pub experiment_run_name: Option<String>,
    pub output_file_name: Option<String>,
    /// Overrides the run configuration's retry budget.
    pub retry_timeout: Option<Duration>,
}

impl EvaluateOptions {
    pub fn with_model(mut self, model: ModelAdapter) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_runnable(mut self, runnable: RunnableAdapter) -> Self {
        self.runnable = Some(runnable);
        self
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    pub fn with_output_file_name(mut self, name: impl Into<String>) -> Self {
        self.output_file_name = Some(name.into());
        self
    }
}

/// Dataset plus metrics; each [`evaluate`](EvalTask::evaluate) call produces one [`EvalResult`].
pub struct EvalTask {
    dataset: Dataset,
    metrics: Vec<Metric>,
    experiment: Option<String>,
    metric_column_mapping: BTreeMap<String, String>,
    output_uri_prefix: Option<String>,
    autorater_config: Option<AutoraterConfig>,
    service: Arc<dyn EvaluationService>,
    rubric_generator: Option<ModelAdapter>,
    output_sink: Arc<dyn OutputSink>,
    run_config: EvaluationRunConfig,
    progress: Option<ProgressCallback>,
    dataset_uri: Option<String>,
}

pub struct EvalTaskBuilder {
    dataset: Dataset,
    service: Arc<dyn EvaluationService>,
    metrics: Vec<MetricSpec>,
    experiment: Option<String>,
    metric_column_mapping: BTreeMap<String, String>,
    output_uri_prefix: Option<String>,
    autorater_config: Option<AutoraterConfig>,
    rubric_generator: Option<ModelAdapter>,
    output_sink: Option<Arc<dyn OutputSink>>,
    run_config: EvaluationRunConfig,
    progress: Option<ProgressCallback>,
    dataset_uri: Option<String>,
}

impl EvalTaskBuilder {
    pub fn metrics<I, M>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MetricSpec>,
    {
        self.metrics.extend(metrics.into_iter().map(Into::into));
        self
    }

    pub fn metric(mut self, metric: impl Into<MetricSpec>) -> Self {
        self.metrics.push(metric.into());
        self
    }

    pub fn experiment(mut self, experiment: impl Into<String>) -> Self {
        self.experiment = Some(experiment.into());
        self
    }

    pub fn metric_column_mapping(mut self, mapping: BTreeMap<String, String>) -> Self {
        self.metric_column_mapping = mapping;
        self
    }

    pub fn output_uri_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_uri_prefix = Some(prefix.into());
        self
    }

    pub fn autorater_config(mut self, config: AutoraterConfig) -> Self {
        self.autorater_config = Some(config);
        self
    }

    /// Model used for rubric-based metrics that carry no generator of their own.
    pub fn rubric_generator(mut self, model: ModelAdapter) -> Self {
        self.rubric_generator = Some(model);
        self
    }

    pub fn output_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.output_sink = Some(sink);
        self
    }

    pub fn run_config(mut self, config: EvaluationRunConfig) -> Self {
        self.run_config = config;
        self
    }

    pub fn progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn dataset_uri(mut self, uri: impl Into<String>) -> Self {
        self.dataset_uri = Some(uri.into());
        self
    }

    pub fn build(self) -> Result<EvalTask> {
        let metrics = resolve_metrics(self.metrics)?;
        let run_config = self.run_config.validated()?;
        Ok(EvalTask {
            dataset: self.dataset,
            metrics,
            experiment: self.experiment,
            metric_column_mapping: self.metric_column_mapping,
            output_uri_prefix: self.output_uri_prefix,
            autorater_config: self.autorater_config.filter(|c| !c.is_empty()),
            service: self.service,
            rubric_generator: self.rubric_generator,
            output_sink: self
                .output_sink
                .unwrap_or_else(|| Arc::new(LocalOutputSink::new())),
            run_config,
            progress: self.progress,
            dataset_uri: self.dataset_uri,
        })
    }
}

/// Library names become instances; the list must be non-empty with unique names.
pub fn resolve_metrics(specs: Vec<MetricSpec>) -> Result<Vec<Metric>> {
    if specs.is_empty() {
        return Err(EvalError::Configuration(
            "At least one metric is required".to_string(),
        ));
    }
    let registry = MetricRegistry::new();
    let mut seen = BTreeSet::new();
    let mut metrics = Vec::with_capacity(specs.len());
    for spec in specs {
        let metric = match spec {
            MetricSpec::Instance(metric) => metric,
            MetricSpec::Name(name) => registry.resolve(&name).ok_or_else(|| {
                EvalError::Configuration(format!("Unknown metric `{}`", name))
            })?,
        };
        if let Metric::Trajectory(trajectory) = &metric {
            trajectory.validate()?;
        }
        if !seen.insert(metric.name().to_string()) {
            return Err(EvalError::Configuration(format!(
                "Duplicate metric name `{}`; metric names must be unique",
                metric.name()
            )));
        }
        metrics.push(metric);
    }
    Ok(metrics)
}

impl EvalTask {
    pub fn builder(dataset: Dataset, service: Arc<dyn EvaluationService>) -> EvalTaskBuilder {
        EvalTaskBuilder {
            dataset,
            service,
            metrics: Vec::new(),
            experiment: None,
            metric_column_mapping: BTreeMap::new(),
            output_uri_prefix: None,
            autorater_config: None,
            rubric_generator: None,
            output_sink: None,
            run_config: EvaluationRunConfig::default(),
            progress: None,
            dataset_uri: None,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn run_config(&self) -> &EvaluationRunConfig {
        &self.run_config
    }

    /// Runs inference (when requested), rubric generation, judging and aggregation.
    #[instrument(skip_all, fields(rows = self.dataset.len(), metrics = self.metrics.len()))]
    pub async fn evaluate(&self, options: EvaluateOptions) -> Result<EvalResult> {
        let retry_timeout = options
            .retry_timeout
            .unwrap_or_else(|| self.run_config.retry_timeout());
        self.run(self.dataset.clone(), options, retry_timeout).await
    }

    /// Evaluates one row with the single-request retry budget.
    pub async fn evaluate_row(&self, row: Row, options: EvaluateOptions) -> Result<EvalResult> {
        let retry_timeout = options
            .retry_timeout
            .unwrap_or_else(|| self.run_config.single_request_retry_timeout());
        self.run(Dataset::from_records(vec![row]), options, retry_timeout)
            .await
    }

    async fn run(
        &self,
        dataset: Dataset,
        options: EvaluateOptions,
        retry_timeout: Duration,
    ) -> Result<EvalResult> {
        let mapping = MetricColumnMapping::initialize(&dataset, &self.metric_column_mapping);
        let baseline = self.check_inference_inputs(&dataset, &mapping, &options)?;

        let mut pipeline: Vec<Box<dyn Task>> = Vec::new();
        if let Some(template) = &options.prompt_template {
            pipeline.push(Box::new(PromptAssemblyTask::new(PromptTemplate::new(template))));
        }
        if let Some(model) = &options.model {
            pipeline.push(Box::new(InferenceTask::candidate(model.clone())));
        }
        if let Some(runnable) = &options.runnable {
            pipeline.push(Box::new(InferenceTask::runnable(runnable.clone())));
        }
        if let Some(model) = &baseline {
            pipeline.push(Box::new(InferenceTask::baseline(model.clone())));
        }
        if self.metrics.iter().any(|m| matches!(m, Metric::RubricBased(_))) {
            pipeline.push(Box::new(RubricGenerationTask::new()));
        }
        pipeline.push(Box::new(MetricEvaluationTask::new()));
        pipeline.push(Box::new(SummaryTask::new()));

        let evaluation_id = Uuid::new_v4();
        let mut context = TaskContext {
            evaluation_id,
            dataset,
            mapping,
            metrics: self.metrics.clone(),
            config: self.run_config.clone(),
            service: Arc::clone(&self.service),
            autorater_config: self.autorater_config.clone(),
            rubric_generator: self.rubric_generator.clone(),
            progress: self.progress.clone(),
            retry_timeout,
            summary_metrics: BTreeMap::new(),
        };

        info!(
            evaluation_id = %evaluation_id,
            phases = pipeline.len(),
            "Starting evaluation"
        );
        for task in &pipeline {
            info!(task = task.name(), "Starting task");
            let report = task.execute(&mut context).await.map_err(|e| {
                warn!(task = task.name(), error = %e, "Task aborted the evaluation");
                e
            })?;
            info!(
                task = task.name(),
                processed = report.processed,
                failed = report.failed,
                skipped = report.skipped,
                "Task finished"
            );
        }

        let metadata = self.metadata(evaluation_id, &options, baseline.as_ref());
        let result = EvalResult {
            summary_metrics: context.summary_metrics,
            metrics_table: context.dataset,
            metadata,
        };

        if let Some(prefix) = &self.output_uri_prefix {
            let request = OutputRequest {
                prefix,
                file_name: options.output_file_name.as_deref(),
                dataset_uri: self.dataset_uri.as_deref(),
            };
            let uri = write_result(self.output_sink.as_ref(), &request, &result, &self.metrics).await?;
            info!(uri = %uri, "Evaluation results written");
        }

        info!(evaluation_id = %evaluation_id, "Evaluation completed");
        Ok(result)
    }

    /// Validates the inference arguments against the dataset and returns the baseline model
    /// to run, if any.
    fn check_inference_inputs(
        &self,
        dataset: &Dataset,
        mapping: &MetricColumnMapping,
        options: &EvaluateOptions,
    ) -> Result<Option<ModelAdapter>> {
        if options.model.is_some() && options.runnable.is_some() {
            return Err(EvalError::Configuration(
                "Provide either a model or a runnable, not both".to_string(),
            ));
        }
        let generates = options.model.is_some() || options.runnable.is_some();
        if generates && mapping.is_bound(RESPONSE_COLUMN, dataset) {
            return Err(EvalError::Configuration(format!(
                "The dataset already has a `{}` column bound to `response`; remove the column or the model",
                mapping.resolve(RESPONSE_COLUMN)
            )));
        }
        let has_prompts = options.prompt_template.is_some() || mapping.is_bound(PROMPT_COLUMN, dataset);
        if generates && !has_prompts {
            return Err(EvalError::Configuration(format!(
                "Inference needs a `{}` column or a prompt template; available columns: {:?}",
                mapping.resolve(PROMPT_COLUMN),
                dataset.columns()
            )));
        }

        let mut baselines: Vec<&ModelAdapter> = Vec::new();
        for model in self.metrics.iter().filter_map(Metric::baseline_model) {
            if !baselines.iter().any(|b| b.same_model(model)) {
                baselines.push(model);
            }
        }
        if baselines.len() > 1 {
            let names: Vec<String> = baselines.iter().map(|b| b.name()).collect();
            return Err(EvalError::Configuration(format!(
                "Pairwise metrics must share one baseline model; found {:?}",
                names
            )));
        }
        let baseline_bound = mapping.is_bound(BASELINE_MODEL_RESPONSE_COLUMN, dataset);
        let baseline = baselines.first().map(|m| (*m).clone());
        if baseline.is_some() && baseline_bound {
            return Err(EvalError::Configuration(format!(
                "The dataset already has a `{}` column; remove the column or the pairwise metric's baseline model",
                mapping.resolve(BASELINE_MODEL_RESPONSE_COLUMN)
            )));
        }
        if baseline.is_none() && !baseline_bound {
            if let Some(metric) = self.metrics.iter().find(|m| m.is_pairwise()) {
                return Err(EvalError::Configuration(format!(
                    "Pairwise metric `{}` needs a `{}` column or a baseline model",
                    metric.name(),
                    BASELINE_MODEL_RESPONSE_COLUMN
                )));
            }
        }
        if baseline.is_some() && !has_prompts {
            return Err(EvalError::Configuration(
                "Baseline inference needs a `prompt` column or a prompt template".to_string(),
            ));
        }
        Ok(baseline)
    }

    fn metadata(
        &self,
        evaluation_id: Uuid,
        options: &EvaluateOptions,
        baseline: Option<&ModelAdapter>,
    ) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert("evaluation_id".to_string(), evaluation_id.to_string());
        metadata.insert(
            "timestamp".to_string(),
            Utc::now().format("%Y-%m-%d-%H-%M-%S").to_string(),
        );
        if let Some(experiment) = &self.experiment {
            metadata.insert("experiment".to_string(), experiment.clone());
        }
        if let Some(run) = &options.experiment_run_name {
            metadata.insert("experiment_run_name".to_string(), run.clone());
        }
        let candidate = options
            .model
            .as_ref()
            .map(ModelAdapter::name)
            .or_else(|| options.runnable.as_ref().map(|r| r.name().to_string()));
        if let Some(name) = candidate {
            metadata.insert("candidate_model_name".to_string(), name);
        }
        if let Some(model) = baseline {
            metadata.insert("baseline_model_name".to_string(), model.name());
        }
        metadata
    }
}

