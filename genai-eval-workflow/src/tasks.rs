pub mod evaluation;
pub mod inference;
pub mod reporting;
pub mod rubric_generation;

pub use evaluation::*;
pub use inference::*;
pub use reporting::*;
pub use rubric_generation::*;

use async_trait::async_trait;
use genai_eval_core::{
    AutoraterConfig, Dataset, EvaluationRunConfig, EvaluationService, Metric, ModelAdapter, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::column_mapping::MetricColumnMapping;
use crate::executor::{ProgressCallback, WorkerPool};

/// State threaded through the phases of one evaluation.
pub struct TaskContext {
    pub evaluation_id: Uuid,
    pub dataset: Dataset,
    pub mapping: MetricColumnMapping,
    pub metrics: Vec<Metric>,
    pub config: EvaluationRunConfig,
    pub service: Arc<dyn EvaluationService>,
    pub autorater_config: Option<AutoraterConfig>,
    pub rubric_generator: Option<ModelAdapter>,
    pub progress: Option<ProgressCallback>,
    pub retry_timeout: Duration,
    pub summary_metrics: BTreeMap<String, Value>,
}

impl TaskContext {
    pub fn pool(&self, phase: &str, max_concurrency: usize) -> WorkerPool {
        WorkerPool::new(phase, max_concurrency).with_progress(self.progress.clone())
    }
}

/// One phase of an evaluation.
#[async_trait]
pub trait Task: Send + Sync {
    async fn execute(&self, context: &mut TaskContext) -> Result<TaskReport>;
    fn name(&self) -> &str;
}

/// What a phase did, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub processed: usize,
    pub failed: usize,
    pub skipped: bool,
}

impl TaskReport {
    pub fn completed(processed: usize, failed: usize) -> Self {
        Self {
            processed,
            failed,
            skipped: false,
        }
    }

    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}
