use genai_eval_core::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Progress of one phase, reported after every completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub phase: String,
    pub completed: usize,
    pub total: usize,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Semaphore-bounded pool of tokio tasks.
///
/// Results come back in submission order regardless of completion order.
#[derive(Clone)]
pub struct WorkerPool {
    max_concurrency: usize,
    phase: String,
    progress: Option<ProgressCallback>,
}

impl WorkerPool {
    pub fn new(phase: impl Into<String>, max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            phase: phase.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run every job and wait for all of them.
    pub async fn run<T, Fut>(&self, jobs: Vec<Fut>) -> Result<Vec<T>>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(total);

        debug!(phase = %self.phase, total, max_concurrency = self.max_concurrency, "Starting worker pool");

        for job in jobs {
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);
            let progress = self.progress.clone();
            let phase = self.phase.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| EvalError::Internal(format!("worker pool closed: {}", e)))?;
                let output = job.await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(callback) = progress {
                    callback(ProgressUpdate {
                        phase,
                        completed: done,
                        total,
                    });
                }
                Ok::<T, EvalError>(output)
            }));
        }

        let mut results = Vec::with_capacity(total);
        for handle in handles {
            match handle.await {
                Ok(output) => results.push(output?),
                Err(e) => return Err(EvalError::Internal(format!("worker task panicked: {}", e))),
            }
        }
        Ok(results)
    }
}
