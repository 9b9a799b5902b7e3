//! Exponential backoff with jitter under an overall time budget.
//!
//! # Example
//!
//! ```no_run
//! use genai_eval_workflow::retry::{retry, ExponentialBackoff, RetryConfig};
//! use genai_eval_core::JudgeError;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = ExponentialBackoff::new(RetryConfig::with_timeout(Duration::from_secs(120)));
//! let value = retry(&policy, || async { Ok::<_, JudgeError>(42) }).await?;
//! # Ok(())
//! # }
//! ```

use genai_eval_core::{EvalError, JudgeError};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Total time budget across all attempts
    pub timeout: Duration,
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(90),
            multiplier: 1.45,
            timeout: Duration::from_secs(600),
            jitter: JitterStrategy::Equal,
        }
    }
}

impl RetryConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Jitter strategy for retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterStrategy {
    None,
    /// Random value between 0 and the computed delay
    Full,
    /// Half the delay plus a random half
    #[default]
    Equal,
}

/// Errors that know whether another attempt may succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for JudgeError {
    fn is_retryable(&self) -> bool {
        JudgeError::is_retryable(self)
    }
}

impl Retryable for EvalError {
    fn is_retryable(&self) -> bool {
        matches!(self, EvalError::Judge(e) if e.is_retryable())
    }
}

pub trait RetryPolicy: Send + Sync {
    /// Delay before retry number `attempt` (zero-based).
    fn next_delay(&self, attempt: usize) -> Duration;

    /// Overall budget, measured from the first attempt.
    fn timeout(&self) -> Duration;
}

#[derive(Debug, Clone, Default)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        match self.config.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                let jitter = rand::random::<f64>();
                Duration::from_secs_f64(delay.as_secs_f64() * jitter)
            }
            JitterStrategy::Equal => {
                let jitter = rand::random::<f64>();
                let base = delay.as_secs_f64() / 2.0;
                Duration::from_secs_f64(base + (base * jitter))
            }
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Duration {
        let base_delay = self.config.initial_delay.as_secs_f64()
            * self.config.multiplier.powi(attempt.min(i32::MAX as usize) as i32);
        let delay = Duration::from_secs_f64(base_delay.min(self.config.max_delay.as_secs_f64()));
        self.apply_jitter(delay)
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

/// Error wrapper that includes retry attempt information
#[derive(Debug)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: usize,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Operation failed after {} attempts: {}",
            self.attempts, self.error
        )
    }
}

impl<E: std::error::Error> std::error::Error for RetryError<E> {}

/// Retry `f` while it fails with a retryable error and the budget allows another wait.
pub async fn retry<F, Fut, T, E, P>(policy: &P, mut f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
    P: RetryPolicy + ?Sized,
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("Operation succeeded after {} retries", attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_retryable() {
                    return Err(RetryError {
                        error: e,
                        attempts: attempt + 1,
                    });
                }

                let delay = policy.next_delay(attempt);
                if started.elapsed() + delay > policy.timeout() {
                    warn!(attempts = attempt + 1, error = %e, "Retry budget exhausted");
                    return Err(RetryError {
                        error: e,
                        attempts: attempt + 1,
                    });
                }

                debug!(attempt = attempt + 1, ?delay, error = %e, "Retrying after transient error");
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
