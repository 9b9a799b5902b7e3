use genai_eval_core::{EvalError, Result};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Spaces admissions `1 / qps` seconds apart.
///
/// Shared across workers behind an `Arc`. The lock is held while a caller waits for its slot,
/// so admissions are strictly serialized.
#[derive(Debug)]
pub struct RateLimiter {
    qps: f64,
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(qps: f64) -> Result<Self> {
        if !qps.is_finite() || qps <= 0.0 {
            return Err(EvalError::Configuration(format!(
                "qps must be a positive number, got {}",
                qps
            )));
        }
        Ok(Self {
            qps,
            interval: Duration::from_secs_f64(1.0 / qps),
            next_slot: Mutex::new(None),
        })
    }

    pub fn qps(&self) -> f64 {
        self.qps
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next emission slot is free, then claim it.
    pub async fn sleep_and_advance(&self) {
        let mut next_slot = self.next_slot.lock().await;
        if let Some(slot) = *next_slot {
            if slot > Instant::now() {
                trace!(wait_ms = (slot - Instant::now()).as_millis() as u64, "rate limited");
                sleep_until(slot).await;
            }
        }
        *next_slot = Some(Instant::now() + self.interval);
    }
}
