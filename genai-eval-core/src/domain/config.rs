use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use super::content::MultimodalMode;
use crate::error::{EvalError, Result};

// ===== Run Configuration =====

/// Concurrency, rate and retry settings for one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct EvaluationRunConfig {
    #[validate(range(min = 1, max = 1000))]
    pub max_workers: usize,
    #[validate(range(min = 1, max = 1000))]
    pub runnable_max_workers: usize,
    #[validate(range(min = 0.001))]
    pub evaluation_service_qps: f64,
    #[validate(range(min = 0.001))]
    pub generation_qps: f64,
    #[validate(range(min = 1))]
    pub retry_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub single_request_retry_timeout_secs: u64,
    #[validate(range(min = 1, max = 10))]
    pub max_inference_attempts: u32,
    pub multimodal_mode: MultimodalMode,
    #[validate(length(min = 1))]
    pub default_rubric_generation_model: String,
}

impl Default for EvaluationRunConfig {
    fn default() -> Self {
        Self {
            max_workers: 100,
            runnable_max_workers: 5,
            evaluation_service_qps: 1.0,
            generation_qps: 5.0,
            retry_timeout_secs: 600,
            single_request_retry_timeout_secs: 120,
            max_inference_attempts: 3,
            multimodal_mode: MultimodalMode::Auto,
            default_rubric_generation_model: "gemini-2.0-flash".to_string(),
        }
    }
}

impl EvaluationRunConfig {
    pub fn validated(self) -> Result<Self> {
        self.validate()
            .map_err(|e| EvalError::Configuration(format!("invalid run configuration: {}", e)))?;
        Ok(self)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_secs(self.retry_timeout_secs)
    }

    pub fn single_request_retry_timeout(&self) -> Duration {
        Duration::from_secs(self.single_request_retry_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EvaluationRunConfig::default();
        assert_eq!(config.max_workers, 100);
        assert_eq!(config.runnable_max_workers, 5);
        assert_eq!(config.retry_timeout(), Duration::from_secs(600));
        assert!(config.validated().is_ok());
    }

    #[test]
    fn test_zero_qps_is_rejected() {
        let config = EvaluationRunConfig {
            evaluation_service_qps: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validated(),
            Err(EvalError::Configuration(_))
        ));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EvaluationRunConfig =
            serde_yaml::from_str("max_workers: 8\nmultimodal_mode: strict\n").unwrap();
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.multimodal_mode, MultimodalMode::Strict);
        assert_eq!(config.generation_qps, 5.0);
    }
}
