use async_trait::async_trait;
use genai_eval_core::{EvalError, MetricCalculator, Result};
use serde_json::json;
use std::collections::HashMap;

use super::{MetricInput, MetricOutput};

const MAX_ORDER: usize = 4;

/// Sentence-level BLEU in the 0..1 range with exponential smoothing.
#[derive(Debug, Clone)]
pub struct BleuCalculator {
    pub max_n: usize,
    /// Only average over n-gram orders the prediction is long enough to contain.
    pub use_effective_order: bool,
}

impl BleuCalculator {
    pub fn new(use_effective_order: bool) -> Self {
        Self {
            max_n: MAX_ORDER,
            use_effective_order,
        }
    }

    /// Split punctuation from words, then split on whitespace.
    fn tokenize(text: &str) -> Vec<String> {
        let mut spaced = String::with_capacity(text.len() + 8);
        for ch in text.chars() {
            if ch.is_ascii_punctuation() {
                spaced.push(' ');
                spaced.push(ch);
                spaced.push(' ');
            } else {
                spaced.push(ch);
            }
        }
        spaced.split_whitespace().map(str::to_string).collect()
    }

    fn count_ngrams(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
        let mut counts = HashMap::new();
        if tokens.len() >= n {
            for window in tokens.windows(n) {
                *counts.entry(window).or_insert(0) += 1;
            }
        }
        counts
    }

    fn brevity_penalty(prediction_len: usize, reference_len: usize) -> f64 {
        if prediction_len == 0 {
            0.0
        } else if prediction_len >= reference_len {
            1.0
        } else {
            (1.0 - reference_len as f64 / prediction_len as f64).exp()
        }
    }

    /// Returns the score and the per-order precisions.
    pub fn calculate_bleu(&self, prediction: &str, reference: &str) -> (f64, Vec<f64>) {
        let pred = Self::tokenize(prediction);
        let refs = Self::tokenize(reference);

        if pred.is_empty() {
            return (0.0, vec![0.0; self.max_n]);
        }

        let mut precisions = Vec::with_capacity(self.max_n);
        let mut smoothing = 1.0;
        let mut log_sum = 0.0;
        let mut orders = 0usize;

        for n in 1..=self.max_n {
            let pred_counts = Self::count_ngrams(&pred, n);
            let ref_counts = Self::count_ngrams(&refs, n);
            let total: usize = pred_counts.values().sum();
            let correct: usize = pred_counts
                .iter()
                .map(|(gram, count)| (*count).min(*ref_counts.get(gram).unwrap_or(&0)))
                .sum();

            if total == 0 {
                if self.use_effective_order {
                    break;
                }
                precisions.push(0.0);
                return (0.0, precisions);
            }

            let precision = if correct == 0 {
                smoothing *= 2.0;
                1.0 / (smoothing * total as f64)
            } else {
                correct as f64 / total as f64
            };
            precisions.push(precision);
            log_sum += precision.ln();
            orders += 1;
        }

        let geometric_mean = (log_sum / orders.max(1) as f64).exp();
        let bleu = Self::brevity_penalty(pred.len(), refs.len()) * geometric_mean;
        (bleu.clamp(0.0, 1.0), precisions)
    }
}

impl Default for BleuCalculator {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl MetricCalculator for BleuCalculator {
    type Input = MetricInput;
    type Output = MetricOutput;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        let reference = input
            .reference
            .ok_or_else(|| EvalError::Validation("bleu requires a reference".to_string()))?;
        let (bleu, precisions) = self.calculate_bleu(&input.prediction, &reference);

        Ok(MetricOutput {
            score: bleu,
            metadata: json!({
                "metric": "bleu",
                "max_n": self.max_n,
                "use_effective_order": self.use_effective_order,
                "precisions": precisions,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_punctuation() {
        assert_eq!(
            BleuCalculator::tokenize("Hello, world!"),
            vec!["Hello", ",", "world", "!"]
        );
    }

    #[test]
    fn test_short_prediction_needs_effective_order() {
        let strict = BleuCalculator::new(false);
        let effective = BleuCalculator::new(true);
        assert_eq!(strict.calculate_bleu("cat", "cat").0, 0.0);
        assert!((effective.calculate_bleu("cat", "cat").0 - 1.0).abs() < 1e-9);
    }
}
