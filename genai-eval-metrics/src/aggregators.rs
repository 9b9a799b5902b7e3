use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Summary statistics over one numeric column. `std_dev` is the sample
/// standard deviation and is NaN for fewer than two values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub sum: f64,
}

/// Pairwise outcome counts over non-errored rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceTally {
    pub candidate: usize,
    pub baseline: usize,
    pub tie: usize,
}

impl ChoiceTally {
    pub fn total(&self) -> usize {
        self.candidate + self.baseline + self.tie
    }

    fn rate(&self, count: usize) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(count as f64 / total as f64),
        }
    }

    pub fn candidate_win_rate(&self) -> Option<f64> {
        self.rate(self.candidate)
    }

    pub fn baseline_win_rate(&self) -> Option<f64> {
        self.rate(self.baseline)
    }

    pub fn tie_rate(&self) -> Option<f64> {
        self.rate(self.tie)
    }
}

pub struct MetricAggregator;

impl MetricAggregator {
    /// Returns `None` for an empty slice.
    pub fn aggregate(values: &[f64]) -> Option<AggregatedMetrics> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let sum: f64 = values.iter().sum();
        let mean = Self::mean(values)?;

        Some(AggregatedMetrics {
            mean,
            median: Self::median(&sorted),
            std_dev: Self::sample_std_dev(values),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            count: values.len(),
            sum,
        })
    }

    pub fn mean(values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            None
        } else {
            Some(values.mean())
        }
    }

    /// Standard deviation with one delta degree of freedom.
    pub fn sample_std_dev(values: &[f64]) -> f64 {
        if values.len() < 2 {
            return f64::NAN;
        }
        values.std_dev()
    }

    fn median(sorted: &[f64]) -> f64 {
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_has_nan_std() {
        let stats = MetricAggregator::aggregate(&[4.0]).unwrap();
        assert_eq!(stats.mean, 4.0);
        assert!(stats.std_dev.is_nan());
    }

    #[test]
    fn test_sample_std_dev_uses_one_degree_of_freedom() {
        let std = MetricAggregator::sample_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((std - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!(MetricAggregator::sample_std_dev(&[]).is_nan());
    }

    #[test]
    fn test_tally_rates_sum_to_one() {
        let tally = ChoiceTally {
            candidate: 3,
            baseline: 1,
            tie: 0,
        };
        let total = tally.candidate_win_rate().unwrap()
            + tally.baseline_win_rate().unwrap()
            + tally.tie_rate().unwrap();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(ChoiceTally::default().candidate_win_rate(), None);
    }
}
