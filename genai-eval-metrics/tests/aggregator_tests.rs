use approx::assert_relative_eq;
use genai_eval_metrics::aggregators::{ChoiceTally, MetricAggregator};
use proptest::prelude::*;
use test_case::test_case;

// ===== Basic Aggregation Tests =====

#[test]
fn test_aggregate_basic_stats() {
    let stats = MetricAggregator::aggregate(&[10.0, 20.0, 30.0, 40.0, 50.0]).unwrap();

    assert_eq!(stats.count, 5);
    assert_eq!(stats.min, 10.0);
    assert_eq!(stats.max, 50.0);
    assert_relative_eq!(stats.mean, 30.0);
    assert_relative_eq!(stats.median, 30.0);
    assert_relative_eq!(stats.sum, 150.0);
}

#[test]
fn test_sample_std_uses_n_minus_one() {
    // Variance of [5, 4] with ddof=1 is 0.5.
    let stats = MetricAggregator::aggregate(&[5.0, 4.0]).unwrap();
    assert_relative_eq!(stats.std_dev, 0.5_f64.sqrt(), epsilon = 1e-12);
    assert_relative_eq!(stats.median, 4.5);
}

#[test]
fn test_empty_input() {
    assert!(MetricAggregator::aggregate(&[]).is_none());
    assert!(MetricAggregator::mean(&[]).is_none());
}

// ===== Win Rate Tests =====

#[test_case(3, 1, 0, 0.75, 0.25 ; "candidate majority")]
#[test_case(0, 2, 2, 0.0, 0.5 ; "baseline and ties")]
#[test_case(1, 1, 0, 0.5, 0.5 ; "even split")]
fn test_win_rates(candidate: usize, baseline: usize, tie: usize, cand_rate: f64, base_rate: f64) {
    let tally = ChoiceTally {
        candidate,
        baseline,
        tie,
    };
    assert_relative_eq!(tally.candidate_win_rate().unwrap(), cand_rate);
    assert_relative_eq!(tally.baseline_win_rate().unwrap(), base_rate);
}

proptest! {
    #[test]
    fn prop_rates_sum_to_one(candidate in 0usize..50, baseline in 0usize..50, tie in 0usize..50) {
        let tally = ChoiceTally { candidate, baseline, tie };
        prop_assume!(tally.total() > 0);
        let sum = tally.candidate_win_rate().unwrap()
            + tally.baseline_win_rate().unwrap()
            + tally.tie_rate().unwrap();
        prop_assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn prop_mean_within_bounds(values in proptest::collection::vec(-1.0e6f64..1.0e6, 1..64)) {
        let stats = MetricAggregator::aggregate(&values).unwrap();
        prop_assert!(stats.mean >= stats.min - 1e-6);
        prop_assert!(stats.mean <= stats.max + 1e-6);
    }
}
