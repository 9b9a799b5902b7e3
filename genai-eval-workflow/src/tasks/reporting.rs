use async_trait::async_trait;
use genai_eval_core::{
    summary_value, Dataset, Metric, PairwiseChoice, Result, FAILURE_COLUMN, LATENCY_COLUMN,
};
use genai_eval_metrics::{ChoiceTally, MetricAggregator};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::{Task, TaskContext, TaskReport};

/// Summary statistics over the finished metrics table.
#[derive(Debug, Default)]
pub struct SummaryTask;

impl SummaryTask {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Task for SummaryTask {
    async fn execute(&self, context: &mut TaskContext) -> Result<TaskReport> {
        context.summary_metrics = summarize(&context.dataset, &context.metrics);
        info!(
            statistics = context.summary_metrics.len(),
            "Summary metrics computed"
        );
        Ok(TaskReport::completed(context.dataset.len(), 0))
    }

    fn name(&self) -> &str {
        "summary"
    }
}

/// Aggregate the row-level table. Never fails: statistics that cannot be computed are
/// logged and left out.
pub fn summarize(table: &Dataset, metrics: &[Metric]) -> BTreeMap<String, Value> {
    let mut summary = BTreeMap::new();
    summary.insert("row_count".to_string(), json!(table.len()));

    for metric in metrics {
        let name = metric.name();
        if metric.is_pairwise() {
            add_win_rates(&mut summary, table, name);
        } else {
            add_mean_std(&mut summary, table, &format!("{}/score", name), name);
        }
    }

    for column in [LATENCY_COLUMN, FAILURE_COLUMN] {
        if table.has_column(column) {
            add_mean_std(&mut summary, table, column, column);
        }
    }
    summary
}

fn numeric_values(table: &Dataset, column: &str) -> Vec<f64> {
    table
        .column_values(column)
        .iter()
        .filter_map(Value::as_f64)
        .collect()
}

fn add_mean_std(summary: &mut BTreeMap<String, Value>, table: &Dataset, column: &str, prefix: &str) {
    if !table.has_column(column) {
        debug!(column, "No score column; skipping statistics");
        return;
    }
    match MetricAggregator::aggregate(&numeric_values(table, column)) {
        Some(stats) => {
            summary.insert(format!("{}/mean", prefix), summary_value(stats.mean));
            summary.insert(format!("{}/std", prefix), summary_value(stats.std_dev));
        }
        None => warn!(column, "No numeric values; mean and std omitted"),
    }
}

/// Choice per row from `pairwise_choice`, falling back to the sign of a numeric score.
fn row_choice(choice: Option<&Value>, score: Option<&Value>) -> Option<PairwiseChoice> {
    match choice.and_then(Value::as_str) {
        Some("CANDIDATE") => return Some(PairwiseChoice::Candidate),
        Some("BASELINE") => return Some(PairwiseChoice::Baseline),
        Some("TIE") => return Some(PairwiseChoice::Tie),
        _ => {}
    }
    let score = score.and_then(Value::as_f64)?;
    Some(if score > 0.0 {
        PairwiseChoice::Candidate
    } else if score < 0.0 {
        PairwiseChoice::Baseline
    } else {
        PairwiseChoice::Tie
    })
}

fn add_win_rates(summary: &mut BTreeMap<String, Value>, table: &Dataset, name: &str) {
    let choice_column = format!("{}/pairwise_choice", name);
    let score_column = format!("{}/score", name);
    let mut tally = ChoiceTally::default();
    for row in table.rows() {
        match row_choice(row.get(&choice_column), row.get(&score_column)) {
            Some(PairwiseChoice::Candidate) => tally.candidate += 1,
            Some(PairwiseChoice::Baseline) => tally.baseline += 1,
            Some(PairwiseChoice::Tie) => tally.tie += 1,
            _ => {}
        }
    }

    let rates = [
        ("candidate_model_win_rate", tally.candidate_win_rate()),
        ("baseline_model_win_rate", tally.baseline_win_rate()),
        ("tie_rate", tally.tie_rate()),
    ];
    if tally.total() == 0 {
        warn!(metric = name, "No pairwise row has a usable choice; win rates omitted");
        return;
    }
    for (key, rate) in rates {
        if let Some(rate) = rate {
            summary.insert(format!("{}/{}", name, key), summary_value(rate));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use genai_eval_core::{MetricRegistry, NAN_SENTINEL};

    fn table(rows: Value) -> Dataset {
        Dataset::from_json_value(rows).unwrap()
    }

    #[test]
    fn test_mean_and_std_for_scores() {
        let metrics = vec![MetricRegistry::new().resolve("exact_match").unwrap()];
        let summary = summarize(
            &table(json!([{"exact_match/score": 1.0}, {"exact_match/score": 0.0}])),
            &metrics,
        );
        assert_eq!(summary["row_count"], json!(2));
        assert_relative_eq!(summary["exact_match/mean"].as_f64().unwrap(), 0.5);
        assert_relative_eq!(
            summary["exact_match/std"].as_f64().unwrap(),
            std::f64::consts::FRAC_1_SQRT_2
        );
    }

    #[test]
    fn test_single_row_std_is_nan_sentinel() {
        let metrics = vec![MetricRegistry::new().resolve("fluency").unwrap()];
        let summary = summarize(&table(json!([{"fluency/score": 4.0}])), &metrics);
        assert_eq!(summary["fluency/std"], json!(NAN_SENTINEL));
    }

    #[test]
    fn test_all_errored_rows_omit_statistics() {
        let metrics = vec![MetricRegistry::new().resolve("fluency").unwrap()];
        let summary = summarize(
            &table(json!([{"fluency/score": null, "fluency/explanation": "Error"}])),
            &metrics,
        );
        assert!(!summary.contains_key("fluency/mean"));
    }

    #[test]
    fn test_win_rates_skip_errored_rows() {
        let metrics = vec![MetricRegistry::new().resolve("pairwise_fluency").unwrap()];
        let summary = summarize(
            &table(json!([
                {"pairwise_fluency/pairwise_choice": "CANDIDATE"},
                {"pairwise_fluency/pairwise_choice": "TIE"},
                {"pairwise_fluency/pairwise_choice": null},
                {"pairwise_fluency/pairwise_choice": "BASELINE"}
            ])),
            &metrics,
        );
        let rate = |key: &str| summary[&format!("pairwise_fluency/{}", key)].as_f64().unwrap();
        assert_relative_eq!(rate("candidate_model_win_rate"), 1.0 / 3.0);
        assert_relative_eq!(
            rate("candidate_model_win_rate") + rate("baseline_model_win_rate") + rate("tie_rate"),
            1.0
        );
    }

    #[test]
    fn test_rubric_pairwise_uses_score_sign() {
        assert_eq!(
            row_choice(Some(&json!("Candidate response is better")), Some(&json!(0.5))),
            Some(PairwiseChoice::Candidate)
        );
        assert_eq!(row_choice(None, Some(&json!(-1.0))), Some(PairwiseChoice::Baseline));
        assert_eq!(row_choice(Some(&json!("Unable to parse verdict.")), Some(&Value::Null)), None);
    }
}
