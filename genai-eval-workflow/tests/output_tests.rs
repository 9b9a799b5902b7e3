use async_trait::async_trait;
use genai_eval_core::*;
use genai_eval_metrics::LocalEvaluationService;
use genai_eval_workflow::*;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn exact_match_task(prefix: &str, sink: Option<Arc<dyn OutputSink>>) -> EvalTask {
    let mut builder = EvalTask::builder(
        Dataset::from_json_value(json!([
            {"response": "a", "reference": "a"},
            {"response": "b", "reference": "c"}
        ]))
        .unwrap(),
        Arc::new(LocalEvaluationService::new()),
    )
    .metric("exact_match")
    .output_uri_prefix(prefix)
    .dataset_uri("file:///data/eval.jsonl")
    .run_config(EvaluationRunConfig {
        evaluation_service_qps: 1000.0,
        ..Default::default()
    });
    if let Some(sink) = sink {
        builder = builder.output_sink(sink);
    }
    builder.build().unwrap()
}

#[derive(Default)]
struct RecordingSink {
    writes: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn write(&self, uri: &str, bytes: Vec<u8>) -> Result<()> {
        self.writes.lock().unwrap().push((uri.to_string(), bytes));
        Ok(())
    }
}

// ===== Local Output Tests =====

#[tokio::test]
async fn test_writes_csv_table_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("run-1");
    let task = exact_match_task(prefix.to_str().unwrap(), None);

    task.evaluate(EvaluateOptions::default().with_output_file_name("results.csv"))
        .await
        .unwrap();

    let table = Dataset::load(prefix.join("results.csv")).unwrap();
    assert_eq!(table.len(), 2);
    assert!(table.has_column("exact_match/score"));

    let summary: Value =
        serde_json::from_slice(&std::fs::read(prefix.join(SUMMARY_FILE_NAME)).unwrap()).unwrap();
    assert_eq!(summary["summary_metrics"]["row_count"], json!(2));
    assert_eq!(summary["summary_metrics"]["exact_match/mean"], json!(0.5));
    assert_eq!(summary["dataset_uri"], json!("file:///data/eval.jsonl"));
    assert_eq!(summary["metric_descriptions"]["exact_match"]["type"], json!("computation"));
}

#[tokio::test]
async fn test_default_file_name_is_jsonl() {
    let dir = tempfile::tempdir().unwrap();
    let task = exact_match_task(dir.path().to_str().unwrap(), None);

    let result = task.evaluate(EvaluateOptions::default()).await.unwrap();

    let expected = default_output_file_name(&result.metadata["timestamp"]);
    let table = Dataset::load(dir.path().join(&expected)).unwrap();
    assert_eq!(table.column_values("exact_match/score"), vec![json!(1.0), json!(0.0)]);
}

#[tokio::test]
async fn test_remote_prefix_needs_a_sink() {
    let task = exact_match_task("gs://bucket/evals", None);
    let err = task.evaluate(EvaluateOptions::default()).await.unwrap_err();
    assert!(matches!(err, EvalError::Configuration(_)));
}

// ===== Custom Sink Tests =====

#[tokio::test]
async fn test_custom_sink_receives_both_files() {
    let sink = Arc::new(RecordingSink::default());
    let task = exact_match_task("gs://bucket/evals/", Some(sink.clone()));

    task.evaluate(EvaluateOptions::default().with_output_file_name("table.jsonl"))
        .await
        .unwrap();

    let writes = sink.writes.lock().unwrap();
    let uris: Vec<&str> = writes.iter().map(|(uri, _)| uri.as_str()).collect();
    assert_eq!(
        uris,
        vec!["gs://bucket/evals/table.jsonl", "gs://bucket/evals/summary_metrics.json"]
    );
    let lines = String::from_utf8(writes[0].1.clone()).unwrap();
    assert_eq!(lines.lines().count(), 2);
}
