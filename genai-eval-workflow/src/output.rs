//! Persisting an evaluation result under an output prefix.

use async_trait::async_trait;
use genai_eval_core::{EvalError, EvalResult, Metric, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SUMMARY_FILE_NAME: &str = "summary_metrics.json";

/// Destination for result files.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write(&self, uri: &str, bytes: Vec<u8>) -> Result<()>;
}

/// Writes to the local filesystem. URIs with a scheme (`gs://...`) are refused.
#[derive(Debug, Clone, Default)]
pub struct LocalOutputSink;

impl LocalOutputSink {
    pub fn new() -> Self {
        Self
    }
}

fn has_scheme(uri: &str) -> bool {
    uri.split_once("://")
        .map(|(scheme, _)| !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'))
        .unwrap_or(false)
}

#[async_trait]
impl OutputSink for LocalOutputSink {
    async fn write(&self, uri: &str, bytes: Vec<u8>) -> Result<()> {
        if has_scheme(uri) {
            return Err(EvalError::Configuration(format!(
                "`{}` is not a local path; supply an OutputSink for this scheme",
                uri
            )));
        }
        let path = Path::new(uri);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let size = bytes.len();
        tokio::fs::write(path, bytes).await?;
        info!(path = %uri, bytes = size, "Wrote output file");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Jsonl,
}

impl TableFormat {
    /// `.csv` selects CSV; anything else is JSON lines.
    pub fn from_file_name(name: &str) -> Self {
        if name.to_ascii_lowercase().ends_with(".csv") {
            TableFormat::Csv
        } else {
            TableFormat::Jsonl
        }
    }
}

pub fn default_output_file_name(timestamp: &str) -> String {
    format!("eval_results_{}.jsonl", timestamp)
}

/// Joins a prefix and a file name with exactly one `/`.
pub fn join_uri(prefix: &str, file_name: &str) -> String {
    if prefix.is_empty() {
        return file_name.to_string();
    }
    format!("{}/{}", prefix.trim_end_matches('/'), file_name)
}

#[derive(Debug, Serialize)]
struct SummaryDocument<'a> {
    summary_metrics: &'a BTreeMap<String, Value>,
    candidate_model_name: Option<&'a str>,
    baseline_model_name: Option<&'a str>,
    dataset_uri: Option<&'a str>,
    metric_descriptions: BTreeMap<String, Value>,
}

fn metric_description(metric: &Metric) -> Value {
    match metric.metric_prompt_template() {
        Some(template) => json!({ "metric_prompt_template": template }),
        None if metric.is_custom() => json!({ "type": "custom" }),
        None => json!({ "type": "computation" }),
    }
}

/// Everything the writer needs besides the result itself.
#[derive(Debug, Clone, Default)]
pub struct OutputRequest<'a> {
    pub prefix: &'a str,
    pub file_name: Option<&'a str>,
    pub dataset_uri: Option<&'a str>,
}

/// Writes the metrics table and `summary_metrics.json` next to it. Returns the table URI.
pub async fn write_result(
    sink: &dyn OutputSink,
    request: &OutputRequest<'_>,
    result: &EvalResult,
    metrics: &[Metric],
) -> Result<String> {
    let file_name = match request.file_name {
        Some(name) => name.to_string(),
        None => default_output_file_name(
            result
                .metadata
                .get("timestamp")
                .map(String::as_str)
                .unwrap_or("latest"),
        ),
    };
    let table_uri = join_uri(request.prefix, &file_name);

    let mut table = Vec::new();
    match TableFormat::from_file_name(&file_name) {
        TableFormat::Csv => result.metrics_table.to_csv_writer(&mut table)?,
        TableFormat::Jsonl => result.metrics_table.to_jsonl_writer(&mut table)?,
    }
    sink.write(&table_uri, table).await?;

    let summary = SummaryDocument {
        summary_metrics: &result.summary_metrics,
        candidate_model_name: result.metadata.get("candidate_model_name").map(String::as_str),
        baseline_model_name: result.metadata.get("baseline_model_name").map(String::as_str),
        dataset_uri: request.dataset_uri,
        metric_descriptions: metrics
            .iter()
            .map(|m| (m.name().to_string(), metric_description(m)))
            .collect(),
    };
    let summary_uri = join_uri(&parent_uri(&table_uri), SUMMARY_FILE_NAME);
    sink.write(&summary_uri, serde_json::to_vec_pretty(&summary)?)
        .await?;
    Ok(table_uri)
}

fn parent_uri(uri: &str) -> String {
    match uri.rfind('/') {
        Some(index) => uri[..index].to_string(),
        None => String::new(),
    }
}

/// Local path for a URI, if it has no scheme.
pub fn local_path(uri: &str) -> Option<PathBuf> {
    (!has_scheme(uri)).then(|| PathBuf::from(uri))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(TableFormat::from_file_name("out.CSV"), TableFormat::Csv);
        assert_eq!(TableFormat::from_file_name("out.jsonl"), TableFormat::Jsonl);
        assert_eq!(TableFormat::from_file_name("out"), TableFormat::Jsonl);
    }

    #[test]
    fn test_join_uri() {
        assert_eq!(join_uri("gs://bucket/run/", "a.csv"), "gs://bucket/run/a.csv");
        assert_eq!(join_uri("", "a.csv"), "a.csv");
        assert_eq!(parent_uri("gs://bucket/run/a.csv"), "gs://bucket/run");
    }

    #[test]
    fn test_scheme_detection() {
        assert!(local_path("gs://bucket/x").is_none());
        assert_eq!(local_path("/tmp/out/x.jsonl"), Some(PathBuf::from("/tmp/out/x.jsonl")));
        assert!(local_path("relative/dir").is_some());
    }
}
