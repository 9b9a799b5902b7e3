use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::dataset::Dataset;

pub const NAN_SENTINEL: &str = "NaN";

/// Outcome of one `evaluate` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    /// Numbers, or the string `"NaN"` when a statistic was undefined.
    pub summary_metrics: BTreeMap<String, Value>,
    pub metrics_table: Dataset,
    pub metadata: BTreeMap<String, String>,
}

impl EvalResult {
    pub fn summary_f64(&self, key: &str) -> Option<f64> {
        self.summary_metrics.get(key).and_then(Value::as_f64)
    }
}

/// Summary value for a statistic; NaN becomes the `"NaN"` sentinel.
pub fn summary_value(value: f64) -> Value {
    if value.is_nan() {
        Value::String(NAN_SENTINEL.to_string())
    } else {
        json!(value)
    }
}
