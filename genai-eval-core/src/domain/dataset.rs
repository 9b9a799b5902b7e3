use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use crate::error::{EvalError, Result};

pub const PROMPT_COLUMN: &str = "prompt";
pub const REFERENCE_COLUMN: &str = "reference";
pub const RESPONSE_COLUMN: &str = "response";
pub const BASELINE_MODEL_RESPONSE_COLUMN: &str = "baseline_model_response";
pub const PREDICTED_TRAJECTORY_COLUMN: &str = "predicted_trajectory";
pub const REFERENCE_TRAJECTORY_COLUMN: &str = "reference_trajectory";
pub const RUBRICS_COLUMN: &str = "rubrics";
pub const LATENCY_COLUMN: &str = "latency_in_seconds";
pub const FAILURE_COLUMN: &str = "failure";

/// A single dataset row keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// An ordered, column-aware table of evaluation rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from row records. Columns keep their first-seen order.
    pub fn from_records(records: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self {
            columns,
            rows: records,
        }
    }

    /// Build a dataset from named columns of equal length.
    pub fn from_columns(columns: Vec<(String, Vec<Value>)>) -> Result<Self> {
        let len = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != len) {
            return Err(EvalError::Validation(format!(
                "Column `{}` has {} values, expected {}",
                name,
                values.len(),
                len
            )));
        }

        let mut rows = vec![Row::new(); len];
        for (name, values) in &columns {
            for (row, value) in rows.iter_mut().zip(values) {
                row.insert(name.clone(), value.clone());
            }
        }

        Ok(Self {
            columns: columns.into_iter().map(|(name, _)| name).collect(),
            rows,
        })
    }

    /// Accepts either a list of records or an object mapping column names to value lists.
    pub fn from_json_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => {
                let records = items
                    .into_iter()
                    .enumerate()
                    .map(|(idx, item)| match item {
                        Value::Object(map) => Ok(map),
                        other => Err(EvalError::Validation(format!(
                            "Dataset record {} is not an object: {}",
                            idx, other
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::from_records(records))
            }
            Value::Object(map) => {
                let columns = map
                    .into_iter()
                    .map(|(name, values)| match values {
                        Value::Array(values) => Ok((name, values)),
                        other => Err(EvalError::Validation(format!(
                            "Dataset column `{}` is not a list: {}",
                            name, other
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::from_columns(columns)
            }
            other => Err(EvalError::Validation(format!(
                "Unsupported dataset JSON value: {}",
                other
            ))),
        }
    }

    pub fn from_jsonl_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line)? {
                Value::Object(map) => records.push(map),
                other => {
                    return Err(EvalError::Validation(format!(
                        "JSONL line {} is not an object: {}",
                        line_no + 1,
                        other
                    )))
                }
            }
        }
        Ok(Self::from_records(records))
    }

    /// Read a CSV file with a header row. Empty cells become null.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let mut row = Row::new();
            for (header, cell) in headers.iter().zip(record.iter()) {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                row.insert(header.clone(), value);
            }
            rows.push(row);
        }

        Ok(Self {
            columns: headers,
            rows,
        })
    }

    /// Load a dataset from a local `.jsonl`, `.json` or `.csv` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let file = File::open(path)?;
        match extension.as_str() {
            "jsonl" => Self::from_jsonl_reader(BufReader::new(file)),
            "json" => Self::from_json_value(serde_json::from_reader(BufReader::new(file))?),
            "csv" => Self::from_csv_reader(file),
            other => Err(EvalError::Configuration(format!(
                "Unsupported dataset source `{}` (extension `{}`); expected .jsonl, .json or .csv",
                path.display(),
                other
            ))),
        }
    }

    pub fn to_jsonl_writer<W: Write>(&self, mut writer: W) -> Result<()> {
        for row in &self.rows {
            let ordered: Row = self
                .columns
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                .collect();
            serde_json::to_writer(&mut writer, &ordered)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn to_csv_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|c| row.get(c).map(value_to_text).unwrap_or_default())
                .collect();
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Values of one column in row order; rows lacking the key yield null.
    pub fn column_values(&self, name: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Insert or overwrite a whole column.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(EvalError::Validation(format!(
                "Column `{}` has {} values but the dataset has {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        self.ensure_column(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(name.to_string(), value);
        }
        Ok(())
    }

    pub fn set_value(&mut self, row: usize, column: &str, value: Value) -> Result<()> {
        let len = self.rows.len();
        let target = self.rows.get_mut(row).ok_or_else(|| {
            EvalError::Validation(format!("Row {} out of range ({} rows)", row, len))
        })?;
        target.insert(column.to_string(), value);
        self.ensure_column(column);
        Ok(())
    }

    fn ensure_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }
}

/// Render a cell as plain text: strings verbatim, null as empty, everything else as JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_records_keeps_first_seen_column_order() {
        let dataset = Dataset::from_records(vec![
            record(json!({"response": "a", "reference": "b"})),
            record(json!({"prompt": "p", "response": "c"})),
        ]);
        assert_eq!(dataset.len(), 2);
        assert!(dataset.has_column("prompt"));
        assert_eq!(dataset.columns().len(), 3);
        assert_eq!(dataset.value(1, "prompt"), Some(&json!("p")));
    }

    #[test]
    fn test_from_columns_rejects_ragged_input() {
        let result = Dataset::from_columns(vec![
            ("a".to_string(), vec![json!(1), json!(2)]),
            ("b".to_string(), vec![json!(1)]),
        ]);
        assert!(matches!(result, Err(EvalError::Validation(_))));
    }

    #[test]
    fn test_set_column_length_mismatch() {
        let mut dataset = Dataset::from_records(vec![record(json!({"a": 1}))]);
        assert!(dataset.set_column("b", vec![]).is_err());
        dataset.set_column("b", vec![json!("x")]).unwrap();
        assert_eq!(dataset.columns(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!("hi")), "hi");
        assert_eq!(value_to_text(&Value::Null), "");
        assert_eq!(value_to_text(&json!(1.5)), "1.5");
        assert_eq!(value_to_text(&json!(["a"])), "[\"a\"]");
    }
}
