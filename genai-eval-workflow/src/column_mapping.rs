//! Logical input names resolved to dataset columns.

use genai_eval_core::{
    value_to_text, Dataset, EvalError, PromptTemplate, Result, Row,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// `logical name -> dataset column`.
///
/// Seeded with the identity for every dataset column, then user overrides are applied.
/// An override whose key is already a dataset column is refused; the column wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricColumnMapping {
    mapping: BTreeMap<String, String>,
}

impl MetricColumnMapping {
    pub fn initialize(dataset: &Dataset, overrides: &BTreeMap<String, String>) -> Self {
        let mut mapping: BTreeMap<String, String> = dataset
            .columns()
            .iter()
            .map(|c| (c.clone(), c.clone()))
            .collect();

        for (logical, column) in overrides {
            if dataset.has_column(logical) {
                if logical != column {
                    warn!(
                        key = %logical,
                        column = %column,
                        "Mapping override ignored: `{}` is already a dataset column",
                        logical
                    );
                }
                continue;
            }
            mapping.insert(logical.clone(), column.clone());
        }

        Self { mapping }
    }

    /// Column holding `logical`; unmapped names resolve to themselves.
    pub fn resolve<'a>(&'a self, logical: &'a str) -> &'a str {
        self.mapping.get(logical).map(String::as_str).unwrap_or(logical)
    }

    pub fn get(&self, logical: &str) -> Option<&str> {
        self.mapping.get(logical).map(String::as_str)
    }

    pub fn set(&mut self, logical: impl Into<String>, column: impl Into<String>) {
        self.mapping.insert(logical.into(), column.into());
    }

    /// True when `logical` maps to a column present in `dataset`.
    pub fn is_bound(&self, logical: &str, dataset: &Dataset) -> bool {
        dataset.has_column(self.resolve(logical))
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.mapping
    }

    /// Logical names whose resolved column is absent from `dataset`.
    pub fn missing<'a, I>(&self, logical_names: I, dataset: &Dataset) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        logical_names
            .into_iter()
            .filter(|name| !self.is_bound(name, dataset))
            .map(|name| self.resolve(name).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Fill `template` from `row`, reading every variable through the mapping.
    pub fn assemble_row(&self, template: &PromptTemplate, row: &Row) -> PromptTemplate {
        template.assemble_with(|name| row.get(self.resolve(name)).map(value_to_text))
    }

    /// Assemble `template` for every row, failing with the missing variables when a
    /// placeholder has no column.
    pub fn assemble_prompts(&self, template: &PromptTemplate, dataset: &Dataset) -> Result<Vec<String>> {
        let missing = self.missing(&template.variables, dataset);
        if !missing.is_empty() {
            return Err(EvalError::Template {
                missing,
                available: dataset.columns().to_vec(),
            });
        }
        Ok(dataset
            .rows()
            .iter()
            .map(|row| self.assemble_row(template, row).template)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn dataset() -> Dataset {
        Dataset::from_json_value(json!([
            {"question": "What is Rust?", "answer": "A language", "response": "x"}
        ]))
        .unwrap()
    }

    #[test]
    fn test_override_of_existing_column_is_refused() {
        let overrides = BTreeMap::from([
            ("prompt".to_string(), "question".to_string()),
            ("response".to_string(), "answer".to_string()),
        ]);
        let mapping = MetricColumnMapping::initialize(&dataset(), &overrides);
        assert_eq!(mapping.resolve("prompt"), "question");
        assert_eq!(mapping.resolve("response"), "response");
        assert_eq!(mapping.resolve("reference"), "reference");
    }

    #[rstest]
    #[case::unmapped_logical_name("prompt", "question", "question")]
    #[case::existing_column_wins("response", "answer", "response")]
    #[case::identity_override("question", "question", "question")]
    #[case::missing_target_column("reference", "gold", "gold")]
    fn test_override_matrix(#[case] logical: &str, #[case] column: &str, #[case] resolved: &str) {
        let overrides = BTreeMap::from([(logical.to_string(), column.to_string())]);
        let mapping = MetricColumnMapping::initialize(&dataset(), &overrides);
        assert_eq!(mapping.resolve(logical), resolved);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let data = dataset();
        let overrides = BTreeMap::from([("prompt".to_string(), "question".to_string())]);
        let once = MetricColumnMapping::initialize(&data, &overrides);
        let twice = MetricColumnMapping::initialize(&data, once.as_map());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_assemble_prompts_reports_missing_variables() {
        let data = dataset();
        let mapping = MetricColumnMapping::initialize(&data, &BTreeMap::new());
        let err = mapping
            .assemble_prompts(&PromptTemplate::new("{question} in {language}"), &data)
            .unwrap_err();
        match err {
            EvalError::Template { missing, available } => {
                assert_eq!(missing, vec!["language".to_string()]);
                assert!(available.contains(&"question".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
