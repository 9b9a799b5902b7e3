//! `genai-eval metrics`

use anyhow::{anyhow, Context as _, Result};
use colored::Colorize;
use comfy_table::Cell;
use genai_eval_core::{metric_to_yaml, Metric, MetricDocument, MetricRegistry};
use serde::Serialize;

use crate::cli::{MetricsCommands, MetricsSubcommand};
use crate::context::Context;
use crate::output::{print_field, TableDisplay};

/// One row of `metrics list`
#[derive(Debug, Clone, Serialize)]
pub struct MetricRow {
    pub name: String,
    pub category: String,
}

impl TableDisplay for MetricRow {
    fn to_row(&self) -> Vec<Cell> {
        vec![Cell::new(&self.name), Cell::new(&self.category)]
    }
}

/// Execute metrics commands
pub async fn execute(ctx: &Context, cmd: MetricsCommands) -> Result<()> {
    match cmd.command {
        MetricsSubcommand::List => list(ctx),
        MetricsSubcommand::Show { name } => show(ctx, &name),
        MetricsSubcommand::Validate { file } => validate(ctx, &file),
    }
}

/// Every library metric, sorted by name
pub fn library_rows() -> Vec<MetricRow> {
    MetricRegistry::new()
        .names()
        .into_iter()
        .map(|(name, category)| MetricRow {
            name,
            category: category.as_str().to_string(),
        })
        .collect()
}

fn list(ctx: &Context) -> Result<()> {
    ctx.output.write_list(&library_rows(), &["Name", "Category"])
}

fn show(ctx: &Context, name: &str) -> Result<()> {
    let metric = MetricRegistry::new()
        .resolve(name)
        .ok_or_else(|| anyhow!("Unknown metric `{}`. Run `genai-eval metrics list`.", name))?;

    match metric {
        Metric::Pointwise(_) | Metric::Pairwise(_) | Metric::RubricBased(_) => {
            let yaml = metric_to_yaml(&metric)
                .with_context(|| format!("Failed to render metric `{}`", name))?;
            ctx.output.text(&yaml);
        }
        other => {
            print_field("name", other.name());
            print_field("type", "computation");
            let inputs: Vec<String> = other.required_inputs().into_iter().collect();
            print_field("required_inputs", &inputs.join(", "));
        }
    }
    Ok(())
}

fn validate(ctx: &Context, file: &std::path::Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {:?}", file))?;
    let document = MetricDocument::from_yaml(&text)
        .map_err(|e| anyhow!("{} is not a valid metric: {}", file.display(), e))?;
    document
        .to_metric()
        .map_err(|e| anyhow!("{} is not a valid metric: {}", file.display(), e))?;

    ctx.output.success(&format!(
        "{} defines metric {} (version {})",
        file.display(),
        document.metadata.name.bold(),
        document.metadata.version
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_rows_are_sorted() {
        let rows = library_rows();
        assert!(rows.iter().any(|r| r.name == "exact_match" && r.category == "automatic"));
        assert!(rows.iter().any(|r| r.name == "pairwise_fluency" && r.category == "pairwise"));
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
