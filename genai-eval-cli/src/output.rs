//! Output formatting for CLI

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use genai_eval_core::EvalResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}

/// Output writer that handles different formats
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    /// Create a new output writer
    pub fn new(format: OutputFormat, no_color: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Write a list of items
    pub fn write_list<T: Serialize + TableDisplay>(&self, items: &[T], headers: &[&str]) -> Result<()> {
        match self.format {
            OutputFormat::Table => {
                if items.is_empty() {
                    println!("{}", "No items found.".dimmed());
                    return Ok(());
                }

                let mut table = new_table(headers);
                for item in items {
                    table.add_row(item.to_row());
                }

                println!("{table}");
                println!(
                    "\n{} {} item(s)",
                    "Total:".bold(),
                    items.len().to_string().green()
                );
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(items)?),
        }
        Ok(())
    }

    /// Write the summary of an evaluation run
    pub fn write_result(&self, result: &EvalResult) -> Result<()> {
        match self.format {
            OutputFormat::Table => {
                print_section("Run");
                for (key, value) in &result.metadata {
                    if !value.is_empty() {
                        print_field(key, value);
                    }
                }

                print_section("Summary metrics");
                let mut table = new_table(&["Metric", "Value"]);
                for (key, value) in &result.summary_metrics {
                    table.add_row(vec![Cell::new(key), Cell::new(format_value(value))]);
                }
                println!("{table}");
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result_document(result))?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&result_document(result))?),
        }
        Ok(())
    }

    /// Write raw text, such as a YAML document
    pub fn text(&self, text: &str) {
        print!("{}", text);
        if !text.ends_with('\n') {
            println!();
        }
    }

    /// Write a success message
    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("{} {}", "✓".green(), message);
        } else {
            eprintln!("{}", message);
        }
    }

    /// Write an info message
    pub fn info(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("{} {}", "ℹ".blue(), message);
        } else {
            eprintln!("{}", message);
        }
    }

    /// Create a progress bar; hidden unless the output is a table
    pub fn progress_bar(&self) -> indicatif::ProgressBar {
        if self.format != OutputFormat::Table {
            return indicatif::ProgressBar::hidden();
        }
        let pb = indicatif::ProgressBar::new(0);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} {msg:>20} [{bar:40.cyan/blue}] {pos}/{len}")
        {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
        }
        pb
    }
}

/// Trait for displaying items in a table
pub trait TableDisplay {
    /// Convert item to a table row
    fn to_row(&self) -> Vec<Cell>;
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
    table
}

fn result_document(result: &EvalResult) -> Value {
    json!({
        "summary_metrics": result.summary_metrics,
        "metadata": result.metadata,
    })
}

/// Render a summary value; floats get four decimals.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .map(|f| format!("{:.4}", f))
            .unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Print a key-value pair in detail format
pub fn print_field(key: &str, value: &str) {
    println!("  {}: {}", key.cyan(), value);
}

/// Print a section header
pub fn print_section(title: &str) {
    println!("\n{}", title.bold().underline());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!(0.5)), "0.5000");
        assert_eq!(format_value(&json!(3)), "3");
        assert_eq!(format_value(&json!("NaN")), "NaN");
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Table.to_string(), "table");
        assert_eq!(OutputFormat::Json.to_string(), "json");
        assert_eq!(OutputFormat::Yaml.to_string(), "yaml");
    }

    #[test]
    fn test_result_document_shape() {
        let mut result = EvalResult::default();
        result.summary_metrics.insert("row_count".to_string(), json!(2));
        result
            .metadata
            .insert("experiment".to_string(), "nightly".to_string());

        let doc = result_document(&result);
        assert_eq!(doc["summary_metrics"]["row_count"], json!(2));
        assert_eq!(doc["metadata"]["experiment"], json!("nightly"));
    }
}
