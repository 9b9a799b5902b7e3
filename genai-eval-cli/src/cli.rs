//! Command-line argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Run GenAI evaluations against local or hosted judges
#[derive(Debug, Parser)]
#[command(name = "genai-eval", version, about, long_about = None)]
pub struct Cli {
    /// Additional configuration file layered over `config/default`
    #[arg(long, global = true, env = "GENAI_EVAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(short, long, global = true, value_enum)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Evaluate a dataset
    Run(RunArgs),

    /// Inspect the metric library
    Metrics(MetricsCommands),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Dataset file (.jsonl, .json or .csv)
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// Library metric name or path to a metric YAML file; repeatable
    #[arg(short, long = "metric", required = true)]
    pub metrics: Vec<String>,

    /// Column mapping override, `metric_input=dataset_column`; repeatable
    #[arg(long = "mapping", value_parser = parse_mapping)]
    pub mappings: Vec<(String, String)>,

    /// Base URL of a hosted judge
    #[arg(long, conflicts_with = "local_judge")]
    pub judge_url: Option<String>,

    /// Score computation metrics in-process
    #[arg(long)]
    pub local_judge: bool,

    /// Generate responses with this hosted model before scoring
    #[arg(long)]
    pub model: Option<String>,

    /// Prompt template used to build model inputs from dataset columns
    #[arg(long, requires = "model")]
    pub prompt_template: Option<String>,

    /// Directory or URI prefix for the results table and summary
    #[arg(short, long)]
    pub output: Option<String>,

    /// File name of the results table; `.csv` selects CSV
    #[arg(long, requires = "output")]
    pub output_file: Option<String>,

    /// Experiment name recorded in the run metadata
    #[arg(long)]
    pub experiment: Option<String>,
}

#[derive(Debug, Args)]
pub struct MetricsCommands {
    #[command(subcommand)]
    pub command: MetricsSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum MetricsSubcommand {
    /// List library metrics
    List,

    /// Print a library metric as YAML
    Show {
        /// Metric name
        name: String,
    },

    /// Validate a metric YAML file
    Validate {
        /// Path to the YAML file
        file: PathBuf,
    },
}

/// Parse `key=value`.
pub fn parse_mapping(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected `metric_input=column`, got `{}`", raw)),
    }
}
