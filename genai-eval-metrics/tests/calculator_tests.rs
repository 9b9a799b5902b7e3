use approx::assert_relative_eq;
use genai_eval_core::{MetricCalculator, ToolCall, TrajectoryMetricKind};
use genai_eval_metrics::calculators::*;
use rstest::rstest;
use serde_json::json;

// ===== Exact Match Tests =====

#[rstest]
#[case("test", "test", 1.0)]
#[case("text", "ref", 0.0)]
#[case("Test", "test", 0.0)]
#[case("", "", 1.0)]
#[tokio::test]
async fn test_exact_match(#[case] prediction: &str, #[case] reference: &str, #[case] expected: f64) {
    let output = ExactMatchCalculator::new()
        .calculate(MetricInput::new(prediction, reference))
        .await
        .unwrap();
    assert_eq!(output.score, expected);
}

#[tokio::test]
async fn test_exact_match_requires_reference() {
    let input = MetricInput {
        prediction: "x".to_string(),
        reference: None,
    };
    assert!(ExactMatchCalculator::new().calculate(input).await.is_err());
}

// ===== BLEU Tests =====

#[tokio::test]
async fn test_bleu_identical_sentence() {
    let sentence = "the quick brown fox jumps over the lazy dog";
    let output = BleuCalculator::default()
        .calculate(MetricInput::new(sentence, sentence))
        .await
        .unwrap();
    assert_relative_eq!(output.score, 1.0, epsilon = 1e-9);
    assert_eq!(output.metadata["precisions"].as_array().unwrap().len(), 4);
}

#[test]
fn test_bleu_disjoint_is_small_but_smoothed() {
    let (score, precisions) = BleuCalculator::default().calculate_bleu("a b c d", "w x y z");
    assert!(score > 0.0 && score < 0.2);
    assert!(precisions.iter().all(|p| *p > 0.0));
}

#[test]
fn test_bleu_brevity_penalty_applies() {
    let calc = BleuCalculator::default();
    let (full, _) = calc.calculate_bleu("one two three four five six", "one two three four five six");
    let (short, _) = calc.calculate_bleu("one two three four", "one two three four five six");
    assert!(short < full);
}

// ===== ROUGE Tests =====

#[rstest]
#[case("rouge1", 0.6)]
#[case("rouge2", 0.25)]
#[case("rougeL", 0.6)]
fn test_rouge_partial_overlap(#[case] rouge_type: &str, #[case] expected: f64) {
    let calc = RougeCalculator::from_type(rouge_type, false, false).unwrap();
    let score = calc.score("the cat sat on mat", "the dog sat on floor");
    assert_relative_eq!(score.fmeasure, expected, epsilon = 1e-9);
}

#[test]
fn test_rouge_lsum_uses_sentence_union() {
    let rouge_l = RougeCalculator::rouge_l();
    let rouge_lsum = RougeCalculator::new(RougeVariant::RougeLsum);
    let prediction = "a b\nc d";
    let reference = "c d\na b";

    assert_relative_eq!(rouge_l.score(prediction, reference).fmeasure, 0.5, epsilon = 1e-9);
    assert_relative_eq!(rouge_lsum.score(prediction, reference).fmeasure, 1.0, epsilon = 1e-9);
}

#[test]
fn test_rouge_lsum_split_summaries() {
    let calc = RougeCalculator::from_type("rougeLsum", false, true).unwrap();
    let score = calc.score("Dogs bark. Cats meow.", "Cats meow. Dogs bark.");
    assert_relative_eq!(score.fmeasure, 1.0, epsilon = 1e-9);
}

#[tokio::test]
async fn test_rouge_metadata() {
    let output = RougeCalculator::rouge_1()
        .calculate(MetricInput::new("the cat", "the cat sat"))
        .await
        .unwrap();
    assert_relative_eq!(output.metadata["precision"].as_f64().unwrap(), 1.0);
    assert_relative_eq!(output.metadata["recall"].as_f64().unwrap(), 2.0 / 3.0, epsilon = 1e-9);
    assert_relative_eq!(output.score, 0.8, epsilon = 1e-9);
}

// ===== Tool Call Tests =====

fn tool_output(name: &str, arguments: serde_json::Value) -> String {
    json!({"content": "", "tool_calls": [{"name": name, "arguments": arguments}]}).to_string()
}

#[rstest]
#[case(ToolCallCheck::NameMatch, "search", json!({"q": "rust"}), 1.0)]
#[case(ToolCallCheck::NameMatch, "lookup", json!({"q": "rust"}), 0.0)]
#[case(ToolCallCheck::ParameterKeyMatch, "search", json!({"q": "go"}), 1.0)]
#[case(ToolCallCheck::ParameterKeyMatch, "search", json!({"query": "rust"}), 0.0)]
#[case(ToolCallCheck::ParameterKvMatch { use_strict_string_match: true }, "search", json!({"q": "rust"}), 1.0)]
#[case(ToolCallCheck::ParameterKvMatch { use_strict_string_match: true }, "search", json!({"q": "go"}), 0.0)]
fn test_tool_checks(
    #[case] check: ToolCallCheck,
    #[case] name: &str,
    #[case] arguments: serde_json::Value,
    #[case] expected: f64,
) {
    let reference = tool_output("search", json!({"q": "rust"}));
    let prediction = tool_output(name, arguments);
    let score = ToolCallCalculator::new(check)
        .score(&prediction, Some(&reference))
        .unwrap();
    assert_eq!(score, expected);
}

#[test]
fn test_tool_call_count_mismatch() {
    let reference = json!({"tool_calls": [
        {"name": "a", "arguments": {}},
        {"name": "b", "arguments": {}}
    ]})
    .to_string();
    let prediction = tool_output("a", json!({}));
    let score = ToolCallCalculator::new(ToolCallCheck::NameMatch)
        .score(&prediction, Some(&reference))
        .unwrap();
    assert_eq!(score, 0.0);
}

// ===== Trajectory Tests =====

fn trajectory(names: &[&str]) -> Vec<ToolCall> {
    names
        .iter()
        .map(|n| ToolCall::new(*n, &json!({"arg": n})))
        .collect()
}

#[rstest]
#[case(TrajectoryMetricKind::ExactMatch, &["a", "b", "c"], &["a", "c"], 0.0)]
#[case(TrajectoryMetricKind::ExactMatch, &["a", "c"], &["a", "c"], 1.0)]
#[case(TrajectoryMetricKind::InOrderMatch, &["a", "b", "c"], &["a", "c"], 1.0)]
#[case(TrajectoryMetricKind::InOrderMatch, &["a", "b", "c"], &["c", "a"], 0.0)]
#[case(TrajectoryMetricKind::AnyOrderMatch, &["a", "b", "c"], &["c", "a"], 1.0)]
#[case(TrajectoryMetricKind::AnyOrderMatch, &["a"], &["a", "d"], 0.0)]
#[case(TrajectoryMetricKind::Recall, &["a", "b", "c"], &["a", "c"], 1.0)]
#[case(TrajectoryMetricKind::Recall, &[], &["a"], 0.0)]
fn test_trajectory_scores(
    #[case] kind: TrajectoryMetricKind,
    #[case] predicted: &[&str],
    #[case] reference: &[&str],
    #[case] expected: f64,
) {
    let score = TrajectoryCalculator::new(kind)
        .score(&trajectory(predicted), Some(&trajectory(reference)))
        .unwrap();
    assert_eq!(score, expected);
}

#[test]
fn test_trajectory_precision() {
    let score = TrajectoryCalculator::new(TrajectoryMetricKind::Precision)
        .score(&trajectory(&["a", "b", "c"]), Some(&trajectory(&["a", "c"])))
        .unwrap();
    assert_relative_eq!(score, 2.0 / 3.0, epsilon = 1e-12);
}

#[tokio::test]
async fn test_single_tool_use_ignores_reference() {
    let calc = TrajectoryCalculator::new(TrajectoryMetricKind::SingleToolUse {
        tool_name: "b".to_string(),
    });
    let output = calc
        .calculate(TrajectoryInput {
            predicted: trajectory(&["a", "b"]),
            reference: None,
        })
        .await
        .unwrap();
    assert_eq!(output.score, 1.0);
}

#[test]
fn test_trajectory_requires_reference() {
    let result =
        TrajectoryCalculator::new(TrajectoryMetricKind::ExactMatch).score(&trajectory(&["a"]), None);
    assert!(result.is_err());
}
