//! Parsers for rubric generation output and rubric critique verdicts.
//!
//! Everything here is a pure function of its input text so that self-consistency voting is
//! deterministic across runs.

use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

use super::dataset::{Row, RUBRICS_COLUMN};
use crate::error::{EvalError, Result};

pub const UNPARSABLE_VERDICT: &str = "Unable to parse verdict.";
pub const UNPARSABLE_RUBRIC_PAIRS: &str = "Unable to parse rubric verdict pairs from response.";

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fence pattern is valid"))
}

fn question_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<question>(.*?)</question>").expect("question pattern is valid")
    })
}

fn verdict_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^\s*(?:question:)?\s*(.*?)\s*verdict:\s*(yes|no)\b")
            .expect("verdict pattern is valid")
    })
}

fn sxs_rating_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[SxS Rating:\s*([^\]]*)\]\]").expect("rating pattern is valid"))
}

fn answers_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?s)\[\[Response A Answers:\]\](.*?)\[\[Response B Answers:\]\](.*?)(?:\[\[SxS Rating|\z)",
        )
        .expect("answers pattern is valid")
    })
}

/// Default rubric generation parser.
///
/// Strips an optional fenced ```json block, decodes the object and renames `questions` to
/// `rubrics`. Every other key is kept and ends up as its own dataset column.
pub fn parse_rubrics(text: &str) -> Result<Row> {
    let body = fence_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim();

    let value: Value = serde_json::from_str(body)
        .map_err(|e| EvalError::Parse(format!("rubric generation output is not JSON: {}", e)))?;
    let Value::Object(mut map) = value else {
        return Err(EvalError::Parse(
            "rubric generation output is not a JSON object".to_string(),
        ));
    };

    if let Some(questions) = map.remove("questions") {
        map.insert(RUBRICS_COLUMN.to_string(), questions);
    }
    Ok(map)
}

/// Render rubrics as the `<question>` blocks the critique templates expect.
pub fn format_rubrics_as_questions(rubrics: &[String]) -> String {
    rubrics
        .iter()
        .map(|rubric| format!("<question>{}</question>", rubric))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `(question, verdict)` pairs found in one judge sample.
pub fn extract_verdict_pairs(text: &str) -> Vec<(String, bool)> {
    question_block_regex()
        .captures_iter(text)
        .filter_map(|block| {
            let caps = verdict_regex().captures(block.get(1)?.as_str())?;
            let question = caps.get(1)?.as_str().trim().to_string();
            let verdict = caps.get(2)?.as_str().eq_ignore_ascii_case("yes");
            Some((question, verdict))
        })
        .collect()
}

/// Sign vote across samples: +1 per yes, -1 per no, verdict is a positive sum.
/// Questions keep their first-seen order.
fn vote<'a, I>(samples: I) -> Vec<(String, bool)>
where
    I: IntoIterator<Item = &'a [(String, bool)]>,
{
    let mut tallies: Vec<(String, i64)> = Vec::new();
    for pairs in samples {
        for (question, verdict) in pairs {
            let delta = if *verdict { 1 } else { -1 };
            match tallies.iter_mut().find(|(q, _)| q == question) {
                Some((_, sum)) => *sum += delta,
                None => tallies.push((question.clone(), delta)),
            }
        }
    }
    tallies
        .into_iter()
        .map(|(question, sum)| (question, sum > 0))
        .collect()
}

fn render_pairs(pairs: &[(String, bool)]) -> String {
    pairs
        .iter()
        .map(|(question, verdict)| {
            format!("{}: {}", question, if *verdict { "Yes" } else { "No" })
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn score_value(score: Option<f64>) -> Value {
    score.map(|s| json!(s)).unwrap_or(Value::Null)
}

/// Aggregate pointwise rubric critiques into `score`, `rubric_verdict_pairs` and `raw_outputs`.
pub fn parse_pointwise_rubric_result(raw_outputs: &[String]) -> Result<Row> {
    let samples: Vec<Vec<(String, bool)>> = raw_outputs
        .iter()
        .map(|text| extract_verdict_pairs(text))
        .collect();
    let verdicts = vote(samples.iter().map(Vec::as_slice));

    let score = if verdicts.is_empty() {
        None
    } else {
        let passed = verdicts.iter().filter(|(_, v)| *v).count();
        Some(passed as f64 / verdicts.len() as f64)
    };

    let mut row = Row::new();
    row.insert("score".to_string(), score_value(score));
    row.insert(
        "rubric_verdict_pairs".to_string(),
        Value::String(render_pairs(&verdicts)),
    );
    row.insert("raw_outputs".to_string(), json!(raw_outputs));
    Ok(row)
}

/// Score and verdict sentence for a side-by-side rating token such as `B>A`.
pub fn sxs_rating_score(token: &str) -> Option<(f64, &'static str)> {
    let compact: String = token.chars().filter(|c| !c.is_whitespace()).collect();
    let rating = match compact.as_str() {
        "B>>A" | "A<<B" => (
            1.0,
            "Candidate response is better than the baseline response.",
        ),
        "B>A" | "A<B" => (
            0.5,
            "Candidate response is slightly better than the baseline response.",
        ),
        "A=B" | "B=A" => (0.0, "Both responses are equally good."),
        "A>B" | "B<A" => (
            -0.5,
            "Baseline response is slightly better than the candidate response.",
        ),
        "A>>B" | "B<<A" => (
            -1.0,
            "Baseline response is better than the candidate response.",
        ),
        _ => return None,
    };
    Some(rating)
}

/// Verdict sentence of the rating level closest to `score`.
fn nearest_verdict(score: f64) -> &'static str {
    const LEVELS: [&str; 5] = ["A>>B", "A>B", "A=B", "B>A", "B>>A"];
    LEVELS
        .iter()
        .filter_map(|token| sxs_rating_score(token))
        .min_by(|a, b| {
            (a.0 - score)
                .abs()
                .partial_cmp(&(b.0 - score).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(_, sentence)| sentence)
        .unwrap_or(UNPARSABLE_VERDICT)
}

struct PairwiseSample {
    rating: Option<(f64, &'static str)>,
    baseline_pairs: Option<Vec<(String, bool)>>,
    candidate_pairs: Option<Vec<(String, bool)>>,
}

fn parse_pairwise_sample(text: &str) -> PairwiseSample {
    let rating = sxs_rating_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| sxs_rating_score(m.as_str()));

    let (baseline_pairs, candidate_pairs) = match answers_regex().captures(text) {
        Some(caps) => (
            caps.get(1).map(|m| extract_verdict_pairs(m.as_str())),
            caps.get(2).map(|m| extract_verdict_pairs(m.as_str())),
        ),
        None => (None, None),
    };

    PairwiseSample {
        rating,
        baseline_pairs,
        candidate_pairs,
    }
}

/// Aggregate pairwise rubric critiques.
///
/// Response A is the baseline and response B the candidate. With several samples the score is
/// the mean over samples whose rating parsed, and the choice is the sentence of the nearest
/// rating level. A row whose answer blocks cannot be found keeps a null score.
pub fn parse_pairwise_rubric_result(raw_outputs: &[String]) -> Result<Row> {
    let samples: Vec<PairwiseSample> = raw_outputs
        .iter()
        .map(|text| parse_pairwise_sample(text))
        .collect();

    let ratings: Vec<(f64, &'static str)> = samples.iter().filter_map(|s| s.rating).collect();
    let baseline: Vec<&[(String, bool)]> = samples
        .iter()
        .filter_map(|s| s.baseline_pairs.as_deref())
        .collect();
    let candidate: Vec<&[(String, bool)]> = samples
        .iter()
        .filter_map(|s| s.candidate_pairs.as_deref())
        .collect();

    let (choice, score) = if ratings.is_empty() {
        (UNPARSABLE_VERDICT.to_string(), None)
    } else if baseline.is_empty() || candidate.is_empty() {
        (UNPARSABLE_RUBRIC_PAIRS.to_string(), None)
    } else if ratings.len() == 1 {
        (ratings[0].1.to_string(), Some(ratings[0].0))
    } else {
        let mean = ratings.iter().map(|(s, _)| s).sum::<f64>() / ratings.len() as f64;
        (nearest_verdict(mean).to_string(), Some(mean))
    };

    let mut row = Row::new();
    row.insert("pairwise_choice".to_string(), Value::String(choice));
    row.insert("score".to_string(), score_value(score));
    row.insert(
        "baseline_rubric_verdict_pairs".to_string(),
        Value::String(render_pairs(&vote(baseline))),
    );
    row.insert(
        "candidate_rubric_verdict_pairs".to_string(),
        Value::String(render_pairs(&vote(candidate))),
    );
    row.insert("raw_outputs".to_string(), json!(raw_outputs));
    Ok(row)
}
