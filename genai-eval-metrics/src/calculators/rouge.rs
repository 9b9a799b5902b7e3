use async_trait::async_trait;
use genai_eval_core::{EvalError, MetricCalculator, Result};
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use super::{MetricInput, MetricOutput};

static STEMMER: OnceLock<Stemmer> = OnceLock::new();

fn stemmer() -> &'static Stemmer {
    STEMMER.get_or_init(|| Stemmer::create(Algorithm::English))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RougeVariant {
    RougeN { n: usize },
    RougeL,
    /// Summary-level LCS over newline- or sentence-split summaries.
    RougeLsum,
}

impl RougeVariant {
    /// Parse `rouge1`..`rouge9`, `rougeL` or `rougeLsum`.
    pub fn parse(rouge_type: &str) -> Result<Self> {
        match rouge_type {
            "rougeL" => Ok(RougeVariant::RougeL),
            "rougeLsum" => Ok(RougeVariant::RougeLsum),
            other => other
                .strip_prefix("rouge")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| (1..=9).contains(n))
                .map(|n| RougeVariant::RougeN { n })
                .ok_or_else(|| EvalError::Validation(format!("unsupported rouge_type `{}`", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RougeScore {
    pub precision: f64,
    pub recall: f64,
    pub fmeasure: f64,
}

impl RougeScore {
    fn from_counts(hits: usize, prediction_len: usize, reference_len: usize) -> Self {
        let precision = if prediction_len == 0 {
            0.0
        } else {
            hits as f64 / prediction_len as f64
        };
        let recall = if reference_len == 0 {
            0.0
        } else {
            hits as f64 / reference_len as f64
        };
        let fmeasure = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            fmeasure,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RougeCalculator {
    pub variant: RougeVariant,
    pub use_stemmer: bool,
    /// Split summaries into sentences for `rougeLsum` instead of on newlines.
    pub split_summaries: bool,
}

impl RougeCalculator {
    pub fn new(variant: RougeVariant) -> Self {
        Self {
            variant,
            use_stemmer: false,
            split_summaries: false,
        }
    }

    pub fn from_type(rouge_type: &str, use_stemmer: bool, split_summaries: bool) -> Result<Self> {
        Ok(Self {
            variant: RougeVariant::parse(rouge_type)?,
            use_stemmer,
            split_summaries,
        })
    }

    pub fn rouge_1() -> Self {
        Self::new(RougeVariant::RougeN { n: 1 })
    }

    pub fn rouge_2() -> Self {
        Self::new(RougeVariant::RougeN { n: 2 })
    }

    pub fn rouge_l() -> Self {
        Self::new(RougeVariant::RougeL)
    }

    /// Lowercase, keep alphanumeric runs, optionally stem tokens longer than three characters.
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|token| {
                if self.use_stemmer && token.chars().count() > 3 {
                    stemmer().stem(token).into_owned()
                } else {
                    token.to_string()
                }
            })
            .collect()
    }

    fn count_ngrams(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
        let mut counts = HashMap::new();
        if tokens.len() >= n {
            for window in tokens.windows(n) {
                *counts.entry(window).or_insert(0) += 1;
            }
        }
        counts
    }

    fn rouge_n(&self, prediction: &str, reference: &str, n: usize) -> RougeScore {
        let pred = self.tokenize(prediction);
        let refs = self.tokenize(reference);
        let pred_counts = Self::count_ngrams(&pred, n);
        let ref_counts = Self::count_ngrams(&refs, n);

        let overlap: usize = ref_counts
            .iter()
            .map(|(gram, ref_count)| (*ref_count).min(*pred_counts.get(gram).unwrap_or(&0)))
            .sum();

        RougeScore::from_counts(
            overlap,
            pred_counts.values().sum(),
            ref_counts.values().sum(),
        )
    }

    fn lcs_table(a: &[String], b: &[String]) -> Vec<Vec<usize>> {
        let mut dp = vec![vec![0; b.len() + 1]; a.len() + 1];
        for i in 1..=a.len() {
            for j in 1..=b.len() {
                dp[i][j] = if a[i - 1] == b[j - 1] {
                    dp[i - 1][j - 1] + 1
                } else {
                    dp[i - 1][j].max(dp[i][j - 1])
                };
            }
        }
        dp
    }

    fn rouge_l_score(&self, prediction: &str, reference: &str) -> RougeScore {
        let pred = self.tokenize(prediction);
        let refs = self.tokenize(reference);
        let lcs = Self::lcs_table(&refs, &pred)[refs.len()][pred.len()];
        RougeScore::from_counts(lcs, pred.len(), refs.len())
    }

    /// Indices into `reference` that belong to one LCS with `candidate`.
    fn lcs_indices(reference: &[String], candidate: &[String]) -> Vec<usize> {
        let dp = Self::lcs_table(reference, candidate);
        let (mut i, mut j) = (reference.len(), candidate.len());
        let mut indices = Vec::new();
        while i > 0 && j > 0 {
            if reference[i - 1] == candidate[j - 1] {
                indices.push(i - 1);
                i -= 1;
                j -= 1;
            } else if dp[i - 1][j] >= dp[i][j - 1] {
                i -= 1;
            } else {
                j -= 1;
            }
        }
        indices.reverse();
        indices
    }

    fn split_sentences(&self, text: &str) -> Vec<String> {
        if !self.split_summaries {
            return text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect();
        }
        let mut sentences = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            current.push(ch);
            let boundary = matches!(ch, '.' | '!' | '?')
                && chars.peek().map_or(true, |next| next.is_whitespace());
            if boundary || ch == '\n' {
                if !current.trim().is_empty() {
                    sentences.push(current.trim().to_string());
                }
                current.clear();
            }
        }
        if !current.trim().is_empty() {
            sentences.push(current.trim().to_string());
        }
        sentences
    }

    fn rouge_lsum_score(&self, prediction: &str, reference: &str) -> RougeScore {
        let pred_sents: Vec<Vec<String>> = self
            .split_sentences(prediction)
            .iter()
            .map(|s| self.tokenize(s))
            .collect();
        let ref_sents: Vec<Vec<String>> = self
            .split_sentences(reference)
            .iter()
            .map(|s| self.tokenize(s))
            .collect();

        let pred_len: usize = pred_sents.iter().map(Vec::len).sum();
        let ref_len: usize = ref_sents.iter().map(Vec::len).sum();
        if pred_len == 0 || ref_len == 0 {
            return RougeScore::from_counts(0, pred_len, ref_len);
        }

        let mut pred_counts: HashMap<&str, usize> = HashMap::new();
        for token in pred_sents.iter().flatten() {
            *pred_counts.entry(token.as_str()).or_insert(0) += 1;
        }
        let mut ref_counts: HashMap<&str, usize> = HashMap::new();
        for token in ref_sents.iter().flatten() {
            *ref_counts.entry(token.as_str()).or_insert(0) += 1;
        }

        let mut hits = 0;
        for reference_sentence in &ref_sents {
            let union: BTreeSet<usize> = pred_sents
                .iter()
                .flat_map(|candidate| Self::lcs_indices(reference_sentence, candidate))
                .collect();
            for index in union {
                let token = reference_sentence[index].as_str();
                let (Some(p), Some(r)) = (pred_counts.get_mut(token), ref_counts.get_mut(token))
                else {
                    continue;
                };
                if *p > 0 && *r > 0 {
                    hits += 1;
                    *p -= 1;
                    *r -= 1;
                }
            }
        }

        RougeScore::from_counts(hits, pred_len, ref_len)
    }

    pub fn score(&self, prediction: &str, reference: &str) -> RougeScore {
        match self.variant {
            RougeVariant::RougeN { n } => self.rouge_n(prediction, reference, n),
            RougeVariant::RougeL => self.rouge_l_score(prediction, reference),
            RougeVariant::RougeLsum => self.rouge_lsum_score(prediction, reference),
        }
    }
}

impl Default for RougeCalculator {
    fn default() -> Self {
        Self::rouge_l()
    }
}

#[async_trait]
impl MetricCalculator for RougeCalculator {
    type Input = MetricInput;
    type Output = MetricOutput;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        let reference = input
            .reference
            .ok_or_else(|| EvalError::Validation("rouge requires a reference".to_string()))?;
        let score = self.score(&input.prediction, &reference);

        Ok(MetricOutput {
            score: score.fmeasure,
            metadata: json!({
                "metric": "rouge",
                "variant": self.variant,
                "use_stemmer": self.use_stemmer,
                "precision": score.precision,
                "recall": score.recall,
                "fmeasure": score.fmeasure,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rouge_types() {
        assert_eq!(RougeVariant::parse("rouge1").unwrap(), RougeVariant::RougeN { n: 1 });
        assert_eq!(RougeVariant::parse("rouge9").unwrap(), RougeVariant::RougeN { n: 9 });
        assert_eq!(RougeVariant::parse("rougeLsum").unwrap(), RougeVariant::RougeLsum);
        assert!(RougeVariant::parse("rouge0").is_err());
        assert!(RougeVariant::parse("bleu").is_err());
    }

    #[test]
    fn test_stemming_merges_inflections() {
        let plain = RougeCalculator::rouge_1();
        let stemmed = RougeCalculator {
            use_stemmer: true,
            ..RougeCalculator::rouge_1()
        };
        assert!(plain.score("running dogs", "runs dog").fmeasure < 1.0);
        assert_eq!(stemmed.score("running dogs", "run dog").fmeasure, 1.0);
    }

    #[test]
    fn test_rouge_l_scores_longest_common_subsequence() {
        let calculator = RougeCalculator::rouge_l();
        let score = calculator.score("the cat sat down", "the cat down");
        assert_eq!(score.recall, 1.0);
        assert_eq!(score.precision, 0.75);
        assert!((score.fmeasure - 6.0 / 7.0).abs() < 1e-12);
        assert_eq!(RougeCalculator::default().variant, RougeVariant::RougeL);
    }
}
