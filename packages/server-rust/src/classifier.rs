//! Built-in classification engines and engine selection.
//!
//! The pipeline only sees [`Classifier`]; these engines are what the binary
//! can select with `--classifier`. `lexicon` is a word-list sentiment
//! scorer; `constant` returns a fixed label, for smoke tests and load runs.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use inferq_core::{Classification, Classifier, ClassifyError};
use tracing::info;

use crate::observability::WORKER_MODEL_LOAD_TIME;

pub const POSITIVE: &str = "POSITIVE";
pub const NEGATIVE: &str = "NEGATIVE";

/// Default number of tokens the lexicon engine looks at.
pub const DEFAULT_MAX_TOKENS: usize = 512;

const POSITIVE_WORDS: &[&str] = &[
    "amazing", "awesome", "beautiful", "best", "brilliant", "delightful", "enjoy", "enjoyed",
    "excellent", "fantastic", "fast", "fine", "good", "great", "happy", "helpful", "impressive",
    "love", "loved", "lovely", "nice", "perfect", "pleasant", "recommend", "reliable", "satisfied",
    "smooth", "solid", "superb", "wonderful", "works",
];

const NEGATIVE_WORDS: &[&str] = &[
    "angry", "annoying", "awful", "bad", "broken", "buggy", "disappointed", "disappointing",
    "fail", "failed", "fails", "hate", "hated", "horrible", "poor", "refund", "sad", "slow",
    "terrible", "ugly", "unhappy", "useless", "waste", "worse", "worst", "wrong",
];

const NEGATIONS: &[&str] = &["not", "no", "never", "hardly", "isn't", "wasn't", "don't", "doesn't", "didn't"];

/// Engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierKind {
    #[default]
    Lexicon,
    Constant,
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lexicon => "lexicon",
            Self::Constant => "constant",
        })
    }
}

impl FromStr for ClassifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lexicon" => Ok(Self::Lexicon),
            "constant" => Ok(Self::Constant),
            other => Err(format!("unknown classifier: {other}")),
        }
    }
}

/// Settings consumed by [`build_classifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierSettings {
    pub kind: ClassifierKind,
    /// Token budget for the lexicon engine; longer input is truncated.
    pub max_tokens: usize,
    pub constant_label: String,
    pub constant_score: f64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::Lexicon,
            max_tokens: DEFAULT_MAX_TOKENS,
            constant_label: POSITIVE.to_string(),
            constant_score: 1.0,
        }
    }
}

/// Builds the selected engine and records how long construction took.
#[must_use]
pub fn build_classifier(settings: &ClassifierSettings) -> Arc<dyn Classifier> {
    let start = Instant::now();
    let classifier: Arc<dyn Classifier> = match settings.kind {
        ClassifierKind::Lexicon => Arc::new(LexiconClassifier::new(settings.max_tokens)),
        ClassifierKind::Constant => Arc::new(ConstantClassifier::new(
            settings.constant_label.clone(),
            settings.constant_score,
        )),
    };
    let elapsed = start.elapsed();
    metrics::gauge!(WORKER_MODEL_LOAD_TIME).set(elapsed.as_secs_f64());
    info!(
        engine = classifier.engine_id(),
        load_time_secs = elapsed.as_secs_f64(),
        "classifier loaded"
    );
    classifier
}

/// Word-list sentiment scorer.
///
/// Counts positive and negative words among the first `max_tokens` tokens,
/// flipping the polarity of a word that directly follows a negation. Ties
/// resolve to `POSITIVE` with score 0.5. Input without any alphabetic token
/// cannot be classified.
#[derive(Debug)]
pub struct LexiconClassifier {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
    negations: HashSet<&'static str>,
    max_tokens: usize,
}

impl LexiconClassifier {
    #[must_use]
    pub fn new(max_tokens: usize) -> Self {
        Self {
            positive: POSITIVE_WORDS.iter().copied().collect(),
            negative: NEGATIVE_WORDS.iter().copied().collect(),
            negations: NEGATIONS.iter().copied().collect(),
            max_tokens: max_tokens.max(1),
        }
    }
}

impl Classifier for LexiconClassifier {
    fn engine_id(&self) -> &str {
        "lexicon-sentiment-v1"
    }

    fn classify(&self, text: &str) -> Result<Classification, ClassifyError> {
        let start = Instant::now();
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !(c.is_alphabetic() || c == '\''))
            .filter(|t| t.chars().any(char::is_alphabetic))
            .take(self.max_tokens)
            .collect();
        if tokens.is_empty() {
            return Err(ClassifyError::new("input contains no words"));
        }

        let mut positive = 0u32;
        let mut negative = 0u32;
        let mut negated = false;
        for token in tokens {
            if self.negations.contains(token) {
                negated = true;
                continue;
            }
            let polarity = if self.positive.contains(token) {
                Some(true)
            } else if self.negative.contains(token) {
                Some(false)
            } else {
                None
            };
            if let Some(is_positive) = polarity {
                if is_positive != negated {
                    positive += 1;
                } else {
                    negative += 1;
                }
            }
            negated = false;
        }

        let total = f64::from(positive + negative);
        let (label, margin) = if negative > positive {
            (NEGATIVE, f64::from(negative - positive))
        } else {
            (POSITIVE, f64::from(positive - negative))
        };
        // 0.5 with no evidence, approaching 1.0 as the margin dominates.
        let score = 0.5 + 0.5 * margin / (total + 1.0);

        Ok(Classification {
            label: label.to_string(),
            score: (score * 1e6).round() / 1e6,
            duration: start.elapsed(),
        })
    }
}

/// Returns the same label and score for every input.
#[derive(Debug, Clone)]
pub struct ConstantClassifier {
    label: String,
    score: f64,
}

impl ConstantClassifier {
    #[must_use]
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score: score.clamp(0.0, 1.0),
        }
    }
}

impl Classifier for ConstantClassifier {
    fn engine_id(&self) -> &str {
        "constant-v1"
    }

    fn classify(&self, _text: &str) -> Result<Classification, ClassifyError> {
        Ok(Classification {
            label: self.label.clone(),
            score: self.score,
            duration: std::time::Duration::ZERO,
        })
    }
}
