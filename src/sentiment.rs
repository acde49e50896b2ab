//! Sentiment scoring and classification
//!
//! [`SentimentOracle`] is the seam to the polarity model. The default is
//! [`VaderOracle`], the VADER model with its full lexicon and booster,
//! contrast and capitalization rules. [`ValenceScorer`] scores against a
//! user-supplied VADER-format lexicon file instead (summed valences,
//! negation flip, normalization into [-1, 1]).

use crate::record::Sentiment;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use vader_sentiment::SentimentIntensityAnalyzer;

/// Scores at or above this are positive
pub const POSITIVE_THRESHOLD: f64 = 0.05;
/// Scores at or below this are negative
pub const NEGATIVE_THRESHOLD: f64 = -0.05;
/// Rating that contributes no adjustment
pub const NEUTRAL_RATING: f64 = 3.0;

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "nor", "nothing", "without", "dont", "don't", "doesnt", "doesn't",
    "isnt", "isn't", "wasnt", "wasn't", "cant", "can't", "wont", "won't", "didnt", "didn't",
];
const NEGATION_SCALAR: f64 = -0.74;
const NEGATION_WINDOW: usize = 3;
const NORMALIZATION_ALPHA: f64 = 15.0;

/// Opaque polarity model: text in, compound score in [-1, 1] out.
pub trait SentimentOracle: Send + Sync {
    fn compound(&self, text: &str) -> f64;
}

/// Text with no letters or digits carries no polarity.
fn has_words(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

/// VADER compound score
pub struct VaderOracle {
    analyzer: SentimentIntensityAnalyzer<'static>,
}

impl VaderOracle {
    pub fn new() -> Self {
        Self {
            analyzer: SentimentIntensityAnalyzer::new(),
        }
    }
}

impl Default for VaderOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentOracle for VaderOracle {
    fn compound(&self, text: &str) -> f64 {
        if !has_words(text) {
            return 0.0;
        }
        self.analyzer
            .polarity_scores(text)
            .get("compound")
            .copied()
            .unwrap_or(0.0)
    }
}

/// Lexicon-based compound scorer over a custom valence table
#[derive(Debug, Clone)]
pub struct ValenceScorer {
    valences: HashMap<String, f64>,
}

impl ValenceScorer {
    /// Parse `token<TAB>mean[<TAB>...]` lines; blank and `#` lines are skipped.
    pub fn from_table(table: &str) -> Self {
        let mut valences = HashMap::new();
        for line in table.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut cols = line.split('\t');
            let token = cols.next().map(str::trim);
            let mean = cols.next().and_then(|v| v.trim().parse::<f64>().ok());

            match (token, mean) {
                (Some(token), Some(mean)) if !token.is_empty() => {
                    valences.insert(token.to_lowercase(), mean);
                }
                _ => log::debug!("Ignoring valence line: {}", line),
            }
        }
        Self { valences }
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let scorer = Self::from_table(&fs::read_to_string(path)?);
        log::info!("📖 Loaded {} valence entries from {}", scorer.valences.len(), path.display());
        Ok(scorer)
    }

    pub fn valence(&self, word: &str) -> Option<f64> {
        self.valences.get(word).copied()
    }
}

impl SentimentOracle for ValenceScorer {
    fn compound(&self, text: &str) -> f64 {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect();

        let mut sum = 0.0;
        for (i, word) in words.iter().enumerate() {
            let Some(mut valence) = self.valence(word) else {
                continue;
            };

            let window_start = i.saturating_sub(NEGATION_WINDOW);
            if words[window_start..i].iter().any(|w| NEGATIONS.contains(&w.as_str())) {
                valence *= NEGATION_SCALAR;
            }
            sum += valence;
        }

        if sum == 0.0 {
            return 0.0;
        }
        (sum / (sum * sum + NORMALIZATION_ALPHA).sqrt()).clamp(-1.0, 1.0)
    }
}

/// VADER by default; a [`ValenceScorer`] over `lexicon_file` when one is given.
pub fn load_oracle(lexicon_file: Option<&Path>) -> std::io::Result<Arc<dyn SentimentOracle>> {
    match lexicon_file {
        Some(path) => Ok(Arc::new(ValenceScorer::from_file(path)?)),
        None => Ok(Arc::new(VaderOracle::new())),
    }
}

/// Map an adjusted score to its label.
pub fn label_for_score(score: f64) -> Sentiment {
    if score >= POSITIVE_THRESHOLD {
        Sentiment::Positive
    } else if score <= NEGATIVE_THRESHOLD {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

/// Combines the oracle's compound score with the star rating
#[derive(Clone)]
pub struct SentimentClassifier {
    oracle: Arc<dyn SentimentOracle>,
}

impl SentimentClassifier {
    pub fn new(oracle: Arc<dyn SentimentOracle>) -> Self {
        Self { oracle }
    }

    /// Compound score shifted by `(rating - 3) / 2`. Not clamped.
    pub fn score(&self, text: &str, rating: f64) -> f64 {
        self.oracle.compound(text) + (rating - NEUTRAL_RATING) / 2.0
    }

    pub fn classify(&self, text: &str, rating: f64) -> Sentiment {
        label_for_score(self.score(text, rating))
    }
}
