//! Wire types exchanged between stages and published as snapshots.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Rating assumed when a record carries no `overall` field.
pub const DEFAULT_RATING: f64 = 3.0;

/// Reviewer id assigned to records that arrive without one.
pub const UNKNOWN_REVIEWER: &str = "unknown";

fn unknown_reviewer() -> String {
    UNKNOWN_REVIEWER.to_string()
}

/// A text field in either of its pipeline representations.
///
/// Raw input carries plain strings; the transform stage replaces them with
/// ordered token lists which every later stage consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextField {
    Tokens(Vec<String>),
    Raw(String),
}

impl Default for TextField {
    fn default() -> Self {
        TextField::Tokens(Vec::new())
    }
}

impl TextField {
    /// Lowercase words used for lexicon membership tests.
    ///
    /// Token lists are already normalized and are returned as-is; a raw string
    /// is split on whitespace and lowercased.
    pub fn words(&self) -> Vec<String> {
        match self {
            TextField::Tokens(tokens) => tokens.clone(),
            TextField::Raw(text) => text
                .split_whitespace()
                .map(|w| w.to_lowercase())
                .collect(),
        }
    }

    /// Plain text form: tokens joined by a single space.
    pub fn to_text(&self) -> String {
        match self {
            TextField::Tokens(tokens) => tokens.join(" "),
            TextField::Raw(text) => text.clone(),
        }
    }
}

/// Sentiment label assigned by the aggregation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

/// Label string that is not one of the three sentiment labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSentiment(pub String);

impl std::fmt::Display for UnknownSentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown sentiment label: {}", self.0)
    }
}

impl std::error::Error for UnknownSentiment {}

impl std::str::FromStr for Sentiment {
    type Err = UnknownSentiment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            other => Err(UnknownSentiment(other.to_string())),
        }
    }
}

/// One user review as it travels through the pipeline.
///
/// Fields the pipeline does not interpret (`asin`, `reviewerName`, `helpful`,
/// ...) are kept in `extra` and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    #[serde(rename = "reviewerID", default = "unknown_reviewer")]
    pub reviewer_id: String,

    #[serde(rename = "reviewText", default, skip_serializing_if = "Option::is_none")]
    pub review_text: Option<TextField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<TextField>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall: Option<f64>,

    /// Set by the moderation stage
    #[serde(
        rename = "hasProfanity",
        alias = "has_profanity",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub has_profanity: Option<bool>,

    /// Set by the sentiment stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReviewRecord {
    pub fn new(reviewer_id: impl Into<String>) -> Self {
        Self {
            reviewer_id: reviewer_id.into(),
            review_text: None,
            summary: None,
            overall: None,
            has_profanity: None,
            sentiment: None,
            extra: Map::new(),
        }
    }

    /// Rating used for sentiment adjustment (defaults to 3.0).
    pub fn rating(&self) -> f64 {
        self.overall.unwrap_or(DEFAULT_RATING)
    }

    /// Reconstructs the scoring text: summary first, then body, separated by ". ".
    pub fn scoring_text(&self) -> String {
        let summary = self.summary.as_ref().map(TextField::to_text).unwrap_or_default();
        let body = self.review_text.as_ref().map(TextField::to_text).unwrap_or_default();
        format!("{}. {}", summary, body).trim().to_string()
    }
}

/// Row of the ban table as published in `banned-users.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    #[serde(rename = "reviewerID")]
    pub reviewer_id: String,
    pub profane_count: i64,
    pub banned: bool,
}

/// Cumulative count per sentiment label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentCounts {
    #[serde(default)]
    pub positive: i64,
    #[serde(default)]
    pub neutral: i64,
    #[serde(default)]
    pub negative: i64,
}

impl SentimentCounts {
    pub fn get(&self, label: Sentiment) -> i64 {
        match label {
            Sentiment::Positive => self.positive,
            Sentiment::Neutral => self.neutral,
            Sentiment::Negative => self.negative,
        }
    }

    pub fn add(&mut self, label: Sentiment, delta: i64) {
        match label {
            Sentiment::Positive => self.positive += delta,
            Sentiment::Neutral => self.neutral += delta,
            Sentiment::Negative => self.negative += delta,
        }
    }

    pub fn total(&self) -> i64 {
        self.positive + self.neutral + self.negative
    }
}

/// Snapshot published to `total_counts.json`. Always recomputed, never a source of truth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateTotals {
    pub total_profane_reviews: i64,
    pub total_banned_users: i64,
    pub sentiment_counts: SentimentCounts,
    pub total_reviews_processed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokenized_record() {
        let line = r#"{"reviewerID":"A1","reviewText":["great","value"],"summary":["nice"],"overall":5,"asin":"B00X"}"#;
        let record: ReviewRecord = serde_json::from_str(line).unwrap();

        assert_eq!(record.reviewer_id, "A1");
        assert_eq!(
            record.review_text,
            Some(TextField::Tokens(vec!["great".to_string(), "value".to_string()]))
        );
        assert_eq!(record.rating(), 5.0);
        assert_eq!(record.extra.get("asin"), Some(&Value::from("B00X")));
    }

    #[test]
    fn test_defaults_when_fields_missing() {
        let record: ReviewRecord = serde_json::from_str("{}").unwrap();

        assert_eq!(record.reviewer_id, UNKNOWN_REVIEWER);
        assert_eq!(record.rating(), DEFAULT_RATING);
        assert!(record.has_profanity.is_none());
        assert!(record.sentiment.is_none());
    }

    #[test]
    fn test_legacy_profanity_alias() {
        let record: ReviewRecord =
            serde_json::from_str(r#"{"reviewerID":"A1","has_profanity":true}"#).unwrap();
        assert_eq!(record.has_profanity, Some(true));

        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["hasProfanity"], Value::Bool(true));
        assert!(out.get("has_profanity").is_none());
    }

    #[test]
    fn test_unset_annotations_not_serialized() {
        let record = ReviewRecord::new("A1");
        let out = serde_json::to_value(&record).unwrap();

        assert!(out.get("hasProfanity").is_none());
        assert!(out.get("sentiment").is_none());
        assert!(out.get("overall").is_none());
    }

    #[test]
    fn test_scoring_text_summary_first() {
        let mut record = ReviewRecord::new("A1");
        record.summary = Some(TextField::Tokens(vec!["loved".into(), "it".into()]));
        record.review_text = Some(TextField::Tokens(vec!["the".into(), "product".into()]));

        assert_eq!(record.scoring_text(), "loved it. the product");
    }

    #[test]
    fn test_scoring_text_empty_record() {
        let record = ReviewRecord::new("A1");
        assert_eq!(record.scoring_text(), ".");
    }

    #[test]
    fn test_raw_field_words() {
        let field = TextField::Raw("Total CRAP here".to_string());
        assert_eq!(field.words(), vec!["total", "crap", "here"]);
    }

    #[test]
    fn test_sentiment_label_parse() {
        for label in Sentiment::ALL {
            assert_eq!(label.as_str().parse::<Sentiment>(), Ok(label));
        }
        assert_eq!("Positive".parse::<Sentiment>(), Err(UnknownSentiment("Positive".into())));
        assert!("mixed".parse::<Sentiment>().is_err());
    }

    #[test]
    fn test_totals_wire_shape() {
        let totals = AggregateTotals {
            total_profane_reviews: 10,
            total_banned_users: 2,
            sentiment_counts: SentimentCounts { positive: 4, neutral: 1, negative: 0 },
            total_reviews_processed: 5,
        };
        let json = serde_json::to_value(&totals).unwrap();

        assert_eq!(json["total_profane_reviews"], 10);
        assert_eq!(json["total_banned_users"], 2);
        assert_eq!(json["sentiment_counts"]["positive"], 4);
        assert_eq!(json["sentiment_counts"]["negative"], 0);
        assert_eq!(json["total_reviews_processed"], 5);
    }

    #[test]
    fn test_ban_record_wire_shape() {
        let record = BanRecord { reviewer_id: "U1".into(), profane_count: 4, banned: true };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"reviewerID":"U1","profane_count":4,"banned":true}"#);
    }
}
