//! Pipeline configuration from environment variables
//!
//! Stands in for the parameter store: bucket names, table namespaces and
//! word-list locations are resolved once per process.

use std::env;
use std::path::PathBuf;

/// Profanity count above which a reviewer is banned
pub const BAN_THRESHOLD: i64 = 3;

/// Snapshot key for the aggregate totals, written to the output bucket
pub const TOTALS_KEY: &str = "total_counts.json";

/// Snapshot key for the banned reviewer list, written to the output bucket
pub const BANNED_USERS_KEY: &str = "banned-users.json";

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the pipeline runtime
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory of the filesystem object store
    pub data_dir: PathBuf,

    /// SQLite file backing the counter store
    pub db_path: PathBuf,

    /// Watched by the transform stage
    pub raw_bucket: String,

    /// Transform output, watched by the moderation stage
    pub cleaned_bucket: String,

    /// Moderation output, watched by the sentiment stage
    pub presentiment_bucket: String,

    /// Final records and snapshot objects
    pub output_bucket: String,

    pub ban_table: String,
    pub sentiment_table: String,

    /// Extra disallowed-word lists, unioned with the bundled one
    pub bad_words_files: Vec<PathBuf>,

    /// Replaces the bundled stopword list when set
    pub stopwords_file: Option<PathBuf>,

    /// VADER-format valence file scored in place of the built-in VADER model
    pub sentiment_lexicon_file: Option<PathBuf>,

    /// Publish `banned-users.json` after each moderation invocation
    pub publish_banned_users: bool,

    /// Trigger channel capacity for the chained runtime
    pub channel_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/buckets"),
            db_path: PathBuf::from("./data/reviewflow.db"),
            raw_bucket: "reviews-bucket".to_string(),
            cleaned_bucket: "reviews-bucket-cleaned".to_string(),
            presentiment_bucket: "reviews-bucket-presentiment".to_string(),
            output_bucket: "reviews-bucket-output".to_string(),
            ban_table: "ban_table".to_string(),
            sentiment_table: "sentiment_table".to_string(),
            bad_words_files: Vec::new(),
            stopwords_file: None,
            sentiment_lexicon_file: None,
            publish_banned_users: true,
            channel_buffer: 1_000,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `REVIEWFLOW_DATA_DIR` (default: ./data/buckets)
    /// - `REVIEWFLOW_DB_PATH` (default: ./data/reviewflow.db)
    /// - `RAW_BUCKET`, `CLEANED_BUCKET`, `PRESENTIMENT_BUCKET`, `OUTPUT_BUCKET`
    /// - `BAN_TABLE` (default: ban_table), `SENTIMENT_TABLE` (default: sentiment_table)
    /// - `BAD_WORDS_FILES` (comma-separated), `STOPWORDS_FILE`, `SENTIMENT_LEXICON_FILE`
    /// - `PUBLISH_BANNED_USERS` (default: true)
    /// - `RUNTIME_CHANNEL_BUFFER` (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            data_dir: env::var("REVIEWFLOW_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            db_path: env::var("REVIEWFLOW_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            raw_bucket: env::var("RAW_BUCKET").unwrap_or(defaults.raw_bucket),
            cleaned_bucket: env::var("CLEANED_BUCKET").unwrap_or(defaults.cleaned_bucket),
            presentiment_bucket: env::var("PRESENTIMENT_BUCKET")
                .unwrap_or(defaults.presentiment_bucket),
            output_bucket: env::var("OUTPUT_BUCKET").unwrap_or(defaults.output_bucket),
            ban_table: env::var("BAN_TABLE").unwrap_or(defaults.ban_table),
            sentiment_table: env::var("SENTIMENT_TABLE").unwrap_or(defaults.sentiment_table),
            bad_words_files: env::var("BAD_WORDS_FILES")
                .map(|s| {
                    s.split(',')
                        .map(|p| p.trim())
                        .filter(|p| !p.is_empty())
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or_default(),
            stopwords_file: env::var("STOPWORDS_FILE").ok().map(PathBuf::from),
            sentiment_lexicon_file: env::var("SENTIMENT_LEXICON_FILE").ok().map(PathBuf::from),
            publish_banned_users: parse_or_default(
                "PUBLISH_BANNED_USERS",
                defaults.publish_banned_users,
            ),
            channel_buffer: parse_or_default("RUNTIME_CHANNEL_BUFFER", defaults.channel_buffer),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let buckets = [
            ("RAW_BUCKET", &self.raw_bucket),
            ("CLEANED_BUCKET", &self.cleaned_bucket),
            ("PRESENTIMENT_BUCKET", &self.presentiment_bucket),
            ("OUTPUT_BUCKET", &self.output_bucket),
        ];

        for (name, bucket) in &buckets {
            if bucket.trim().is_empty() {
                return Err(ConfigError::MissingVariable(name.to_string()));
            }
        }

        for (i, (name_a, a)) in buckets.iter().enumerate() {
            for (name_b, b) in &buckets[i + 1..] {
                if a == b {
                    return Err(ConfigError::InvalidValue(format!(
                        "{} and {} must name different buckets (both '{}')",
                        name_a, name_b, a
                    )));
                }
            }
        }

        if self.ban_table == self.sentiment_table {
            return Err(ConfigError::InvalidValue(
                "BAN_TABLE and SENTIMENT_TABLE must differ".to_string(),
            ));
        }

        if self.channel_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "RUNTIME_CHANNEL_BUFFER must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_or_default<T: std::str::FromStr + std::fmt::Debug>(var: &str, default: T) -> T {
    match env::var(var) {
        Ok(raw) => match raw.trim().to_lowercase().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Invalid {} '{}', defaulting to {:?}", var, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}
