//! Review text normalization used by the transform stage.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

const BUNDLED_STOPWORDS: &str = include_str!("../data/stopwords.txt");

/// Lowercases, strips ASCII punctuation, splits on whitespace and drops stopwords.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stopwords: HashSet<String>,
}

impl Tokenizer {
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let stopwords = stopwords
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { stopwords }
    }

    pub fn bundled() -> Self {
        Self::new(BUNDLED_STOPWORDS.lines())
    }

    /// Stopwords from `path` when given, otherwise the bundled list
    pub fn load(path: Option<&Path>) -> std::io::Result<Self> {
        match path {
            Some(path) => {
                let contents = fs::read_to_string(path)?;
                let tokenizer = Self::new(contents.lines());
                log::info!(
                    "📖 Loaded {} stopwords from {}",
                    tokenizer.stopwords.len(),
                    path.display()
                );
                Ok(tokenizer)
            }
            None => Ok(Self::bundled()),
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let cleaned: String = text
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_ascii_punctuation())
            .collect();

        cleaned
            .split_whitespace()
            .filter(|w| !self.stopwords.contains(*w))
            .map(str::to_string)
            .collect()
    }
}
