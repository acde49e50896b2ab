//! Disallowed-token lexicon.
//!
//! Loaded once at process start and shared immutably between invocations.
//! The bundled list can be extended with extra word-list files (one word per
//! line); all sources are unioned.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

const BUNDLED_WORDS: &str = include_str!("../data/bad-words.txt");

#[derive(Debug, Clone)]
pub struct Lexicon {
    words: HashSet<String>,
}

impl Lexicon {
    /// Build a lexicon from arbitrary words (lowercased, trimmed, blanks ignored)
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    pub fn bundled() -> Self {
        Self::from_words(BUNDLED_WORDS.lines())
    }

    /// Bundled list unioned with every file in `extra_files`.
    pub fn load<P: AsRef<Path>>(extra_files: &[P]) -> std::io::Result<Self> {
        let mut lexicon = Self::bundled();

        for path in extra_files {
            let path = path.as_ref();
            let contents = fs::read_to_string(path)?;
            let before = lexicon.words.len();
            lexicon.extend(contents.lines());
            log::info!(
                "📖 Loaded word list {} (+{} words)",
                path.display(),
                lexicon.words.len() - before
            );
        }

        Ok(lexicon)
    }

    fn extend<'a>(&mut self, words: impl Iterator<Item = &'a str>) {
        self.words.extend(
            words
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty()),
        );
    }

    pub fn contains(&self, token: &str) -> bool {
        self.words.contains(token)
    }

    /// True if any token is disallowed.
    pub fn contains_any<S: AsRef<str>>(&self, tokens: &[S]) -> bool {
        self.first_match(tokens).is_some()
    }

    /// First disallowed token in stored order.
    pub fn first_match<'t, S: AsRef<str>>(&self, tokens: &'t [S]) -> Option<&'t str> {
        tokens
            .iter()
            .map(AsRef::as_ref)
            .find(|t| self.words.contains(*t))
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}
