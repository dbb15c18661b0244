use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;
use crate::core::error::Result;

/// Drops tokens found in a fixed stop-word set. The set is loaded once at
/// startup; a missing file is a fatal error, not an empty set.
pub struct StopWordFilter {
    pub stop_words: HashSet<String>,
}

impl StopWordFilter {
    pub fn new(stop_words: impl IntoIterator<Item = String>) -> Self {
        StopWordFilter {
            stop_words: stop_words.into_iter().collect(),
        }
    }

    /// Load a newline-separated word list.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| {
            crate::core::error::Error::new(
                crate::core::error::ErrorKind::Storage,
                format!("stopwords file {}: {}", path.display(), err),
            )
        })?;
        Ok(StopWordFilter::new(
            content
                .lines()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty()),
        ))
    }
}

impl TokenFilter for StopWordFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .filter(|token| !self.stop_words.contains(&token.text))
            .collect()
    }

    fn name(&self) -> &str {
        "stop_words"
    }
}
