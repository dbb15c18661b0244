use rust_stemmers::Algorithm;
use std::collections::HashMap;
use std::path::Path;

use crate::analysis::filter::TokenFilter;
use crate::analysis::filters::lowercase::LowercaseFilter;
use crate::analysis::filters::stemmer::StemmerFilter;
use crate::analysis::filters::stopword::StopWordFilter;
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{CleansingTokenizer, Tokenizer};
use crate::core::error::Result;

/// Text analysis pipeline
pub struct Analyzer {
    pub tokenizer: Box<dyn Tokenizer>,
    pub filters: Vec<Box<dyn TokenFilter>>,
    pub name: String,
}

impl Analyzer {
    pub fn new(name: String, tokenizer: Box<dyn Tokenizer>) -> Self {
        Analyzer {
            tokenizer,
            filters: Vec::new(),
            name,
        }
    }

    pub fn add_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Tokenize and run the filter chain. Positions are 0-based indices into
    /// the surviving sequence, renumbered after stop-word removal.
    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);

        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }

        for (position, token) in tokens.iter_mut().enumerate() {
            token.position = position as u32;
        }
        tokens
    }

    /// The pipeline used for both page sections and query strings: cleanse,
    /// lowercase, Porter2 stem, then drop stop words (checked post-stem, the
    /// way the stop list is built).
    pub fn web_search(stopwords_path: &Path) -> Result<Self> {
        Ok(Analyzer::new(
            "web_search".to_string(),
            Box::new(CleansingTokenizer::new()),
        )
        .add_filter(Box::new(LowercaseFilter))
        .add_filter(Box::new(StemmerFilter::new(Algorithm::English)))
        .add_filter(Box::new(StopWordFilter::from_file(stopwords_path)?)))
    }
}

/// Per-term frequency and position lists for one cleaned token sequence.
/// `freq[t] == positions[t].len()` by construction.
pub fn term_stats(tokens: &[Token]) -> (HashMap<String, u32>, HashMap<String, Vec<u32>>) {
    let mut freq: HashMap<String, u32> = HashMap::new();
    let mut positions: HashMap<String, Vec<u32>> = HashMap::new();
    for token in tokens {
        positions.entry(token.text.clone()).or_default().push(token.position);
        *freq.entry(token.text.clone()).or_default() += 1;
    }
    (freq, positions)
}
