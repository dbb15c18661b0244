use regex::Regex;

use crate::analysis::token::Token;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;

    fn name(&self) -> &str;
}

/// Tokenizer for web page text: every non-alphanumeric codepoint becomes a
/// space, then the text splits on whitespace runs.
pub struct CleansingTokenizer {
    strip: Regex,
}

impl CleansingTokenizer {
    pub fn new() -> Self {
        CleansingTokenizer {
            strip: Regex::new("[^a-zA-Z0-9]").expect("static pattern"),
        }
    }
}

impl Default for CleansingTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for CleansingTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let cleaned = self.strip.replace_all(text, " ");
        cleaned
            .split_whitespace()
            .enumerate()
            .map(|(position, word)| Token::new(word.to_string(), position as u32))
            .collect()
    }

    fn name(&self) -> &str {
        "cleansing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_punctuation_becomes_whitespace() {
        let tokenizer = CleansingTokenizer::new();
        let tokens = tokenizer.tokenize("Hello, world! It's 2019-era tech.");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello", "world", "It", "s", "2019", "era", "tech"]);
    }

    #[test]
    fn test_whitespace_runs_collapse() {
        let tokenizer = CleansingTokenizer::new();
        let tokens = tokenizer.tokenize("  foo \t\n bar  ");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 1);
    }

    #[test]
    fn test_empty_input() {
        let tokenizer = CleansingTokenizer::new();
        assert!(tokenizer.tokenize("...!?").is_empty());
        assert!(tokenizer.tokenize("").is_empty());
    }
}
