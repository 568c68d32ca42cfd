use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::corpus::strip_urls;

static WORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+").expect("word pattern compiles"));

/// Splits tweets into lowercase word unigrams and adjacent bigrams.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tokenizer {
    bigrams: bool,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self { bigrams: true }
    }
}

impl Tokenizer {
    /// Disables or enables bigram features.
    #[must_use]
    pub const fn with_bigrams(mut self, bigrams: bool) -> Self {
        self.bigrams = bigrams;
        self
    }

    /// Lowercased words, links removed.
    #[must_use]
    pub fn words(&self, text: &str) -> Vec<String> {
        let lowered = strip_urls(text).to_lowercase();
        WORD_PATTERN
            .find_iter(&lowered)
            .map(|word| word.as_str().to_owned())
            .collect()
    }

    /// Distinct features in first-seen order.
    #[must_use]
    pub fn features(&self, text: &str) -> IndexSet<String> {
        let words = self.words(text);
        let mut features: IndexSet<String> = words.iter().cloned().collect();
        if self.bigrams {
            for pair in words.windows(2) {
                features.insert(format!("{} {}", pair[0], pair[1]));
            }
        }
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_drops_links() {
        let words = Tokenizer::default().words("Muy BUENO http://t.co/x, ¡genial!");
        assert_eq!(words, vec!["muy", "bueno", "genial"]);
    }

    #[test]
    fn features_include_bigrams_once() {
        let features = Tokenizer::default().features("no no bueno");
        let collected: Vec<_> = features.iter().map(String::as_str).collect();
        assert_eq!(collected, vec!["no", "bueno", "no no", "no bueno"]);
        let unigrams = Tokenizer::default().with_bigrams(false).features("no no bueno");
        assert_eq!(unigrams.len(), 2);
    }
}
