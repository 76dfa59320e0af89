//! Intent classification
//!
//! Decides whether an intent asks for data and, if so, whether it wants a
//! list or one value. The feedback loop only consults the trait, so the
//! keyword heuristic can be swapped for something smarter.

use serde::{Deserialize, Serialize};

use crate::selector::Cardinality;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentClass {
    /// The intent asks for data to be pulled out of the page
    pub extraction: bool,
    pub cardinality: Cardinality,
}

pub trait IntentClassifier: Send + Sync {
    fn classify(&self, intent: &str) -> IntentClass;
}

const EXTRACTION_VERBS: &[&str] = &[
    "extract", "scrape", "grab", "get", "collect", "fetch", "list", "read", "find",
];

const BULK_WORDS: &[&str] = &["all", "every", "each", "list", "many", "top"];

/// Plural-looking words that are not plurals
const NOT_PLURAL: &[&str] = &["this", "is", "was", "has", "its", "news", "address", "class", "status"];

/// Keyword heuristic
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

fn words(intent: &str) -> Vec<String> {
    intent
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn looks_plural(word: &str) -> bool {
    word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") && !NOT_PLURAL.contains(&word)
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, intent: &str) -> IntentClass {
        let words = words(intent);
        let verb_at = words
            .iter()
            .position(|w| EXTRACTION_VERBS.contains(&w.as_str()));

        let extraction = verb_at.is_some();

        // Only the object of the verb decides cardinality
        let object = &words[verb_at.map(|i| i + 1).unwrap_or(0)..];
        let bulk = object
            .iter()
            .any(|w| BULK_WORDS.contains(&w.as_str()) || looks_plural(w));

        IntentClass {
            extraction,
            cardinality: if bulk {
                Cardinality::Bulk
            } else {
                Cardinality::Single
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(intent: &str) -> IntentClass {
        KeywordClassifier.classify(intent)
    }

    #[test]
    fn test_extract_all_titles_is_bulk_extraction() {
        let class = classify("extract all titles");
        assert!(class.extraction);
        assert_eq!(class.cardinality, Cardinality::Bulk);
    }

    #[test]
    fn test_plural_object_is_bulk() {
        assert_eq!(classify("scrape product prices").cardinality, Cardinality::Bulk);
    }

    #[test]
    fn test_singular_extraction() {
        let class = classify("get the page title");
        assert!(class.extraction);
        assert_eq!(class.cardinality, Cardinality::Single);
    }

    #[test]
    fn test_navigation_intent_is_not_extraction() {
        let class = classify("Log in and open the settings tab");
        assert!(!class.extraction);
    }

    #[test]
    fn test_non_plural_words() {
        assert_eq!(classify("get this address").cardinality, Cardinality::Single);
    }
}
