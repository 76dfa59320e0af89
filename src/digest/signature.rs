//! Structural signatures and digest assembly
//!
//! Elements are grouped by tag plus up to two stable class tokens. Classes
//! that look generated (CSS-in-JS prefixes, hash-like digit runs, very long
//! tokens) say nothing about page structure and are discarded.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::browser::ElementSample;
use crate::core::config::DigestConfig;

static CSS_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[A-Za-z_][A-Za-z0-9_-]*$").expect("ident pattern is valid"));

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{3,}").expect("digit pattern is valid"));

const GENERATED_PREFIXES: &[&str] = &["css-", "sc-", "jsx-", "emotion-", "svelte-"];
const MAX_CLASS_LEN: usize = 30;
const CLASSES_PER_SIGNATURE: usize = 2;

/// One structural group and how many sampled elements fell into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementPattern {
    pub selector: String,
    pub count: usize,
}

/// Bounded structural summary of a page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomDigest {
    pub page_url: String,
    pub page_title: String,
    /// Sorted by count descending, then selector
    pub element_patterns: Vec<ElementPattern>,
    pub sample_texts: Vec<String>,
}

impl DomDigest {
    /// Serialized form, as embedded in prompts and run logs
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn byte_size(&self) -> usize {
        self.to_json().len()
    }

    /// Shrink until the serialized form fits, dropping texts before patterns
    pub fn enforce_budget(&mut self, budget: usize) {
        while self.byte_size() > budget {
            if self.sample_texts.pop().is_some() {
                continue;
            }
            if self.element_patterns.pop().is_none() {
                break;
            }
        }
    }

    pub fn pattern_selectors(&self) -> impl Iterator<Item = &str> {
        self.element_patterns.iter().map(|p| p.selector.as_str())
    }
}

/// Whether a class token is stable enough to select on
pub fn is_stable_class(class: &str) -> bool {
    if class.is_empty() || class.len() > MAX_CLASS_LEN {
        return false;
    }
    if GENERATED_PREFIXES.iter().any(|p| class.starts_with(p)) {
        return false;
    }
    if DIGIT_RUN.is_match(class) {
        return false;
    }
    // CSS modules: `Button_root__x7Yz2`
    if class.contains("__") && class.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    CSS_IDENT.is_match(class)
}

/// Selector-shaped signature for an element, e.g. `li.item` or `div.card.product`
pub fn signature(sample: &ElementSample) -> String {
    let mut classes: Vec<&str> = sample
        .classes
        .iter()
        .map(String::as_str)
        .filter(|c| is_stable_class(c))
        .collect();
    classes.sort_unstable();
    classes.dedup();

    let mut sig = sample.tag.to_ascii_lowercase();
    for class in classes.into_iter().take(CLASSES_PER_SIGNATURE) {
        sig.push('.');
        sig.push_str(class);
    }
    sig
}

fn clean_text(raw: &str, max_len: usize) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() <= max_len {
        return Some(collapsed);
    }
    let cut: String = collapsed.chars().take(max_len).collect();
    Some(cut.trim_end().to_string())
}

/// Assemble a digest from sampled elements
pub fn build_digest(
    url: &str,
    title: &str,
    samples: &[ElementSample],
    config: &DigestConfig,
) -> DomDigest {
    let sampled = &samples[..samples.len().min(config.max_elements)];

    let mut groups: HashMap<String, usize> = HashMap::new();
    for sample in sampled {
        *groups.entry(signature(sample)).or_default() += 1;
    }

    let mut element_patterns: Vec<ElementPattern> = groups
        .into_iter()
        .map(|(selector, count)| ElementPattern { selector, count })
        .collect();
    element_patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.selector.cmp(&b.selector)));
    element_patterns.truncate(config.top_patterns);

    let mut seen = HashSet::new();
    let sample_texts: Vec<String> = sampled
        .iter()
        .filter(|s| s.leaf)
        .filter_map(|s| s.text.as_deref())
        .filter_map(|t| clean_text(t, config.max_text_len))
        .filter(|t| seen.insert(t.clone()))
        .take(config.max_texts)
        .collect();

    let mut digest = DomDigest {
        page_url: url.to_string(),
        page_title: title.to_string(),
        element_patterns,
        sample_texts,
    };
    digest.enforce_budget(config.byte_budget);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(tag: &str, classes: &[&str], text: Option<&str>) -> ElementSample {
        ElementSample {
            tag: tag.to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            id: None,
            text: text.map(str::to_string),
            leaf: text.is_some(),
        }
    }

    #[test]
    fn test_generated_classes_discarded() {
        assert!(is_stable_class("product-card"));
        assert!(is_stable_class("item"));
        assert!(!is_stable_class("css-1q2w3e"));
        assert!(!is_stable_class("sc-bdVaJa"));
        assert!(!is_stable_class("row-20240115"));
        assert!(!is_stable_class("Button_root__x7Yz2"));
        assert!(!is_stable_class("md:flex"));
        assert!(!is_stable_class(&"a".repeat(31)));
    }

    #[test]
    fn test_signature_sorts_and_caps_classes() {
        let sample = el("LI", &["zeta", "css-abc", "alpha", "mid"], None);
        assert_eq!(signature(&sample), "li.alpha.mid");
        assert_eq!(signature(&el("span", &[], None)), "span");
    }

    #[test]
    fn test_patterns_sorted_and_bounded() {
        let mut samples = Vec::new();
        for i in 0..500 {
            let class = format!("c{}", i % 40);
            samples.push(el("div", &[class.as_str()], None));
        }
        for _ in 0..30 {
            samples.push(el("li", &["item"], None));
        }
        let config = DigestConfig {
            max_elements: 1_000,
            top_patterns: 5,
            ..Default::default()
        };
        let digest = build_digest("https://x.test", "X", &samples, &config);

        assert_eq!(digest.element_patterns.len(), 5);
        assert_eq!(digest.element_patterns[0].selector, "li.item");
        assert!(digest
            .element_patterns
            .windows(2)
            .all(|w| w[0].count >= w[1].count));
    }

    #[test]
    fn test_ties_break_by_selector() {
        let samples = vec![el("b", &[], None), el("a", &[], None)];
        let digest = build_digest("u", "t", &samples, &DigestConfig::default());
        let selectors: Vec<&str> = digest.pattern_selectors().collect();
        assert_eq!(selectors, vec!["a", "b"]);
    }

    #[test]
    fn test_texts_trimmed_deduped_and_bounded() {
        let samples = vec![
            el("h2", &[], Some("  First   title ")),
            el("h2", &[], Some("First title")),
            el("h2", &[], Some("   ")),
            el("p", &[], Some("a very long paragraph indeed")),
            el("div", &[], None),
        ];
        let config = DigestConfig {
            max_text_len: 6,
            ..Default::default()
        };
        let digest = build_digest("u", "t", &samples, &config);
        assert_eq!(digest.sample_texts, vec!["First".to_string(), "a very".to_string()]);
    }

    #[test]
    fn test_budget_drops_texts_before_patterns() {
        let samples: Vec<ElementSample> = (0..20)
            .map(|i| {
                let class = format!("k{}", i);
                let text = format!("text sample number {}", i);
                let mut sample = el("span", &[class.as_str()], Some(&text));
                sample.leaf = true;
                sample
            })
            .collect();
        let full = build_digest("u", "t", &samples, &DigestConfig::default());
        let budget = full.byte_size() - 30;

        let config = DigestConfig {
            byte_budget: budget,
            ..Default::default()
        };
        let trimmed = build_digest("u", "t", &samples, &config);
        assert!(trimmed.byte_size() <= budget);
        assert_eq!(trimmed.element_patterns, full.element_patterns);
        assert!(trimmed.sample_texts.len() < full.sample_texts.len());
    }

    #[test]
    fn test_tiny_budget_empties_digest() {
        let samples = vec![el("li", &["item"], Some("hello"))];
        let config = DigestConfig {
            byte_budget: 10,
            ..Default::default()
        };
        let digest = build_digest("u", "t", &samples, &config);
        assert!(digest.element_patterns.is_empty());
        assert!(digest.sample_texts.is_empty());
    }
}
