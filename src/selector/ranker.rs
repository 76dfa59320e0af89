//! Selector candidate ranking
//!
//! Candidates come from seed selectors (usually the ones a failed round
//! used) and from the digest's element patterns. Each one is counted on the
//! live page and scored:
//!
//! - bulk intents favour many matches with homogeneous text lengths
//! - singular intents favour a unique match
//!
//! Both add keyword relevance against the selector and matched texts.
//! Specificity only breaks ties, and candidates matching nothing sink to the
//! bottom without being dropped.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::{BrowserCapability, SelectorMatches};
use crate::core::config::RankerConfig;
use crate::digest::DomDigest;

const BULK_COUNT_WEIGHT: f64 = 0.45;
const BULK_CONSISTENCY_WEIGHT: f64 = 0.35;
const BULK_RELEVANCE_WEIGHT: f64 = 0.2;
const SINGLE_UNIQUENESS_WEIGHT: f64 = 0.6;
const SINGLE_RELEVANCE_WEIGHT: f64 = 0.4;

const STOPWORDS: &[&str] = &[
    "all", "and", "any", "each", "every", "extract", "fetch", "find", "for", "from", "get",
    "grab", "into", "list", "of", "on", "page", "scrape", "the", "this", "collect", "with",
];

/// How many elements the intent is after
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// A list of homogeneous items
    Bulk,
    /// One specific element
    Single,
}

/// Ordered tie-break weight of a selector's most specific component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Specificity {
    Tag,
    Class,
    Attribute,
    Id,
}

impl Specificity {
    /// Classified on the selector's own components: attribute bodies, quoted
    /// strings and pseudo-class arguments like `:not(.x)` are skipped.
    pub fn of(selector: &str) -> Self {
        let mut id = false;
        let mut attribute = false;
        let mut class = false;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;

        for c in selector.chars() {
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '"' | '\'' => quote = Some(c),
                '[' => {
                    if depth == 0 {
                        attribute = true;
                    }
                    depth += 1;
                }
                '(' => depth += 1,
                ']' | ')' => depth = depth.saturating_sub(1),
                '#' if depth == 0 => id = true,
                '.' if depth == 0 => class = true,
                _ => {}
            }
        }

        if id {
            Self::Id
        } else if attribute {
            Self::Attribute
        } else if class {
            Self::Class
        } else {
            Self::Tag
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorCandidate {
    pub selector: String,
    pub element_count: usize,
    pub confidence_score: f64,
    pub specificity: Specificity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankRequest {
    /// What the user is looking for, in their words
    pub description: String,
    pub cardinality: Cardinality,
    /// Selectors to try before the digest patterns
    pub seeds: Vec<String>,
}

impl RankRequest {
    pub fn new(description: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            description: description.into(),
            cardinality,
            seeds: Vec::new(),
        }
    }

    pub fn with_seeds(mut self, seeds: impl IntoIterator<Item = String>) -> Self {
        self.seeds.extend(seeds);
        self
    }
}

pub struct SelectorRanker {
    page: Arc<dyn BrowserCapability>,
    config: RankerConfig,
}

impl SelectorRanker {
    pub fn new(page: Arc<dyn BrowserCapability>, config: RankerConfig) -> Self {
        Self { page, config }
    }

    /// Count and rank candidates for `request`
    pub async fn rank(&self, request: &RankRequest, digest: Option<&DomDigest>) -> Vec<SelectorCandidate> {
        let candidates = candidate_selectors(request, digest, self.config.max_candidates);
        let mut measured = Vec::with_capacity(candidates.len());

        for selector in candidates {
            let found = match self.page.count_matches(&selector, self.config.sample_limit).await {
                Ok(found) => found,
                Err(e) => {
                    debug!(%selector, error = %e, "match count failed, treating as no match");
                    SelectorMatches::default()
                }
            };
            measured.push((selector, found));
        }

        let ranked = score_candidates(request, measured);
        debug!(
            candidates = ranked.len(),
            best = ranked.first().map(|c| c.selector.as_str()).unwrap_or("-"),
            "selectors ranked"
        );
        ranked
    }
}

/// Seeds then digest patterns, deduplicated, at most `max`
pub fn candidate_selectors(
    request: &RankRequest,
    digest: Option<&DomDigest>,
    max: usize,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let patterns = digest.into_iter().flat_map(|d| d.pattern_selectors());

    request
        .seeds
        .iter()
        .map(|s| s.trim())
        .chain(patterns)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .take(max)
        .map(str::to_string)
        .collect()
}

fn keywords(description: &str) -> Vec<String> {
    description
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .map(|w| match w.strip_suffix('s') {
            Some(stem) if stem.len() >= 3 => stem.to_string(),
            _ => w,
        })
        .collect()
}

/// Fraction of description keywords found in the selector or matched texts
fn relevance(keywords: &[String], selector: &str, texts: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let haystack = format!("{} {}", selector, texts.join(" ")).to_lowercase();
    let hits = keywords.iter().filter(|k| haystack.contains(k.as_str())).count();
    hits as f64 / keywords.len() as f64
}

/// 1 for identical text lengths, falling towards 0 as they spread out
fn consistency(texts: &[String]) -> f64 {
    if texts.is_empty() {
        return 0.0;
    }
    let lengths: Vec<f64> = texts.iter().map(|t| t.chars().count() as f64).collect();
    let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
    let cv = variance.sqrt() / mean;
    1.0 / (1.0 + cv)
}

/// Score counted candidates and order them best first
pub fn score_candidates(
    request: &RankRequest,
    measured: Vec<(String, SelectorMatches)>,
) -> Vec<SelectorCandidate> {
    let keywords = keywords(&request.description);
    let max_count = measured.iter().map(|(_, m)| m.count).max().unwrap_or(0);

    let mut candidates: Vec<SelectorCandidate> = measured
        .into_iter()
        .map(|(selector, found)| {
            let confidence_score = if found.count == 0 {
                0.0
            } else {
                let rel = relevance(&keywords, &selector, &found.texts);
                match request.cardinality {
                    Cardinality::Bulk => {
                        let volume = (1.0 + found.count as f64).ln() / (1.0 + max_count as f64).ln();
                        BULK_COUNT_WEIGHT * volume
                            + BULK_CONSISTENCY_WEIGHT * consistency(&found.texts)
                            + BULK_RELEVANCE_WEIGHT * rel
                    }
                    Cardinality::Single => {
                        SINGLE_UNIQUENESS_WEIGHT / found.count as f64 + SINGLE_RELEVANCE_WEIGHT * rel
                    }
                }
            };
            SelectorCandidate {
                specificity: Specificity::of(&selector),
                selector,
                element_count: found.count,
                confidence_score,
            }
        })
        .collect();

    candidates.sort_by(compare_candidates);
    candidates
}

fn compare_candidates(a: &SelectorCandidate, b: &SelectorCandidate) -> Ordering {
    (a.element_count == 0)
        .cmp(&(b.element_count == 0))
        .then_with(|| b.confidence_score.total_cmp(&a.confidence_score))
        .then_with(|| b.specificity.cmp(&a.specificity))
        .then_with(|| a.selector.cmp(&b.selector))
}
