//! Selector module - alternative selectors after an empty extraction

pub mod ranker;

pub use ranker::{
    candidate_selectors, score_candidates, Cardinality, RankRequest, SelectorCandidate,
    SelectorRanker, Specificity,
};
