//! Digest module - bounded structural summaries of the live page

pub mod collector;
pub mod signature;

pub use collector::{cache_key, DigestCollector};
pub use signature::{build_digest, DomDigest, ElementPattern};
