//! Digest collection with a per-URL cache
//!
//! Walking the page is the expensive part, so a digest is reused for as long
//! as the page stays on the same URL. The fragment is not part of the key.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::browser::BrowserCapability;
use crate::core::config::DigestConfig;
use crate::core::Result;
use crate::digest::signature::{build_digest, DomDigest};

pub struct DigestCollector {
    page: Arc<dyn BrowserCapability>,
    config: DigestConfig,
    cache: DashMap<String, DomDigest>,
    walks: AtomicUsize,
}

/// Cache key for a page URL
pub fn cache_key(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.split('#').next().unwrap_or(url).to_string(),
    }
}

impl DigestCollector {
    pub fn new(page: Arc<dyn BrowserCapability>, config: DigestConfig) -> Self {
        Self {
            page,
            config,
            cache: DashMap::new(),
            walks: AtomicUsize::new(0),
        }
    }

    /// Digest of the current page, from cache unless `force_refresh`
    pub async fn collect(&self, force_refresh: bool) -> Result<DomDigest> {
        let url = self.page.current_url().await?;
        let key = cache_key(&url);

        if !force_refresh {
            if let Some(hit) = self.cache.get(&key) {
                debug!(url = %key, "digest cache hit");
                return Ok(hit.clone());
            }
        }

        let title = self.page.title().await?;
        let samples = self.page.sample_elements(self.config.max_elements).await?;
        self.walks.fetch_add(1, Ordering::Relaxed);

        let digest = build_digest(&url, &title, &samples, &self.config);
        debug!(
            url = %key,
            sampled = samples.len(),
            patterns = digest.element_patterns.len(),
            bytes = digest.byte_size(),
            "digest collected"
        );

        self.cache.insert(key, digest.clone());
        Ok(digest)
    }

    /// Cached digest for `url`, without touching the page
    pub fn cached(&self, url: &str) -> Option<DomDigest> {
        self.cache.get(&cache_key(url)).map(|entry| entry.clone())
    }

    pub fn invalidate(&self, url: &str) {
        self.cache.remove(&cache_key(url));
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Number of page walks performed so far
    pub fn walks(&self) -> usize {
        self.walks.load(Ordering::Relaxed)
    }
}
