//! Digest cache integration tests

mod common;

use std::sync::Arc;

use common::{FakeBrowser, FakePage};
use pilot::browser::{BrowserCapability, NavigateOptions};
use pilot::core::config::DigestConfig;
use pilot::digest::DigestCollector;
use tokio_test::assert_ok;

fn browser() -> Arc<FakeBrowser> {
    Arc::new(
        FakeBrowser::new()
            .with_page(
                "https://shop.test/list",
                FakePage::new("Products")
                    .samples("li", "product", 40)
                    .samples("span", "price", 40)
                    .samples("a", "nav", 3),
            )
            .with_page(
                "https://shop.test/cart",
                FakePage::new("Cart").samples("tr", "line-item", 2),
            )
            .at("https://shop.test/list"),
    )
}

#[tokio::test]
async fn test_repeat_collect_is_served_from_cache() {
    let browser = browser();
    let collector = DigestCollector::new(browser.clone(), DigestConfig::default());

    let first = assert_ok!(collector.collect(false).await);
    let second = assert_ok!(collector.collect(false).await);

    assert_eq!(first, second);
    assert_eq!(first.to_json(), second.to_json());
    assert_eq!(browser.sample_calls(), 1);
    assert_eq!(collector.walks(), 1);
}

#[tokio::test]
async fn test_force_refresh_walks_again() {
    let browser = browser();
    let collector = DigestCollector::new(browser.clone(), DigestConfig::default());

    assert_ok!(collector.collect(false).await);
    assert_ok!(collector.collect(true).await);

    assert_eq!(browser.sample_calls(), 2);
}

#[tokio::test]
async fn test_fragment_changes_share_an_entry() {
    let browser = browser();
    let collector = DigestCollector::new(browser.clone(), DigestConfig::default());

    collector.collect(false).await.unwrap();
    browser
        .navigate("https://shop.test/list#reviews", &NavigateOptions::default())
        .await
        .unwrap();
    // the fake has no page under the fragment URL; a cache hit never asks
    let digest = collector.collect(false).await.unwrap();

    assert_eq!(browser.sample_calls(), 1);
    assert_eq!(digest.page_title, "Products");
}

#[tokio::test]
async fn test_navigation_gets_a_fresh_digest() {
    let browser = browser();
    let collector = DigestCollector::new(browser.clone(), DigestConfig::default());

    let list = collector.collect(false).await.unwrap();
    browser
        .navigate("https://shop.test/cart", &NavigateOptions::default())
        .await
        .unwrap();
    let cart = collector.collect(false).await.unwrap();

    assert_eq!(browser.sample_calls(), 2);
    assert_ne!(list, cart);
    assert_eq!(cart.page_title, "Cart");
    assert_eq!(cart.element_patterns[0].selector, "tr.line-item");
    assert!(collector.cached("https://shop.test/list").is_some());
}

#[tokio::test]
async fn test_patterns_are_bounded_and_sorted() {
    let browser = browser();
    let config = DigestConfig {
        top_patterns: 2,
        ..DigestConfig::default()
    };
    let collector = DigestCollector::new(browser, config);

    let digest = collector.collect(false).await.unwrap();

    assert_eq!(digest.element_patterns.len(), 2);
    assert!(digest.element_patterns[0].count >= digest.element_patterns[1].count);
    assert!(digest
        .element_patterns
        .iter()
        .all(|p| p.selector != "a.nav"));
}
