mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use osky_core::{AppError, FeedConfig, FeedType};
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

/// 40 top-level posts and 5 replies: three answer posts already in the
/// batch, two answer posts that only `get_posts` knows about.
fn mixed_batch() -> FakeClient {
    let mut feed = vec![reply("r0", "p0"), reply("r3", "n0")];
    feed.extend(top_level("p", 40));
    feed.extend([reply("r1", "p1"), reply("r2", "p2"), reply("r4", "n1")]);

    FakeClient::new()
        .with_timeline(None, batch(feed, Some("c1")))
        .with_post(post("p0"))
        .with_post(post("p1"))
        .with_post(post("p2"))
        .with_post(post("n0"))
        .with_post(post("n1"))
}

#[tokio::test]
async fn test_first_page_from_mixed_batch() {
    let client = Arc::new(mixed_batch());
    let ctx = signed_in(client.clone(), FeedConfig::default()).await;

    let page = assert_ok!(ctx.load_page(1).await);

    let uris: Vec<&str> = page.posts.iter().map(|i| i.post.uri.as_str()).collect();
    let unique: HashSet<&str> = uris.iter().copied().collect();
    assert_eq!(uris.len(), 20);
    assert_eq!(unique.len(), 20);
    assert!(page.posts.iter().all(|i| !i.post.is_reply()));
    assert_eq!(&uris[..3], &["p0", "n0", "p1"]);
    assert_eq!(page.cursor.as_deref(), Some("c1"));
    assert_eq!(client.timeline_calls.load(Ordering::SeqCst), 1);
    assert!(ctx.feed().has_next_page().await);
}

#[tokio::test]
async fn test_pages_never_repeat_a_post_and_stay_cached() {
    let mut second = top_level("q", 10);
    // p5 was already shown on page 1.
    second.insert(3, post("p5"));
    let client = Arc::new(
        FakeClient::new()
            .with_timeline(None, batch(top_level("p", 20), Some("c1")))
            .with_timeline(Some("c1"), batch(second, Some("c2")))
            .with_timeline(Some("c2"), batch(top_level("z", 5), None)),
    );
    let ctx = signed_in(client.clone(), FeedConfig { page_size: 10, ..FeedConfig::default() }).await;

    let mut all = Vec::new();
    for n in 1..=2 {
        let page = assert_ok!(ctx.load_page(n).await);
        all.extend(page.posts.iter().map(|i| i.post.uri.clone()));
    }
    let unique: HashSet<&String> = all.iter().collect();
    assert_eq!(unique.len(), all.len());

    let calls = client.timeline_calls.load(Ordering::SeqCst);
    let again = assert_ok!(ctx.load_page(1).await);
    assert_eq!(client.timeline_calls.load(Ordering::SeqCst), calls);
    assert_eq!(again.posts.len(), 10);
    assert_eq!(ctx.feed().current_page().await, 1);
}

#[tokio::test]
async fn test_last_page_has_no_successor() {
    let client = Arc::new(FakeClient::new().with_timeline(None, batch(top_level("p", 3), None)));
    let ctx = signed_in(client, FeedConfig::default()).await;

    let page = assert_ok!(ctx.load_page(1).await);
    assert_eq!(page.posts.len(), 3);
    assert!(!ctx.feed().has_next_page().await);
    assert_eq!(ctx.feed().next_page().await.unwrap_err(), AppError::FeedExhausted(1));
    assert_eq!(ctx.load_page(5).await.unwrap_err(), AppError::InvalidPage(5));
}

#[tokio::test]
async fn test_switching_feed_type_starts_over() {
    let client = Arc::new(
        FakeClient::new()
            .with_timeline(None, batch(top_level("p", 5), None))
            .with_discovery(None, batch(vec![post("p0"), post("d0"), post("p1")], None)),
    );
    let ctx = signed_in(client.clone(), FeedConfig::default()).await;
    assert_ok!(ctx.load_page(1).await);

    let page = assert_ok!(ctx.set_feed_type(FeedType::Discovery).await);

    // p0 and p1 were seen in the following feed; that must not leak over.
    let uris: Vec<&str> = page.posts.iter().map(|i| i.post.uri.as_str()).collect();
    assert_eq!(uris, ["p0", "d0", "p1"]);
    assert_eq!(ctx.feed().page_count().await, 1);
    assert_eq!(ctx.feed().feed_type().await, FeedType::Discovery);
    assert_eq!(client.discovery_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_second_load_while_loading_is_busy() {
    let gate = Arc::new(Notify::new());
    let client = Arc::new(
        FakeClient::new()
            .with_timeline(None, batch(top_level("p", 3), None))
            .with_gate(gate.clone()),
    );
    let ctx = Arc::new(signed_in(client.clone(), FeedConfig::default()).await);

    let first = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.load_page(1).await }
    });
    while client.timeline_calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    assert!(ctx.feed().is_loading());
    assert_eq!(ctx.load_page(1).await.unwrap_err(), AppError::Busy);
    assert_eq!(ctx.set_feed_type(FeedType::Discovery).await.unwrap_err(), AppError::Busy);

    gate.notify_one();
    let page = assert_ok!(first.await.unwrap());
    assert_eq!(page.posts.len(), 3);
    assert!(!ctx.feed().is_loading());
}

#[tokio::test]
async fn test_failed_load_keeps_cache_and_can_be_retried() {
    let client = Arc::new(FakeClient::new().with_timeline(None, batch(top_level("p", 3), Some("c1"))));
    let ctx = signed_in(client.clone(), FeedConfig::default()).await;
    assert_ok!(ctx.load_page(1).await);

    let err = assert_err!(ctx.feed().next_page().await);
    assert!(matches!(err, AppError::FeedLoad(_)));
    assert!(err.is_retryable());
    assert_eq!(ctx.feed().error().await.as_deref(), Some("Failed to load posts. Please try again."));
    assert_eq!(ctx.feed().page_count().await, 1);

    client
        .timeline
        .lock()
        .unwrap()
        .insert(Some("c1".into()), batch(top_level("q", 2), None));
    let page = assert_ok!(ctx.feed().retry().await);
    assert_eq!(page.posts.len(), 2);
    assert_eq!(ctx.feed().current_page().await, 2);
    assert!(ctx.feed().error().await.is_none());
}

#[tokio::test]
async fn test_ancestor_resolution() {
    let client = Arc::new(
        FakeClient::new()
            .with_post(post("top"))
            .with_post(reply("mid", "top"))
            .with_post(reply("orphan", "missing")),
    );
    let ctx = signed_in(client, FeedConfig::default()).await;

    let resolved = ctx.feed().resolve_top_level(item(reply("leaf", "mid"))).await;
    assert_eq!(resolved.map(|i| i.post.uri), Some("top".to_string()));

    // An intermediate lookup comes back empty: dropped, not an error.
    let dropped = ctx.feed().resolve_top_level(item(reply("leaf2", "orphan"))).await;
    assert!(dropped.is_none());
}
