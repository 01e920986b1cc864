//! # Feed Paginator
//!
//! Produces fixed-size pages of a feed source. Replies are resolved to
//! their top-level post, duplicates are dropped across every page of the
//! current feed type, and pages are cached by number so backward
//! navigation never refetches.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use osky_core::{AppError, FeedBatch, FeedConfig, FeedItem, FeedPage, FeedType, ProtocolClient, Result};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

pub struct FeedPaginator {
    client: Arc<dyn ProtocolClient>,
    config: FeedConfig,
    state: Mutex<FeedState>,
    /// Loading gate: at most one load runs at a time.
    loading: AtomicBool,
}

#[derive(Debug)]
struct FeedState {
    feed_type: FeedType,
    pages: BTreeMap<u32, Arc<FeedPage>>,
    /// Every uri shown on any page of this feed-type session.
    seen: HashSet<String>,
    current_page: u32,
    error: Option<String>,
    failed_page: Option<u32>,
}

impl FeedState {
    fn new(feed_type: FeedType) -> Self {
        Self {
            feed_type,
            pages: BTreeMap::new(),
            seen: HashSet::new(),
            current_page: 1,
            error: None,
            failed_page: None,
        }
    }
}

/// Releases the loading gate when the load settles, however it ends.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FeedPaginator {
    pub fn new(client: Arc<dyn ProtocolClient>, config: FeedConfig) -> Self {
        Self {
            client,
            config,
            state: Mutex::new(FeedState::new(FeedType::default())),
            loading: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    fn begin_load(&self) -> Result<LoadingGuard<'_>> {
        self.loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AppError::Busy)?;
        Ok(LoadingGuard(&self.loading))
    }

    /// Shows page `page_number`, fetching it if it is not cached yet.
    pub async fn load_page(&self, page_number: u32) -> Result<Arc<FeedPage>> {
        let _gate = self.begin_load()?;
        self.load_page_gated(page_number).await
    }

    /// Switches the feed source, dropping every cached page and the
    /// seen-set, then loads page 1 of the new source.
    pub async fn set_feed_type(&self, feed_type: FeedType) -> Result<Arc<FeedPage>> {
        let _gate = self.begin_load()?;
        *self.state.lock().await = FeedState::new(feed_type);
        info!(feed = %feed_type, "feed type changed");
        self.load_page_gated(1).await
    }

    /// Same reset as a feed-type change, keeping the current type. Used
    /// right after authentication.
    pub async fn reset_and_load(&self) -> Result<Arc<FeedPage>> {
        let _gate = self.begin_load()?;
        {
            let mut state = self.state.lock().await;
            let feed_type = state.feed_type;
            *state = FeedState::new(feed_type);
        }
        self.load_page_gated(1).await
    }

    /// Re-invokes the load that last failed.
    pub async fn retry(&self) -> Result<Arc<FeedPage>> {
        let page = {
            let state = self.state.lock().await;
            state.failed_page.unwrap_or(state.current_page)
        };
        self.load_page(page).await
    }

    pub async fn next_page(&self) -> Result<Arc<FeedPage>> {
        let current = self.current_page().await;
        self.load_page(current + 1).await
    }

    /// Page 1 has no predecessor; asking for it just re-shows page 1.
    pub async fn previous_page(&self) -> Result<Arc<FeedPage>> {
        let current = self.current_page().await;
        self.load_page(current.saturating_sub(1).max(1)).await
    }

    async fn load_page_gated(&self, page_number: u32) -> Result<Arc<FeedPage>> {
        if page_number == 0 {
            return Err(AppError::InvalidPage(0));
        }

        let (feed_type, cursor, seen) = {
            let mut state = self.state.lock().await;
            state.error = None;

            if let Some(page) = state.pages.get(&page_number).cloned() {
                debug!(page = page_number, "feed page cache hit");
                state.current_page = page_number;
                state.failed_page = None;
                return Ok(page);
            }

            let cursor = if page_number == 1 {
                None
            } else {
                match state.pages.get(&(page_number - 1)) {
                    None => return Err(AppError::InvalidPage(page_number)),
                    Some(prev) => match &prev.cursor {
                        Some(cursor) => Some(cursor.clone()),
                        None => return Err(AppError::FeedExhausted(page_number - 1)),
                    },
                }
            };
            (state.feed_type, cursor, state.seen.clone())
        };

        match self.assemble(feed_type, cursor, &seen).await {
            Ok(page) => {
                let page = Arc::new(page);
                let mut state = self.state.lock().await;
                state.seen.extend(page.posts.iter().map(|item| item.post.uri.clone()));
                state.pages.insert(page_number, Arc::clone(&page));
                state.current_page = page_number;
                state.failed_page = None;
                info!(
                    feed = %feed_type,
                    page = page_number,
                    posts = page.posts.len(),
                    has_next = page.cursor.is_some(),
                    "feed page loaded"
                );
                Ok(page)
            }
            Err(err) => {
                error!(feed = %feed_type, page = page_number, error = %err, "failed to load feed page");
                let mut state = self.state.lock().await;
                state.error = Some("Failed to load posts. Please try again.".to_string());
                state.failed_page = Some(page_number);
                Err(AppError::FeedLoad(err.to_string()))
            }
        }
    }

    /// Pulls batches until a full page of unique, resolved items is
    /// available or the source runs dry.
    async fn assemble(
        &self,
        feed_type: FeedType,
        mut cursor: Option<String>,
        seen: &HashSet<String>,
    ) -> anyhow::Result<FeedPage> {
        let page_size = self.config.page_size;
        let mut posts: Vec<FeedItem> = Vec::with_capacity(page_size);
        let mut taken: HashSet<String> = HashSet::new();

        while posts.len() < page_size {
            let batch = self.fetch_batch(feed_type, cursor.take()).await?;
            let fetched = batch.feed.len();

            let resolved = join_all(batch.feed.into_iter().map(|item| self.resolve_top_level(item))).await;
            let mut dropped = 0usize;
            for item in resolved {
                let Some(item) = item else {
                    dropped += 1;
                    continue;
                };
                if seen.contains(&item.post.uri) || !taken.insert(item.post.uri.clone()) {
                    continue;
                }
                posts.push(item);
            }
            debug!(fetched, dropped, accumulated = posts.len(), "feed batch processed");

            cursor = batch.cursor;
            if cursor.is_none() || fetched == 0 {
                break;
            }
        }

        posts.truncate(page_size);
        Ok(FeedPage { posts, cursor })
    }

    async fn fetch_batch(&self, feed_type: FeedType, cursor: Option<String>) -> anyhow::Result<FeedBatch> {
        let limit = self.config.batch_size();
        match feed_type {
            FeedType::Following => self.client.get_timeline(limit, cursor).await,
            FeedType::Discovery => {
                self.client
                    .get_feed(&self.config.discovery_feed_uri, limit, cursor)
                    .await
            }
        }
    }

    /// Walks a reply up to the first ancestor that is not itself a reply.
    ///
    /// Returns `None` when any lookup fails, comes back empty, or the chain
    /// is longer than `max_ancestor_hops`. The resolved item keeps the
    /// original item's feed reason.
    pub async fn resolve_top_level(&self, item: FeedItem) -> Option<FeedItem> {
        let FeedItem { post, reason } = item;
        let mut current = post;

        for _ in 0..self.config.max_ancestor_hops {
            let Some(parent_uri) = current.parent_uri().map(str::to_owned) else {
                return Some(FeedItem { post: current, reason });
            };

            match self.client.get_posts(vec![parent_uri.clone()]).await {
                Ok(posts) => match posts.into_iter().next() {
                    Some(parent) => current = parent,
                    None => {
                        debug!(%parent_uri, "ancestor not found, dropping feed item");
                        return None;
                    }
                },
                Err(err) => {
                    debug!(%parent_uri, error = %err, "ancestor lookup failed, dropping feed item");
                    return None;
                }
            }
        }

        if current.is_reply() {
            debug!(uri = %current.uri, "reply chain too long, dropping feed item");
            return None;
        }
        Some(FeedItem { post: current, reason })
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub async fn feed_type(&self) -> FeedType {
        self.state.lock().await.feed_type
    }

    pub async fn current_page(&self) -> u32 {
        self.state.lock().await.current_page
    }

    pub async fn page(&self, page_number: u32) -> Option<Arc<FeedPage>> {
        self.state.lock().await.pages.get(&page_number).cloned()
    }

    pub async fn current(&self) -> Option<Arc<FeedPage>> {
        let state = self.state.lock().await;
        state.pages.get(&state.current_page).cloned()
    }

    /// All cached pages in page order.
    pub async fn pages(&self) -> Vec<(u32, Arc<FeedPage>)> {
        let state = self.state.lock().await;
        state.pages.iter().map(|(n, page)| (*n, Arc::clone(page))).collect()
    }

    pub async fn page_count(&self) -> usize {
        self.state.lock().await.pages.len()
    }

    pub async fn has_next_page(&self) -> bool {
        let state = self.state.lock().await;
        state
            .pages
            .get(&state.current_page)
            .is_some_and(|page| page.cursor.is_some())
    }

    /// User-facing message of the last failed load, cleared by the next attempt.
    pub async fn error(&self) -> Option<String> {
        self.state.lock().await.error.clone()
    }
}
