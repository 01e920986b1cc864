//! Tunables for the orchestration units. Loaded by `osky-config`,
//! defaulted here so tests and embedders can build them directly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The "what's hot" feed generator used for the discovery feed.
pub const DEFAULT_DISCOVERY_FEED: &str =
    "at://did:plc:z72i7hdynmk6r22z27h6tvur/app.bsky.feed.generator/whats-hot";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Posts per page.
    pub page_size: usize,
    /// Each upstream batch asks for `page_size * fetch_multiplier` items,
    /// since replies collapse onto ancestors and duplicates are dropped.
    pub fetch_multiplier: usize,
    pub discovery_feed_uri: String,
    /// Longest reply chain walked before an item is dropped.
    pub max_ancestor_hops: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            fetch_multiplier: 2,
            discovery_feed_uri: DEFAULT_DISCOVERY_FEED.to_string(),
            max_ancestor_hops: 64,
        }
    }
}

impl FeedConfig {
    pub fn batch_size(&self) -> usize {
        self.page_size.saturating_mul(self.fetch_multiplier.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Depth requested from `getPostThread`.
    pub initial_depth: u32,
    /// Levels the background sweep expands below the first reply level.
    pub auto_expand_levels: u32,
    /// Pause before each sweep fetch.
    pub expand_delay_ms: u64,
    /// Reveal step for "load more replies".
    pub replies_per_page: usize,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            initial_depth: 2,
            auto_expand_levels: 2,
            expand_delay_ms: 150,
            replies_per_page: 20,
        }
    }
}

impl ThreadConfig {
    pub fn expand_delay(&self) -> Duration {
        Duration::from_millis(self.expand_delay_ms)
    }
}
