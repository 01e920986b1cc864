//! # Core Traits (Ports)
//!
//! Any protocol or persistence plugin must implement these traits to be
//! wired into the application context.

use async_trait::async_trait;

use crate::models::{FeedBatch, NewPost, Post, Profile, Session, StrongRef, ThreadView};

/// The social-protocol client every orchestration unit talks to.
///
/// Each call either succeeds with its payload or fails; callers treat
/// failures as retryable and never fatal.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    // Session lifecycle
    async fn login(&self, identifier: &str, password: &str) -> anyhow::Result<Session>;
    /// Re-establishes a persisted session, returning it (possibly refreshed).
    async fn resume_session(&self, session: Session) -> anyhow::Result<Session>;
    async fn delete_session(&self) -> anyhow::Result<()>;
    /// The session currently held by the client, if any.
    fn session(&self) -> Option<Session>;

    // Reads
    async fn get_timeline(&self, limit: usize, cursor: Option<String>) -> anyhow::Result<FeedBatch>;
    /// Reads a feed generator's output; `feed` is the generator's at-uri.
    async fn get_feed(&self, feed: &str, limit: usize, cursor: Option<String>) -> anyhow::Result<FeedBatch>;
    async fn get_posts(&self, uris: Vec<String>) -> anyhow::Result<Vec<Post>>;
    async fn get_post_thread(&self, uri: &str, depth: u32) -> anyhow::Result<ThreadView>;
    async fn get_profile(&self, actor: &str) -> anyhow::Result<Profile>;

    // Writes
    async fn create_post(&self, post: NewPost) -> anyhow::Result<StrongRef>;
    /// Likes `subject`, returning the like record's URI (needed to un-like).
    async fn like(&self, subject: StrongRef) -> anyhow::Result<String>;
    async fn delete_like(&self, like_uri: &str) -> anyhow::Result<()>;
    /// Reposts `subject`, returning the repost record's URI.
    async fn repost(&self, subject: StrongRef) -> anyhow::Result<String>;
    async fn delete_repost(&self, repost_uri: &str) -> anyhow::Result<()>;
}

/// Persistence hook for the session blob.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<Option<Session>>;
    async fn save(&self, session: &Session) -> anyhow::Result<()>;
    async fn clear(&self) -> anyhow::Result<()>;
}
