//! # AppContext
//!
//! Session-scoped owner of the orchestration units, built from one protocol
//! client and one session store. Front-ends hold a single `AppContext` and
//! call through it so every operation sees the same auth state.

use std::sync::Arc;

use osky_core::{
    FeedConfig, FeedPage, FeedType, Interaction, Post, ProtocolClient, Result, Session, SessionStore,
    ThreadConfig,
};
use secrecy::SecretString;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::auth::Auth;
use crate::feed::FeedPaginator;
use crate::interactions::InteractionStore;
use crate::thread::{ExpandOutcome, ThreadAssembler};

pub struct AppContext {
    auth: Auth,
    feed: FeedPaginator,
    threads: Arc<ThreadAssembler>,
    interactions: InteractionStore,
}

impl AppContext {
    pub fn new(
        client: Arc<dyn ProtocolClient>,
        store: Arc<dyn SessionStore>,
        feed: FeedConfig,
        thread: ThreadConfig,
    ) -> Self {
        Self {
            auth: Auth::new(client.clone(), store),
            feed: FeedPaginator::new(client.clone(), feed),
            threads: Arc::new(ThreadAssembler::new(client.clone(), thread)),
            interactions: InteractionStore::new(client),
        }
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn feed(&self) -> &FeedPaginator {
        &self.feed
    }

    pub fn threads(&self) -> &Arc<ThreadAssembler> {
        &self.threads
    }

    pub fn interactions(&self) -> &InteractionStore {
        &self.interactions
    }

    /// Signs in and loads the first page. A failed first page is left as
    /// the paginator's retryable error state.
    pub async fn login(&self, identifier: &str, password: &SecretString) -> Result<Session> {
        let session = self.auth.login(identifier, password).await?;
        self.load_first_page().await;
        Ok(session)
    }

    /// Resumes the stored session and, if that worked, loads the first page.
    pub async fn resume(&self) -> Result<bool> {
        let resumed = self.auth.resume().await?;
        if resumed {
            self.load_first_page().await;
        }
        Ok(resumed)
    }

    pub async fn logout(&self) {
        self.auth.logout().await;
    }

    pub async fn load_page(&self, page_number: u32) -> Result<Arc<FeedPage>> {
        self.auth.require().await?;
        self.feed.load_page(page_number).await
    }

    pub async fn set_feed_type(&self, feed_type: FeedType) -> Result<Arc<FeedPage>> {
        self.auth.require().await?;
        self.feed.set_feed_type(feed_type).await
    }

    /// Loads a thread and spawns its expansion sweep; cancel `cancel` when
    /// the thread view goes away.
    pub async fn open_thread(&self, uri: &str, cancel: CancellationToken) -> Result<JoinHandle<ExpandOutcome>> {
        self.auth.require().await?;
        self.threads.open_thread(uri, cancel).await
    }

    pub async fn toggle_like(&self, post: &Post) -> Result<Interaction> {
        self.auth.require().await?;
        Ok(self.interactions.toggle_like(post).await)
    }

    pub async fn toggle_repost(&self, post: &Post) -> Result<Interaction> {
        self.auth.require().await?;
        Ok(self.interactions.toggle_repost(post).await)
    }

    pub async fn post_comment(&self, post: &Post, text: &str) -> Result<Interaction> {
        self.auth.require().await?;
        self.interactions.post_comment(post, text).await
    }

    async fn load_first_page(&self) {
        if let Err(e) = self.feed.reset_and_load().await {
            warn!(error = %e, "first page did not load");
        }
    }
}
