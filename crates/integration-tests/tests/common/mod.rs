//! In-memory protocol fake shared by the scenario tests. Feeds are served
//! from cursor-keyed batches, posts and threads from maps, and every call is
//! counted so tests can assert on network traffic.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use osky_app::AppContext;
use osky_core::{
    FeedBatch, FeedConfig, NewPost, Post, ProtocolClient, Profile, Session, SessionStore, StrongRef, ThreadConfig,
    ThreadView,
};
use secrecy::SecretString;
use tokio::sync::Notify;

pub use osky_core::fixtures::*;

#[derive(Default)]
pub struct FakeClient {
    /// Following timeline, keyed by the cursor that requests the batch.
    pub timeline: Mutex<HashMap<Option<String>, FeedBatch>>,
    /// Discovery feed, same keying.
    pub discovery: Mutex<HashMap<Option<String>, FeedBatch>>,
    pub posts: Mutex<HashMap<String, Post>>,
    pub threads: Mutex<HashMap<String, ThreadView>>,
    pub profiles: Mutex<HashMap<String, Profile>>,
    pub created: Mutex<Vec<NewPost>>,
    pub session: Mutex<Option<Session>>,

    pub timeline_calls: AtomicUsize,
    pub discovery_calls: AtomicUsize,
    pub get_posts_calls: AtomicUsize,
    pub thread_calls: Mutex<HashMap<String, usize>>,
    pub record_seq: AtomicUsize,
    pub fail_mutations: AtomicBool,

    /// When set, feed reads park here until notified.
    pub gate: Mutex<Option<Arc<Notify>>>,
    /// When set, like/repost writes park here until notified.
    pub mutation_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeline(self, cursor: Option<&str>, batch: FeedBatch) -> Self {
        self.timeline.lock().unwrap().insert(cursor.map(str::to_string), batch);
        self
    }

    pub fn with_discovery(self, cursor: Option<&str>, batch: FeedBatch) -> Self {
        self.discovery.lock().unwrap().insert(cursor.map(str::to_string), batch);
        self
    }

    pub fn with_post(self, post: Post) -> Self {
        self.posts.lock().unwrap().insert(post.uri.clone(), post);
        self
    }

    pub fn with_thread(self, uri: &str, view: ThreadView) -> Self {
        self.threads.lock().unwrap().insert(uri.to_string(), view);
        self
    }

    pub fn with_gate(self, gate: Arc<Notify>) -> Self {
        *self.gate.lock().unwrap() = Some(gate);
        self
    }

    pub fn with_mutation_gate(self, gate: Arc<Notify>) -> Self {
        *self.mutation_gate.lock().unwrap() = Some(gate);
        self
    }

    pub fn thread_calls(&self, uri: &str) -> usize {
        self.thread_calls.lock().unwrap().get(uri).copied().unwrap_or(0)
    }

    async fn wait_gate(&self) {
        park(&self.gate).await;
    }

    async fn wait_mutation_gate(&self) {
        park(&self.mutation_gate).await;
    }

    fn next_record(&self, collection: &str) -> String {
        let n = self.record_seq.fetch_add(1, Ordering::SeqCst);
        format!("at://did:plc:me/{collection}/{n}")
    }

    fn check_mutation(&self) -> anyhow::Result<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            anyhow::bail!("upstream rejected the write");
        }
        Ok(())
    }
}

async fn park(slot: &Mutex<Option<Arc<Notify>>>) {
    let gate = slot.lock().unwrap().clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }
}

pub fn session() -> Session {
    Session {
        did: "did:plc:me".into(),
        handle: "me.test".into(),
        access_jwt: "access".into(),
        refresh_jwt: "refresh".into(),
    }
}

fn serve(batches: &Mutex<HashMap<Option<String>, FeedBatch>>, cursor: Option<String>) -> anyhow::Result<FeedBatch> {
    batches
        .lock()
        .unwrap()
        .get(&cursor)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no batch for cursor {cursor:?}"))
}

#[async_trait]
impl ProtocolClient for FakeClient {
    async fn login(&self, identifier: &str, password: &str) -> anyhow::Result<Session> {
        if password != "app-password" {
            anyhow::bail!("AuthenticationRequired: invalid password for {identifier}");
        }
        let session = session();
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(session)
    }

    async fn resume_session(&self, session: Session) -> anyhow::Result<Session> {
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(session)
    }

    async fn delete_session(&self) -> anyhow::Result<()> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }

    fn session(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    async fn get_timeline(&self, _limit: usize, cursor: Option<String>) -> anyhow::Result<FeedBatch> {
        self.timeline_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        serve(&self.timeline, cursor)
    }

    async fn get_feed(&self, _feed: &str, _limit: usize, cursor: Option<String>) -> anyhow::Result<FeedBatch> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        serve(&self.discovery, cursor)
    }

    async fn get_posts(&self, uris: Vec<String>) -> anyhow::Result<Vec<Post>> {
        self.get_posts_calls.fetch_add(1, Ordering::SeqCst);
        let posts = self.posts.lock().unwrap();
        Ok(uris.iter().filter_map(|uri| posts.get(uri).cloned()).collect())
    }

    async fn get_post_thread(&self, uri: &str, _depth: u32) -> anyhow::Result<ThreadView> {
        *self.thread_calls.lock().unwrap().entry(uri.to_string()).or_default() += 1;
        self.threads
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("thread {uri} not found"))
    }

    async fn get_profile(&self, actor: &str) -> anyhow::Result<Profile> {
        self.profiles
            .lock()
            .unwrap()
            .get(actor)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("profile {actor} not found"))
    }

    async fn create_post(&self, post: NewPost) -> anyhow::Result<StrongRef> {
        self.check_mutation()?;
        self.created.lock().unwrap().push(post);
        Ok(StrongRef {
            uri: self.next_record("app.bsky.feed.post"),
            cid: "bafy".into(),
        })
    }

    async fn like(&self, _subject: StrongRef) -> anyhow::Result<String> {
        self.wait_mutation_gate().await;
        self.check_mutation()?;
        Ok(self.next_record("app.bsky.feed.like"))
    }

    async fn delete_like(&self, _like_uri: &str) -> anyhow::Result<()> {
        self.check_mutation()
    }

    async fn repost(&self, _subject: StrongRef) -> anyhow::Result<String> {
        self.wait_mutation_gate().await;
        self.check_mutation()?;
        Ok(self.next_record("app.bsky.feed.repost"))
    }

    async fn delete_repost(&self, _repost_uri: &str) -> anyhow::Result<()> {
        self.check_mutation()
    }
}

/// Top-level posts `<prefix>0 .. <prefix>{n-1}`.
pub fn top_level(prefix: &str, n: usize) -> Vec<Post> {
    (0..n).map(|i| post(&format!("{prefix}{i}"))).collect()
}

pub fn fast_threads() -> ThreadConfig {
    ThreadConfig {
        expand_delay_ms: 0,
        ..ThreadConfig::default()
    }
}

/// Session store that keeps the blob in memory.
#[derive(Default)]
pub struct MemorySessionStore {
    pub blob: Mutex<Option<Session>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> anyhow::Result<Option<Session>> {
        Ok(self.blob.lock().unwrap().clone())
    }

    async fn save(&self, session: &Session) -> anyhow::Result<()> {
        *self.blob.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        *self.blob.lock().unwrap() = None;
        Ok(())
    }
}

pub fn context(client: Arc<FakeClient>, store: Arc<dyn SessionStore>, feed: FeedConfig) -> AppContext {
    AppContext::new(client, store, feed, fast_threads())
}

/// A context already signed in against `client`; no page is loaded yet.
pub async fn signed_in(client: Arc<FakeClient>, feed: FeedConfig) -> AppContext {
    let ctx = context(client, Arc::new(MemorySessionStore::default()), feed);
    ctx.auth()
        .login("me.test", &SecretString::from("app-password".to_string()))
        .await
        .expect("fake login succeeds");
    ctx
}
