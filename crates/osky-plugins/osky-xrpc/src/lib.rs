//! # osky-xrpc
//!
//! `ProtocolClient` over HTTP XRPC against a Bluesky PDS.
//! Queries are `GET /xrpc/<nsid>`, procedures `POST /xrpc/<nsid>` with a
//! JSON body; every call after login carries the access token. An
//! `ExpiredToken` answer triggers one refresh and a single retry.

mod wire;

use std::sync::RwLock;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use osky_core::{FeedBatch, NewPost, Post, ProtocolClient, Profile, Session, StrongRef, ThreadView};
use reqwest::header::USER_AGENT;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

pub use wire::parse_at_uri;
use wire::{
    post_record, subject_record, CreateRecord, CreateSession, DeleteRecord, PostsResponse, ThreadResponse,
    XrpcErrorBody, LIKE_COLLECTION, POST_COLLECTION, REPOST_COLLECTION,
};

/// Upper bound the feed endpoints accept for `limit`.
const MAX_LIMIT: usize = 100;

/// A failed XRPC call, carrying the lexicon error name.
#[derive(Debug)]
pub struct XrpcError {
    pub nsid: &'static str,
    pub status: StatusCode,
    pub error: String,
    pub message: Option<String>,
}

impl std::fmt::Display for XrpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} returned {}", self.nsid, self.status)?;
        if !self.error.is_empty() {
            write!(f, " {}", self.error)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for XrpcError {}

pub struct XrpcClient {
    http: reqwest::Client,
    /// PDS base URL without a trailing slash (e.g. "https://bsky.social")
    service: String,
    session: RwLock<Option<Session>>,
}

impl XrpcClient {
    pub fn new(service: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self::with_http(http, service))
    }

    pub fn with_http(http: reqwest::Client, service: &str) -> Self {
        Self {
            http,
            service: service.trim_end_matches('/').to_string(),
            session: RwLock::new(None),
        }
    }

    fn url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.service, nsid)
    }

    fn current(&self) -> Option<Session> {
        self.session.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn store(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = session;
    }

    fn require_session(&self) -> anyhow::Result<Session> {
        self.current().ok_or_else(|| anyhow!("no active session"))
    }

    fn get(&self, nsid: &str) -> RequestBuilder {
        self.http
            .get(self.url(nsid))
            .header(USER_AGENT, format!("oldsky/{}", env!("CARGO_PKG_VERSION")))
    }

    fn post(&self, nsid: &str) -> RequestBuilder {
        self.http
            .post(self.url(nsid))
            .header(USER_AGENT, format!("oldsky/{}", env!("CARGO_PKG_VERSION")))
    }

    /// Sends an authenticated request built by `build`, refreshing the
    /// session once if the access token has expired.
    async fn call<T, F>(&self, nsid: &'static str, build: F) -> anyhow::Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let session = self.require_session()?;
        let response = send(nsid, build().bearer_auth(&session.access_jwt)).await?;
        let response = match check(nsid, response).await {
            Err(err) if is_expired(&err) => {
                debug!(nsid, "access token expired, refreshing");
                let session = self.refresh(&session).await?;
                check(nsid, send(nsid, build().bearer_auth(&session.access_jwt)).await?).await?
            }
            other => other?,
        };
        parse(nsid, response).await
    }

    async fn refresh(&self, session: &Session) -> anyhow::Result<Session> {
        let nsid = "com.atproto.server.refreshSession";
        let response = send(nsid, self.post(nsid).bearer_auth(&session.refresh_jwt)).await?;
        let fresh: Session = parse(nsid, check(nsid, response).await?).await?;
        self.store(Some(fresh.clone()));
        info!(handle = %fresh.handle, "session refreshed");
        Ok(fresh)
    }

    async fn create_record(&self, collection: &str, record: Value) -> anyhow::Result<StrongRef> {
        let session = self.require_session()?;
        let body = CreateRecord {
            repo: &session.did,
            collection,
            record,
        };
        let nsid = "com.atproto.repo.createRecord";
        self.call(nsid, || self.post(nsid).json(&body)).await
    }

    async fn delete_record(&self, uri: &str, expected: &str) -> anyhow::Result<()> {
        let (repo, collection, rkey) = parse_at_uri(uri).ok_or_else(|| anyhow!("not a record uri: {uri}"))?;
        if collection != expected {
            bail!("{uri} is not a {expected} record");
        }
        let body = DeleteRecord { repo, collection, rkey };
        let nsid = "com.atproto.repo.deleteRecord";
        let _: Value = self.call(nsid, || self.post(nsid).json(&body)).await?;
        Ok(())
    }
}

async fn send(nsid: &'static str, request: RequestBuilder) -> anyhow::Result<Response> {
    request.send().await.with_context(|| format!("request {nsid}"))
}

/// Turns a non-2xx response into an `XrpcError`.
async fn check(nsid: &'static str, response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: XrpcErrorBody = response.json().await.unwrap_or_default();
    Err(XrpcError {
        nsid,
        status,
        error: body.error,
        message: body.message,
    }
    .into())
}

async fn parse<T: DeserializeOwned>(nsid: &'static str, response: Response) -> anyhow::Result<T> {
    let bytes = response.bytes().await.with_context(|| format!("read {nsid} body"))?;
    // Procedures with no output answer with an empty body.
    let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes[..] };
    serde_json::from_slice(bytes).with_context(|| format!("parse {nsid} json"))
}

fn is_expired(err: &anyhow::Error) -> bool {
    err.downcast_ref::<XrpcError>()
        .is_some_and(|e| e.error == "ExpiredToken")
}

fn feed_query(limit: usize, cursor: Option<String>) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", limit.clamp(1, MAX_LIMIT).to_string())];
    if let Some(cursor) = cursor {
        query.push(("cursor", cursor));
    }
    query
}

#[async_trait]
impl ProtocolClient for XrpcClient {
    async fn login(&self, identifier: &str, password: &str) -> anyhow::Result<Session> {
        let nsid = "com.atproto.server.createSession";
        let request = self.post(nsid).json(&CreateSession { identifier, password });
        let session: Session = parse(nsid, check(nsid, send(nsid, request).await?).await?).await?;
        self.store(Some(session.clone()));
        info!(handle = %session.handle, service = %self.service, "session created");
        Ok(session)
    }

    async fn resume_session(&self, session: Session) -> anyhow::Result<Session> {
        self.store(Some(session.clone()));
        let nsid = "com.atproto.server.getSession";
        // getSession echoes did/handle only; tokens stay as they are.
        let resumed: anyhow::Result<Value> = self.call(nsid, || self.get(nsid)).await;
        match resumed {
            Ok(_) => Ok(self.current().unwrap_or(session)),
            Err(err) => {
                self.store(None);
                Err(err)
            }
        }
    }

    async fn delete_session(&self) -> anyhow::Result<()> {
        let Some(session) = self.current() else {
            return Ok(());
        };
        self.store(None);
        let nsid = "com.atproto.server.deleteSession";
        let response = send(nsid, self.post(nsid).bearer_auth(&session.refresh_jwt)).await?;
        check(nsid, response).await?;
        Ok(())
    }

    fn session(&self) -> Option<Session> {
        self.current()
    }

    async fn get_timeline(&self, limit: usize, cursor: Option<String>) -> anyhow::Result<FeedBatch> {
        let nsid = "app.bsky.feed.getTimeline";
        let query = feed_query(limit, cursor);
        self.call(nsid, || self.get(nsid).query(&query)).await
    }

    async fn get_feed(&self, feed: &str, limit: usize, cursor: Option<String>) -> anyhow::Result<FeedBatch> {
        let nsid = "app.bsky.feed.getFeed";
        let mut query = feed_query(limit, cursor);
        query.push(("feed", feed.to_string()));
        self.call(nsid, || self.get(nsid).query(&query)).await
    }

    async fn get_posts(&self, uris: Vec<String>) -> anyhow::Result<Vec<Post>> {
        if uris.is_empty() {
            return Ok(Vec::new());
        }
        let nsid = "app.bsky.feed.getPosts";
        let query: Vec<(&str, String)> = uris.into_iter().map(|uri| ("uris", uri)).collect();
        let response: PostsResponse = self.call(nsid, || self.get(nsid).query(&query)).await?;
        Ok(response.posts)
    }

    async fn get_post_thread(&self, uri: &str, depth: u32) -> anyhow::Result<ThreadView> {
        let nsid = "app.bsky.feed.getPostThread";
        let query = [("uri", uri.to_string()), ("depth", depth.to_string())];
        let response: ThreadResponse = self.call(nsid, || self.get(nsid).query(&query)).await?;
        Ok(response.thread)
    }

    async fn get_profile(&self, actor: &str) -> anyhow::Result<Profile> {
        let nsid = "app.bsky.actor.getProfile";
        self.call(nsid, || self.get(nsid).query(&[("actor", actor)])).await
    }

    async fn create_post(&self, post: NewPost) -> anyhow::Result<StrongRef> {
        self.create_record(POST_COLLECTION, post_record(&post, Utc::now())).await
    }

    async fn like(&self, subject: StrongRef) -> anyhow::Result<String> {
        let record = subject_record(LIKE_COLLECTION, &subject, Utc::now());
        Ok(self.create_record(LIKE_COLLECTION, record).await?.uri)
    }

    async fn delete_like(&self, like_uri: &str) -> anyhow::Result<()> {
        self.delete_record(like_uri, LIKE_COLLECTION).await
    }

    async fn repost(&self, subject: StrongRef) -> anyhow::Result<String> {
        let record = subject_record(REPOST_COLLECTION, &subject, Utc::now());
        Ok(self.create_record(REPOST_COLLECTION, record).await?.uri)
    }

    async fn delete_repost(&self, repost_uri: &str) -> anyhow::Result<()> {
        self.delete_record(repost_uri, REPOST_COLLECTION).await
    }
}
