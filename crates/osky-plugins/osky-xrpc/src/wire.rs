//! Request and response bodies of the XRPC methods oldsky calls, plus the
//! record payloads it writes.

use chrono::{DateTime, SecondsFormat, Utc};
use osky_core::{NewPost, Post, StrongRef, ThreadView};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const POST_COLLECTION: &str = "app.bsky.feed.post";
pub const LIKE_COLLECTION: &str = "app.bsky.feed.like";
pub const REPOST_COLLECTION: &str = "app.bsky.feed.repost";

/// Error body every XRPC endpoint returns on a non-2xx status.
#[derive(Debug, Default, Deserialize)]
pub struct XrpcErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct CreateSession<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize)]
pub struct PostsResponse {
    #[serde(default)]
    pub posts: Vec<Post>,
}

#[derive(Deserialize)]
pub struct ThreadResponse {
    pub thread: ThreadView,
}

#[derive(Serialize)]
pub struct CreateRecord<'a> {
    pub repo: &'a str,
    pub collection: &'a str,
    pub record: Value,
}

#[derive(Serialize)]
pub struct DeleteRecord<'a> {
    pub repo: &'a str,
    pub collection: &'a str,
    pub rkey: &'a str,
}

/// Splits `at://<repo>/<collection>/<rkey>`.
pub fn parse_at_uri(uri: &str) -> Option<(&str, &str, &str)> {
    let rest = uri.strip_prefix("at://")?;
    let mut parts = rest.splitn(3, '/');
    let repo = parts.next().filter(|s| !s.is_empty())?;
    let collection = parts.next().filter(|s| !s.is_empty())?;
    let rkey = parts.next().filter(|s| !s.is_empty() && !s.contains('/'))?;
    Some((repo, collection, rkey))
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn post_record(post: &NewPost, now: DateTime<Utc>) -> Value {
    let mut record = json!({
        "$type": POST_COLLECTION,
        "text": post.text,
        "createdAt": timestamp(now),
    });
    if let Some(reply) = &post.reply {
        record["reply"] = json!(reply);
    }
    if !post.facets.is_empty() {
        record["facets"] = json!(post.facets);
    }
    record
}

/// Like and repost records share one shape.
pub fn subject_record(collection: &str, subject: &StrongRef, now: DateTime<Utc>) -> Value {
    json!({
        "$type": collection,
        "subject": subject,
        "createdAt": timestamp(now),
    })
}
