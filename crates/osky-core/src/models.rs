//! # Domain Models
//!
//! These structs mirror the parts of the `app.bsky.*` lexicon oldsky reads,
//! plus the client-side view state kept per post. Field names follow the
//! lexicon, so everything is camelCase on the wire.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Reads a lexicon datetime: RFC 3339, or a zone-less timestamp taken as
/// UTC. Anything else yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// Records are authored by arbitrary clients; one odd timestamp must not
// fail the whole batch it arrives in.
fn lenient_timestamp<'de, D: Deserializer<'de>>(de: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(de)?;
    Ok(raw.as_ref().and_then(serde_json::Value::as_str).and_then(parse_timestamp))
}

fn lenient_timestamp_or_epoch<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
    Ok(lenient_timestamp(de)?.unwrap_or_default())
}

/// Which upstream stream the front page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    /// Chronological timeline of accounts the viewer follows.
    #[default]
    Following,
    /// Algorithmic feed generator ("what's hot").
    Discovery,
}

impl FeedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::Following => "following",
            FeedType::Discovery => "discovery",
        }
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "following" | "home" => Ok(FeedType::Following),
            "discovery" | "discover" | "hot" => Ok(FeedType::Discovery),
            other => Err(format!("unknown feed type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub did: String,
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Author {
    /// Display name when set and non-blank, handle otherwise.
    pub fn name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.handle,
        }
    }
}

/// A (uri, cid) pair pinning one exact version of a record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StrongRef {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

/// Rich-text annotation over a UTF-8 byte range of the post text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub index: ByteSlice,
    #[serde(default)]
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
    #[serde(other)]
    Unknown,
}

/// The `app.bsky.feed.post` record as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(default)]
    pub text: String,
    /// `None` when the record carries no readable timestamp.
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    /// Raw record embed (images, external link, quoted record...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<serde_json::Value>,
}

/// The viewer's own relationship to a post, as hydrated by the AppView.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewerState {
    /// URI of the viewer's like record, if they liked the post.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like: Option<String>,
    /// URI of the viewer's repost record, if they reposted the post.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repost: Option<String>,
}

/// The fundamental unit of conversation (`app.bsky.feed.defs#postView`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Stable identifier; primary key for dedup and for the interaction store.
    pub uri: String,
    /// Content version, required by like/repost.
    pub cid: String,
    pub author: Author,
    pub record: PostRecord,
    /// Hydrated view embed, kept raw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<serde_json::Value>,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub repost_count: u32,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default, deserialize_with = "lenient_timestamp_or_epoch")]
    pub indexed_at: DateTime<Utc>,
    #[serde(default)]
    pub viewer: ViewerState,
}

impl Post {
    /// URI of the post this one replies to, when the record is a reply.
    pub fn parent_uri(&self) -> Option<&str> {
        self.record
            .reply
            .as_ref()
            .map(|reply| reply.parent.uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    pub fn is_reply(&self) -> bool {
        self.parent_uri().is_some()
    }

    /// Authoring time, falling back to when the AppView indexed the post.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.record.created_at.unwrap_or(self.indexed_at)
    }

    pub fn strong_ref(&self) -> StrongRef {
        StrongRef {
            uri: self.uri.clone(),
            cid: self.cid.clone(),
        }
    }
}

/// One entry of a feed (`app.bsky.feed.defs#feedViewPost`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub post: Post,
    /// Why the item is in the feed (e.g. someone reposted it).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<serde_json::Value>,
}

impl FeedItem {
    pub fn new(post: Post) -> Self {
        Self { post, reason: None }
    }
}

/// One raw batch as returned by the timeline / feed-generator endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedBatch {
    #[serde(default)]
    pub feed: Vec<FeedItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// A fixed-size page of reply-resolved, deduplicated feed items.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedPage {
    pub posts: Vec<FeedItem>,
    /// Upstream continuation token; `None` once the source is exhausted.
    pub cursor: Option<String>,
}

/// A node of `app.bsky.feed.getPostThread`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum ThreadView {
    #[serde(rename = "app.bsky.feed.defs#threadViewPost")]
    Node(ThreadViewPost),
    #[serde(rename = "app.bsky.feed.defs#notFoundPost")]
    NotFound { uri: String },
    #[serde(rename = "app.bsky.feed.defs#blockedPost")]
    Blocked { uri: String },
    #[serde(other)]
    Unknown,
}

impl ThreadView {
    pub fn as_node(&self) -> Option<&ThreadViewPost> {
        match self {
            ThreadView::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn into_node(self) -> Option<ThreadViewPost> {
        match self {
            ThreadView::Node(node) => Some(node),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadViewPost {
    pub post: Post,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<ThreadView>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<ThreadView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub did: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub follows_count: u64,
    #[serde(default)]
    pub posts_count: u64,
}

/// An authenticated session. Opaque to the orchestration layer; the
/// session store persists it as-is.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .field("access_jwt", &"[redacted]")
            .field("refresh_jwt", &"[redacted]")
            .finish()
    }
}

/// A post about to be created.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewPost {
    pub text: String,
    pub reply: Option<ReplyRef>,
    pub facets: Vec<Facet>,
}

/// Where the last like/repost mutation for a post stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MutationStatus {
    #[default]
    Idle,
    /// Sent upstream, counts not applied yet.
    Unconfirmed,
    /// Upstream accepted; counts applied.
    Confirmed,
    /// Upstream rejected; counts left as they were.
    RolledBack,
}

/// Per-post like/repost/comment state as seen by the current viewer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Interaction {
    pub is_liked: bool,
    pub like_count: u32,
    /// Handle needed to retract the like.
    pub like_uri: Option<String>,
    pub is_reposted: bool,
    pub repost_count: u32,
    /// Handle needed to retract the repost.
    pub repost_uri: Option<String>,
    pub comment_count: u32,
    pub has_commented: bool,
    /// Set once the entry was seeded from a post or written locally.
    pub is_initialized: bool,
    pub like_status: MutationStatus,
    pub repost_status: MutationStatus,
}

impl Interaction {
    /// The update that seeds an entry from the post's embedded counts.
    pub fn seed_update(post: &Post) -> InteractionUpdate {
        InteractionUpdate {
            is_liked: Some(post.viewer.like.is_some()),
            like_count: Some(post.like_count),
            like_uri: Some(post.viewer.like.clone()),
            is_reposted: Some(post.viewer.repost.is_some()),
            repost_count: Some(post.repost_count),
            repost_uri: Some(post.viewer.repost.clone()),
            comment_count: Some(post.reply_count),
            has_commented: Some(false),
            is_initialized: Some(true),
            ..Default::default()
        }
    }

    /// Overwrites exactly the fields present in `update`.
    pub fn merge(&mut self, update: InteractionUpdate) {
        if let Some(v) = update.is_liked {
            self.is_liked = v;
        }
        if let Some(v) = update.like_count {
            self.like_count = v;
        }
        if let Some(v) = update.like_uri {
            self.like_uri = v;
        }
        if let Some(v) = update.is_reposted {
            self.is_reposted = v;
        }
        if let Some(v) = update.repost_count {
            self.repost_count = v;
        }
        if let Some(v) = update.repost_uri {
            self.repost_uri = v;
        }
        if let Some(v) = update.comment_count {
            self.comment_count = v;
        }
        if let Some(v) = update.has_commented {
            self.has_commented = v;
        }
        if let Some(v) = update.is_initialized {
            self.is_initialized = v;
        }
        if let Some(v) = update.like_status {
            self.like_status = v;
        }
        if let Some(v) = update.repost_status {
            self.repost_status = v;
        }
    }
}

/// A partial `Interaction`. `None` leaves a field alone; for the handle
/// fields `Some(None)` clears the handle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InteractionUpdate {
    pub is_liked: Option<bool>,
    pub like_count: Option<u32>,
    pub like_uri: Option<Option<String>>,
    pub is_reposted: Option<bool>,
    pub repost_count: Option<u32>,
    pub repost_uri: Option<Option<String>>,
    pub comment_count: Option<u32>,
    pub has_commented: Option<bool>,
    pub is_initialized: Option<bool>,
    pub like_status: Option<MutationStatus>,
    pub repost_status: Option<MutationStatus>,
}

/// Per-post comment box UI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CommentBox {
    pub visible: bool,
    /// A comment was posted from this box since it was last opened.
    pub posted: bool,
}
