//! Post helpers: web URLs and the content "flair" shown next to a title
//! (quote, image, video, link, ...).

use serde::Serialize;

use crate::models::{FacetFeature, FeedItem, Post};

const WEB_BASE: &str = "https://bsky.app";

/// Last path segment of an at-uri (the record key).
pub fn rkey(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

pub fn profile_url(handle: &str) -> String {
    format!("{WEB_BASE}/profile/{handle}")
}

pub fn post_url(post: &Post) -> String {
    format!("{}/post/{}", profile_url(&post.author.handle), rkey(&post.uri))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "url", rename_all = "lowercase")]
pub enum PostKind {
    Quote(String),
    Image(String),
    Video(String),
    Link(String),
    Youtube(String),
    Spotify(String),
    Embed(String),
}

impl PostKind {
    pub fn label(&self) -> &'static str {
        match self {
            PostKind::Quote(_) => "quote",
            PostKind::Image(_) => "image",
            PostKind::Video(_) => "video",
            PostKind::Link(_) => "link",
            PostKind::Youtube(_) => "youtube",
            PostKind::Spotify(_) => "spotify",
            PostKind::Embed(_) => "embed",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            PostKind::Quote(url)
            | PostKind::Image(url)
            | PostKind::Video(url)
            | PostKind::Link(url)
            | PostKind::Youtube(url)
            | PostKind::Spotify(url)
            | PostKind::Embed(url) => url,
        }
    }
}

/// Classifies what a post carries, in display order.
pub fn post_kinds(item: &FeedItem) -> Vec<PostKind> {
    let post = &item.post;
    let embed = post.record.embed.as_ref();
    let embed_type = embed
        .and_then(|e| e.get("$type"))
        .and_then(|t| t.as_str())
        .unwrap_or_default();

    let mut kinds = Vec::new();

    if embed_type == "app.bsky.embed.record" {
        let quoted_uri = embed
            .and_then(|e| e.pointer("/record/uri"))
            .and_then(|u| u.as_str());
        let quoted_author = post
            .embed
            .as_ref()
            .and_then(|e| e.pointer("/record/author/handle"))
            .and_then(|h| h.as_str());
        if let (Some(uri), Some(handle)) = (quoted_uri, quoted_author) {
            kinds.push(PostKind::Quote(format!("{}/post/{}", profile_url(handle), rkey(uri))));
        }
    }

    if embed_type == "app.bsky.embed.images" {
        kinds.push(PostKind::Image(post_url(post)));
    }

    if embed_type == "app.bsky.embed.video" {
        kinds.push(PostKind::Video(post_url(post)));
    }

    let link = post
        .record
        .facets
        .iter()
        .flat_map(|facet| facet.features.iter())
        .find_map(|feature| match feature {
            FacetFeature::Link { uri } => Some(uri.clone()),
            _ => None,
        });
    if let Some(uri) = link {
        kinds.push(PostKind::Link(uri));
    }

    if embed_type == "app.bsky.embed.external" {
        let external = embed
            .and_then(|e| e.pointer("/external/uri"))
            .and_then(|u| u.as_str())
            .filter(|u| !u.is_empty());
        if let Some(uri) = external {
            let lower = uri.to_ascii_lowercase();
            let kind = if lower.contains("youtube.com") || lower.contains("youtu.be") {
                PostKind::Youtube(uri.to_string())
            } else if lower.contains("spotify.com") {
                PostKind::Spotify(uri.to_string())
            } else {
                PostKind::Embed(uri.to_string())
            };
            kinds.push(kind);
        }
    }

    kinds
}
