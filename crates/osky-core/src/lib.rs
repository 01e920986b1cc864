//! oldsky/crates/osky-core/src/lib.rs
//!
//! Domain models and port definitions for oldsky, a forum-style client
//! for the Bluesky social network.

pub mod config;
pub mod error;
pub mod models;
pub mod post;
pub mod richtext;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod fixtures;

// Re-exporting for easier access in other crates
pub use config::*;
pub use error::*;
pub use models::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::models::*;

    #[test]
    fn test_post_deserializes_from_lexicon_json() {
        let post: Post = serde_json::from_value(serde_json::json!({
            "uri": "at://did:plc:abc/app.bsky.feed.post/3k2a",
            "cid": "bafyreib",
            "author": { "did": "did:plc:abc", "handle": "alice.bsky.social" },
            "record": {
                "$type": "app.bsky.feed.post",
                "text": "Hello Rust!",
                "createdAt": "2024-05-01T12:00:00.000Z",
                "reply": {
                    "root": { "uri": "at://did:plc:xyz/app.bsky.feed.post/1", "cid": "c1" },
                    "parent": { "uri": "at://did:plc:xyz/app.bsky.feed.post/2", "cid": "c2" }
                }
            },
            "likeCount": 3,
            "indexedAt": "2024-05-01T12:00:01.000Z",
            "viewer": { "like": "at://did:plc:me/app.bsky.feed.like/9" }
        }))
        .unwrap();

        assert!(post.is_reply());
        assert_eq!(post.parent_uri(), Some("at://did:plc:xyz/app.bsky.feed.post/2"));
        assert_eq!(post.like_count, 3);
        assert_eq!(post.repost_count, 0);
        assert_eq!(post.author.display_name, None);
        assert!(post.viewer.like.is_some());
    }
}
