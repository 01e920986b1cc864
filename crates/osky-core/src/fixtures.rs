//! Builders for posts and thread views, shared by the test suites of the
//! crates that depend on `osky-core` (enable the `testing` feature).

use chrono::Utc;

use crate::models::{
    Author, FeedBatch, FeedItem, Post, PostRecord, Profile, ReplyRef, StrongRef, ThreadView,
    ThreadViewPost, ViewerState,
};

pub fn author(handle: &str) -> Author {
    Author {
        did: format!("did:plc:{}", handle.replace('.', "-")),
        handle: handle.to_string(),
        display_name: None,
        avatar: None,
    }
}

/// A top-level post whose cid is derived from its uri.
pub fn post(uri: &str) -> Post {
    Post {
        uri: uri.to_string(),
        cid: format!("cid-{uri}"),
        author: author("tester.test"),
        record: PostRecord {
            text: format!("post {uri}"),
            created_at: Some(Utc::now()),
            reply: None,
            facets: vec![],
            embed: None,
        },
        embed: None,
        like_count: 0,
        repost_count: 0,
        reply_count: 0,
        indexed_at: Utc::now(),
        viewer: ViewerState::default(),
    }
}

/// A reply to `parent`. The root ref points at the parent too; nothing in
/// oldsky reads `root` when walking ancestors.
pub fn reply(uri: &str, parent: &str) -> Post {
    let mut post = post(uri);
    let parent_ref = StrongRef {
        uri: parent.to_string(),
        cid: format!("cid-{parent}"),
    };
    post.record.reply = Some(ReplyRef {
        root: parent_ref.clone(),
        parent: parent_ref,
    });
    post
}

pub fn with_likes(mut post: Post, likes: u32) -> Post {
    post.like_count = likes;
    post
}

pub fn item(post: Post) -> FeedItem {
    FeedItem::new(post)
}

pub fn batch(posts: Vec<Post>, cursor: Option<&str>) -> FeedBatch {
    FeedBatch {
        feed: posts.into_iter().map(FeedItem::new).collect(),
        cursor: cursor.map(str::to_string),
    }
}

/// A `threadViewPost` node with the given replies and no parent.
pub fn node(post: Post, replies: Vec<ThreadView>) -> ThreadView {
    ThreadView::Node(ThreadViewPost {
        post,
        parent: None,
        replies,
    })
}

/// A `threadViewPost` node hanging below `parent`.
pub fn node_with_parent(post: Post, parent: ThreadView, replies: Vec<ThreadView>) -> ThreadView {
    ThreadView::Node(ThreadViewPost {
        post,
        parent: Some(Box::new(parent)),
        replies,
    })
}

pub fn profile(handle: &str) -> Profile {
    let author = author(handle);
    Profile {
        did: author.did,
        handle: author.handle,
        display_name: None,
        description: None,
        avatar: None,
        followers_count: 0,
        follows_count: 0,
        posts_count: 0,
    }
}
