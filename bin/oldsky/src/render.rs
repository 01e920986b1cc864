//! Old-forum text rendering: numbered link rows for feed pages, indented
//! comment trees for threads.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use osky_app::{InteractionStore, ReplyView, ThreadSnapshot};
use osky_core::post::{post_kinds, post_url};
use osky_core::richtext::{segments, Segment};
use osky_core::{FeedItem, FeedPage, Interaction, Post, Profile};

const TITLE_WIDTH: usize = 120;

pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    let (n, unit) = match secs {
        0..=59 => return "just now".to_string(),
        60..=3_599 => (secs / 60, "minute"),
        3_600..=86_399 => (secs / 3_600, "hour"),
        86_400..=2_591_999 => (secs / 86_400, "day"),
        2_592_000..=31_535_999 => (secs / 2_592_000, "month"),
        _ => (secs / 31_536_000, "year"),
    };
    let plural = if n == 1 { "" } else { "s" };
    format!("{n} {unit}{plural} ago")
}

/// One-line account header: name, handle and counts.
pub fn render_header(profile: &Profile) -> String {
    let handle = format!("@{}", profile.handle);
    let name = profile
        .display_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .map(|name| format!("{name} ({handle})"))
        .unwrap_or(handle);
    format!(
        "{name} | {} followers | {} following | {} posts",
        profile.followers_count, profile.follows_count, profile.posts_count
    )
}

/// Post text with facets resolved; links whose text differs from the
/// target get the target appended.
pub fn render_text(post: &Post) -> String {
    let mut out = String::new();
    for segment in segments(&post.record.text, &post.record.facets) {
        match segment {
            Segment::Text(text) | Segment::Mention { text, .. } => out.push_str(text),
            Segment::Link { text, uri } if text == uri => out.push_str(text),
            Segment::Link { text, uri } => {
                let _ = write!(out, "{text} <{uri}>");
            }
        }
    }
    out
}

fn title(post: &Post) -> String {
    let first = post.record.text.lines().find(|l| !l.trim().is_empty()).unwrap_or("[no text]");
    if first.chars().count() > TITLE_WIDTH {
        let cut: String = first.chars().take(TITLE_WIDTH).collect();
        format!("{}...", cut.trim_end())
    } else {
        first.to_string()
    }
}

fn tally(state: &Interaction) -> String {
    let like = if state.is_liked { "liked" } else { "like" };
    let repost = if state.is_reposted { "reposted" } else { "repost" };
    format!(
        "{} comments | {like} ({}) | {repost} ({})",
        state.comment_count, state.like_count, state.repost_count
    )
}

fn row(out: &mut String, rank: usize, item: &FeedItem, state: &Interaction, now: DateTime<Utc>) {
    let post = &item.post;
    let flair: String = post_kinds(item).iter().map(|k| format!(" [{}]", k.label())).collect();
    let _ = writeln!(out, "{rank:>3}. {}{flair}", title(post));
    let _ = writeln!(
        out,
        "     submitted {} by {}",
        relative_time(post.created_at(), now),
        post.author.name()
    );
    let _ = writeln!(out, "     {} | {}", tally(state), post_url(post));
}

/// Renders one feed page; rows are numbered across pages.
pub fn render_page(page: &FeedPage, page_number: u32, page_size: usize, store: &InteractionStore, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let offset = (page_number.max(1) as usize - 1) * page_size;
    for (i, item) in page.posts.iter().enumerate() {
        let state = store.seed(&item.post);
        row(&mut out, offset + i + 1, item, &state, now);
    }
    if page.posts.is_empty() {
        out.push_str("     there doesn't seem to be anything here\n");
    }
    if page.cursor.is_some() {
        let _ = writeln!(out, "\n     next page: {}", page_number + 1);
    }
    out
}

fn reply(out: &mut String, view: &ReplyView, store: &InteractionStore, now: DateTime<Utc>) {
    let pad = "    ".repeat(view.depth as usize + 1);
    let marker = if view.is_collapsed { "[+]" } else { "[-]" };
    let state = store.seed(&view.post);
    let _ = writeln!(
        out,
        "{pad}{marker} {} {} points {}",
        view.post.author.name(),
        state.like_count,
        relative_time(view.post.created_at(), now)
    );
    for line in render_text(&view.post).lines() {
        let _ = writeln!(out, "{pad}    {line}");
    }
    if view.is_collapsed {
        return;
    }
    for child in &view.replies {
        reply(out, child, store, now);
    }
    if view.hidden_replies > 0 {
        let _ = writeln!(out, "{pad}    load more replies ({} hidden)", view.hidden_replies);
    } else if view.has_replies && view.replies.is_empty() {
        let _ = writeln!(out, "{pad}    continue this thread ->");
    }
}

pub fn render_thread(snapshot: &ThreadSnapshot, store: &InteractionStore, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let Some(root) = &snapshot.root else {
        return out;
    };

    for ancestor in &snapshot.ancestors {
        let _ = writeln!(out, "  ^ {}: {}", ancestor.author.name(), title(ancestor));
    }
    let _ = writeln!(out, "{}", title(root));
    let _ = writeln!(
        out,
        "submitted {} by {}",
        relative_time(root.created_at(), now),
        root.author.name()
    );
    let _ = writeln!(out, "\n{}\n", render_text(root));
    let _ = writeln!(out, "{}", tally(&store.seed(root)));
    out.push('\n');

    for view in &snapshot.replies {
        reply(&mut out, view, store, now);
    }
    if snapshot.hidden_replies > 0 {
        let _ = writeln!(out, "load more comments ({} hidden)", snapshot.hidden_replies);
    }
    out
}
