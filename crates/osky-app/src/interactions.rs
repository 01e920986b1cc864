//! # Post Interaction Store
//!
//! Single source of truth for like/repost/comment state per post uri,
//! shared by every view that renders the same post. Mutations go upstream
//! first; counts change only once the protocol client confirms.

use std::sync::Arc;

use dashmap::DashMap;
use osky_core::richtext::detect_facets;
use osky_core::{
    AppError, CommentBox, Interaction, InteractionUpdate, MutationStatus, NewPost, Post, ProtocolClient,
    ReplyRef, Result,
};
use tracing::{debug, info, warn};

/// The two toggleable reactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Like,
    Repost,
}

impl Reaction {
    fn status(self, interaction: &Interaction) -> MutationStatus {
        match self {
            Reaction::Like => interaction.like_status,
            Reaction::Repost => interaction.repost_status,
        }
    }

    fn set_status(self, interaction: &mut Interaction, status: MutationStatus) {
        match self {
            Reaction::Like => interaction.like_status = status,
            Reaction::Repost => interaction.repost_status = status,
        }
    }

    /// (active, handle)
    fn current(self, interaction: &Interaction) -> (bool, Option<String>) {
        match self {
            Reaction::Like => (interaction.is_liked, interaction.like_uri.clone()),
            Reaction::Repost => (interaction.is_reposted, interaction.repost_uri.clone()),
        }
    }

    fn confirmed(self, interaction: &Interaction, active: bool, handle: Option<String>) -> InteractionUpdate {
        let bump = |count: u32| if active { count.saturating_add(1) } else { count.saturating_sub(1) };
        match self {
            Reaction::Like => InteractionUpdate {
                is_liked: Some(active),
                like_count: Some(bump(interaction.like_count)),
                like_uri: Some(handle),
                like_status: Some(MutationStatus::Confirmed),
                is_initialized: Some(true),
                ..Default::default()
            },
            Reaction::Repost => InteractionUpdate {
                is_reposted: Some(active),
                repost_count: Some(bump(interaction.repost_count)),
                repost_uri: Some(handle),
                repost_status: Some(MutationStatus::Confirmed),
                is_initialized: Some(true),
                ..Default::default()
            },
        }
    }
}

/// Held across the upstream call of a toggle. If the toggle future is
/// dropped before the call returns, the reaction is marked `RolledBack` so
/// the next toggle is not refused as in flight.
struct InFlight<'a> {
    interactions: &'a DashMap<String, Interaction>,
    uri: &'a str,
    reaction: Reaction,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(mut entry) = self.interactions.get_mut(self.uri) {
            if self.reaction.status(&entry) == MutationStatus::Unconfirmed {
                warn!(uri = %self.uri, reaction = ?self.reaction, "reaction abandoned mid-flight");
                self.reaction.set_status(&mut entry, MutationStatus::RolledBack);
            }
        }
    }
}

pub struct InteractionStore {
    client: Arc<dyn ProtocolClient>,
    interactions: DashMap<String, Interaction>,
    comment_boxes: DashMap<String, CommentBox>,
}

impl InteractionStore {
    pub fn new(client: Arc<dyn ProtocolClient>) -> Self {
        Self {
            client,
            interactions: DashMap::new(),
            comment_boxes: DashMap::new(),
        }
    }

    /// Current state, or the zero default for a post never seen.
    pub fn get(&self, uri: &str) -> Interaction {
        self.interactions
            .get(uri)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Merges `update` into the entry for `uri`, creating it if needed.
    pub fn update(&self, uri: &str, update: InteractionUpdate) -> Interaction {
        let mut entry = self.interactions.entry(uri.to_string()).or_default();
        entry.merge(update);
        entry.value().clone()
    }

    /// Seeds the entry from the post's embedded counts, once per uri.
    /// Later renders with stale counts leave local state alone.
    pub fn seed(&self, post: &Post) -> Interaction {
        let mut entry = self.interactions.entry(post.uri.clone()).or_default();
        if !entry.is_initialized {
            entry.merge(Interaction::seed_update(post));
        }
        entry.value().clone()
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    pub async fn toggle_like(&self, post: &Post) -> Interaction {
        self.toggle(post, Reaction::Like).await
    }

    pub async fn toggle_repost(&self, post: &Post) -> Interaction {
        self.toggle(post, Reaction::Repost).await
    }

    /// Flips a reaction: marks it `Unconfirmed`, calls upstream, then
    /// applies the change (`Confirmed`) or leaves counts as they were
    /// (`RolledBack`). Ignored while the same reaction is in flight; a
    /// toggle dropped mid-call counts as rolled back.
    pub async fn toggle(&self, post: &Post, reaction: Reaction) -> Interaction {
        let (active, handle) = {
            let mut entry = self.interactions.entry(post.uri.clone()).or_default();
            if !entry.is_initialized {
                entry.merge(Interaction::seed_update(post));
            }
            if reaction.status(&entry) == MutationStatus::Unconfirmed {
                debug!(uri = %post.uri, ?reaction, "reaction already in flight");
                return entry.value().clone();
            }
            let (active, handle) = reaction.current(&entry);
            if active && handle.is_none() {
                // Nothing to retract with.
                return entry.value().clone();
            }
            reaction.set_status(&mut entry, MutationStatus::Unconfirmed);
            (active, handle)
        };
        let in_flight = InFlight {
            interactions: &self.interactions,
            uri: &post.uri,
            reaction,
            settled: false,
        };

        let result = match (reaction, handle) {
            (Reaction::Like, Some(like_uri)) if active => self.client.delete_like(&like_uri).await.map(|_| None),
            (Reaction::Repost, Some(repost_uri)) if active => {
                self.client.delete_repost(&repost_uri).await.map(|_| None)
            }
            (Reaction::Like, _) => self.client.like(post.strong_ref()).await.map(Some),
            (Reaction::Repost, _) => self.client.repost(post.strong_ref()).await.map(Some),
        };
        in_flight.settle();

        let mut entry = self.interactions.entry(post.uri.clone()).or_default();
        match result {
            Ok(handle) => {
                let update = reaction.confirmed(&entry, !active, handle);
                entry.merge(update);
                info!(uri = %post.uri, ?reaction, active = !active, "reaction confirmed");
            }
            Err(err) => {
                warn!(uri = %post.uri, ?reaction, error = %err, "reaction rejected");
                reaction.set_status(&mut entry, MutationStatus::RolledBack);
            }
        }
        entry.value().clone()
    }

    pub fn comment_box(&self, uri: &str) -> CommentBox {
        self.comment_boxes.get(uri).map(|entry| *entry.value()).unwrap_or_default()
    }

    /// Opens or closes the comment box; opening forgets a previous post.
    pub fn toggle_comment_box(&self, uri: &str) -> CommentBox {
        let mut entry = self.comment_boxes.entry(uri.to_string()).or_default();
        entry.visible = !entry.visible;
        if entry.visible {
            entry.posted = false;
        }
        *entry.value()
    }

    /// Posts `text` as a reply to `post` and counts it.
    pub async fn post_comment(&self, post: &Post, text: &str) -> Result<Interaction> {
        if text.trim().is_empty() {
            return Err(AppError::Validation("comment is empty".to_string()));
        }
        self.seed(post);

        let root = post
            .record
            .reply
            .as_ref()
            .map(|reply| reply.root.clone())
            .filter(|root| !root.uri.is_empty())
            .unwrap_or_else(|| post.strong_ref());
        let new_post = NewPost {
            text: text.to_string(),
            reply: Some(ReplyRef {
                root,
                parent: post.strong_ref(),
            }),
            facets: detect_facets(self.client.as_ref(), text).await,
        };

        if let Err(err) = self.client.create_post(new_post).await {
            warn!(uri = %post.uri, error = %err, "failed to post comment");
            return Err(AppError::Mutation(err.to_string()));
        }

        self.comment_boxes.insert(
            post.uri.clone(),
            CommentBox {
                visible: false,
                posted: true,
            },
        );

        let mut entry = self.interactions.entry(post.uri.clone()).or_default();
        let comment_count = entry.comment_count.saturating_add(1);
        entry.merge(InteractionUpdate {
            comment_count: Some(comment_count),
            has_commented: Some(true),
            is_initialized: Some(true),
            ..Default::default()
        });
        info!(uri = %post.uri, "comment posted");
        Ok(entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osky_core::fixtures::{post, reply};
    use osky_core::{MockProtocolClient, StrongRef};

    fn liked(mut post: Post, handle: &str) -> Post {
        post.viewer.like = Some(handle.to_string());
        post
    }

    #[test]
    fn test_get_defaults_and_update_merges() {
        let store = InteractionStore::new(Arc::new(MockProtocolClient::new()));
        assert_eq!(store.get("p"), Interaction::default());

        store.update("p", InteractionUpdate { like_count: Some(7), ..Default::default() });
        let after = store.update("p", InteractionUpdate { is_reposted: Some(true), ..Default::default() });

        assert_eq!(after.like_count, 7);
        assert!(after.is_reposted);
        assert!(!after.is_initialized);
    }

    #[test]
    fn test_seed_happens_once() {
        let store = InteractionStore::new(Arc::new(MockProtocolClient::new()));
        let mut p = liked(post("p"), "at://like/1");
        p.like_count = 3;
        p.reply_count = 2;

        let seeded = store.seed(&p);
        assert!(seeded.is_initialized && seeded.is_liked);
        assert_eq!((seeded.like_count, seeded.comment_count), (3, 2));

        store.update("p", InteractionUpdate { like_count: Some(10), ..Default::default() });
        // A stale re-render must not clobber the local value.
        assert_eq!(store.seed(&p).like_count, 10);
    }

    #[tokio::test]
    async fn test_failed_like_rolls_back() {
        let mut client = MockProtocolClient::new();
        client
            .expect_like()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("401")));

        let store = InteractionStore::new(Arc::new(client));
        let mut p = post("p");
        p.like_count = 3;

        let after = store.toggle_like(&p).await;

        assert!(!after.is_liked);
        assert_eq!(after.like_count, 3);
        assert_eq!(after.like_status, MutationStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_abandoned_toggle_does_not_jam_the_next_one() {
        let mut client = MockProtocolClient::new();
        client
            .expect_like()
            .times(1)
            .returning(|_| Ok("at://like/1".to_string()));

        let store = InteractionStore::new(Arc::new(client));
        let p = post("p");
        store.seed(&p);
        store.update("p", InteractionUpdate { like_status: Some(MutationStatus::Unconfirmed), ..Default::default() });

        // What a toggle leaves behind when its future is dropped mid-call.
        drop(InFlight {
            interactions: &store.interactions,
            uri: "p",
            reaction: Reaction::Like,
            settled: false,
        });
        assert_eq!(store.get("p").like_status, MutationStatus::RolledBack);

        let after = store.toggle_like(&p).await;
        assert!(after.is_liked);
        assert_eq!(after.like_status, MutationStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_unlike_without_handle_is_noop() {
        let store = InteractionStore::new(Arc::new(MockProtocolClient::new()));
        let p = post("p");
        store.update("p", InteractionUpdate { is_liked: Some(true), is_initialized: Some(true), ..Default::default() });

        let after = store.toggle_like(&p).await;
        assert!(after.is_liked);
        assert_eq!(after.like_status, MutationStatus::Idle);
    }

    #[tokio::test]
    async fn test_repost_and_undo() {
        let mut client = MockProtocolClient::new();
        client
            .expect_repost()
            .withf(|subject| subject.uri == "p")
            .times(1)
            .returning(|_| Ok("at://repost/1".to_string()));
        client
            .expect_delete_repost()
            .withf(|uri| uri == "at://repost/1")
            .times(1)
            .returning(|_| Ok(()));

        let store = InteractionStore::new(Arc::new(client));
        let p = post("p");

        let on = store.toggle_repost(&p).await;
        assert!(on.is_reposted);
        assert_eq!((on.repost_count, on.repost_uri.as_deref()), (1, Some("at://repost/1")));

        let off = store.toggle_repost(&p).await;
        assert!(!off.is_reposted);
        assert_eq!((off.repost_count, off.repost_uri), (0, None));
        assert_eq!(off.repost_status, MutationStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_comment_replies_into_the_thread_root() {
        let mut client = MockProtocolClient::new();
        client
            .expect_create_post()
            .withf(|new_post| {
                let reply = new_post.reply.as_ref().expect("reply ref");
                reply.parent.uri == "child" && reply.root.uri == "top" && new_post.facets.is_empty()
            })
            .times(1)
            .returning(|_| Ok(StrongRef { uri: "at://c/1".into(), cid: "c".into() }));

        let store = InteractionStore::new(Arc::new(client));
        let mut p = reply("child", "top");
        p.reply_count = 4;

        assert!(store.toggle_comment_box("child").visible);
        let after = store.post_comment(&p, "nice thread").await.expect("comment posted");

        assert_eq!(after.comment_count, 5);
        assert!(after.has_commented);
        assert_eq!(store.comment_box("child"), CommentBox { visible: false, posted: true });
        // Reopening clears the posted marker.
        assert_eq!(store.toggle_comment_box("child"), CommentBox { visible: true, posted: false });
    }

    #[tokio::test]
    async fn test_blank_comment_is_rejected() {
        let store = InteractionStore::new(Arc::new(MockProtocolClient::new()));
        let err = store.post_comment(&post("p"), "   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
