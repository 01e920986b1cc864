//! # Thread Assembler
//!
//! Loads one post's thread, keeps its ancestor chain, and holds the reply
//! tree in an arena keyed by post uri. Replies are sorted by likes at every
//! level and carry their nesting depth. A paced background sweep fetches
//! nested replies a few levels further; deeper nodes expand on demand.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use osky_core::{AppError, Post, ProtocolClient, Result, ThreadConfig, ThreadView, ThreadViewPost};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sorts thread nodes by descending like count. The sort is stable, so
/// equally liked replies keep their upstream order.
pub fn sort_replies_by_likes(mut replies: Vec<ThreadViewPost>) -> Vec<ThreadViewPost> {
    replies.sort_by(|a, b| b.post.like_count.cmp(&a.post.like_count));
    replies
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadNode {
    pub post: Post,
    /// 0 for direct replies to the thread root.
    pub depth: u32,
    /// Parent reply; `None` when the parent is the thread root.
    pub parent: Option<String>,
    /// Child uris, most liked first.
    pub replies: Vec<String>,
}

/// Reply tree stored flat: nodes by uri, children as uri lists.
#[derive(Debug, Clone, Default)]
pub struct ThreadTree {
    roots: Vec<String>,
    nodes: HashMap<String, ThreadNode>,
}

impl ThreadTree {
    /// Builds the tree under the thread root from its upstream replies.
    pub fn from_replies(replies: Vec<ThreadView>) -> Self {
        let mut tree = Self::default();
        tree.roots = tree.insert_children(None, 0, replies);
        tree
    }

    fn insert_children(&mut self, parent: Option<&str>, depth: u32, replies: Vec<ThreadView>) -> Vec<String> {
        let replies = sort_replies_by_likes(replies.into_iter().filter_map(ThreadView::into_node).collect());
        let mut ids = Vec::with_capacity(replies.len());

        for reply in replies {
            let uri = reply.post.uri.clone();
            if self.nodes.contains_key(&uri) {
                continue;
            }
            self.nodes.insert(
                uri.clone(),
                ThreadNode {
                    post: reply.post,
                    depth,
                    parent: parent.map(str::to_owned),
                    replies: Vec::new(),
                },
            );
            let children = self.insert_children(Some(&uri), depth + 1, reply.replies);
            if let Some(node) = self.nodes.get_mut(&uri) {
                node.replies = children;
            }
            ids.push(uri);
        }
        ids
    }

    /// Replaces the children of `uri` with freshly fetched replies.
    /// The old descendants leave the arena; the new ones get depths
    /// relative to `uri`. Returns `false` if `uri` is not in the tree.
    pub fn replace_replies(&mut self, uri: &str, replies: Vec<ThreadView>) -> bool {
        let Some(node) = self.nodes.get_mut(uri) else {
            return false;
        };
        let depth = node.depth;
        let old = std::mem::take(&mut node.replies);
        for child in old {
            self.remove_subtree(&child);
        }

        let children = self.insert_children(Some(uri), depth + 1, replies);
        if let Some(node) = self.nodes.get_mut(uri) {
            node.replies = children;
        }
        true
    }

    fn remove_subtree(&mut self, uri: &str) {
        if let Some(node) = self.nodes.remove(uri) {
            for child in node.replies {
                self.remove_subtree(&child);
            }
        }
    }

    /// Direct replies to the thread root, most liked first.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn get(&self, uri: &str) -> Option<&ThreadNode> {
        self.nodes.get(uri)
    }

    pub fn children(&self, uri: &str) -> &[String] {
        self.nodes.get(uri).map(|node| node.replies.as_slice()).unwrap_or_default()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ThreadNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum ThreadPhase {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

/// How a background expansion sweep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    Completed { expanded: usize, failed: usize },
    /// A sweep for the same thread load is still running.
    AlreadyRunning,
    /// The view was torn down or a newer thread replaced this one.
    Cancelled,
    NotLoaded,
}

/// A reply as handed to the renderer, after collapse and reveal limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyView {
    pub post: Post,
    pub depth: u32,
    pub has_replies: bool,
    pub is_expanded: bool,
    pub is_collapsed: bool,
    pub replies: Vec<ReplyView>,
    /// Fetched children held back by the reveal limit.
    pub hidden_replies: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSnapshot {
    pub phase: ThreadPhase,
    /// Oldest ancestor first, the root's direct parent last.
    pub ancestors: Vec<Post>,
    pub root: Option<Post>,
    pub replies: Vec<ReplyView>,
    pub hidden_replies: usize,
}

#[derive(Debug, Default)]
struct ThreadState {
    /// Outcome of the last settled load.
    phase: ThreadPhase,
    root: Option<Post>,
    ancestors: Vec<Post>,
    tree: ThreadTree,
    expanded: HashSet<String>,
    collapsed: HashSet<String>,
    reveal_pages: usize,
    /// Bumped whenever a load result replaces the view; sweeps and
    /// expansions started under an older value discard their writes.
    generation: u64,
    /// Ticket of the newest `load_thread` call.
    requested: u64,
    /// Ticket of the newest load that settled (applied or cancelled).
    settled: u64,
}

impl ThreadState {
    fn current_phase(&self) -> ThreadPhase {
        if self.requested != self.settled {
            ThreadPhase::Loading
        } else {
            self.phase.clone()
        }
    }

    fn clear_thread(&mut self) {
        self.root = None;
        self.ancestors.clear();
        self.tree = ThreadTree::default();
        self.expanded.clear();
        self.collapsed.clear();
        self.reveal_pages = 1;
    }
}

/// Releases the sweep slot, unless a sweep for a newer load took it over.
struct SweepGuard<'a> {
    slot: &'a AtomicU64,
    generation: u64,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        let _ = self
            .slot
            .compare_exchange(self.generation, 0, Ordering::AcqRel, Ordering::Acquire);
    }
}

pub struct ThreadAssembler {
    client: Arc<dyn ProtocolClient>,
    config: ThreadConfig,
    state: Mutex<ThreadState>,
    /// Generation the running sweep belongs to; 0 when idle.
    sweeping: AtomicU64,
}

impl ThreadAssembler {
    pub fn new(client: Arc<dyn ProtocolClient>, config: ThreadConfig) -> Self {
        Self {
            client,
            config,
            state: Mutex::new(ThreadState::default()),
            sweeping: AtomicU64::new(0),
        }
    }

    /// Loads the thread rooted at `uri`, then starts the background
    /// expansion sweep on the runtime.
    pub async fn open_thread(
        self: &Arc<Self>,
        uri: &str,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<ExpandOutcome>> {
        self.load_thread(uri, &cancel).await?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.auto_expand(&cancel).await }))
    }

    /// Fetches the thread and rebuilds ancestors and reply tree wholesale.
    /// A failed load clears the previous thread; a cancelled or superseded
    /// one leaves the view as it was.
    pub async fn load_thread(&self, uri: &str, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let ticket = {
            let mut state = self.state.lock().await;
            state.requested += 1;
            state.requested
        };

        let fetched = self.client.get_post_thread(uri, self.config.initial_depth).await;

        let mut state = self.state.lock().await;
        if state.requested != ticket {
            debug!(%uri, "superseded by a newer load");
            return Err(AppError::Cancelled);
        }
        state.settled = ticket;
        if cancel.is_cancelled() {
            debug!(%uri, "thread view gone, discarding load");
            return Err(AppError::Cancelled);
        }
        state.generation += 1;
        state.clear_thread();

        let thread = match fetched {
            Ok(view) => view.into_node().ok_or_else(|| format!("post {uri} is unavailable")),
            Err(err) => Err(err.to_string()),
        };
        let thread = match thread {
            Ok(thread) => thread,
            Err(msg) => {
                error!(%uri, error = %msg, "failed to load thread");
                state.phase = ThreadPhase::Failed(msg.clone());
                return Err(AppError::ThreadLoad(msg));
            }
        };

        let ThreadViewPost { post, parent, replies } = thread;
        state.ancestors = collect_ancestors(parent);
        state.root = Some(post);
        state.tree = ThreadTree::from_replies(replies);
        state.phase = ThreadPhase::Loaded;
        info!(
            %uri,
            ancestors = state.ancestors.len(),
            replies = state.tree.len(),
            "thread loaded"
        );
        Ok(())
    }

    /// Background sweep: every reply that already has fetched children gets
    /// its own sub-thread fetched and merged, descending at most
    /// `auto_expand_levels` levels. Fetches are paced by `expand_delay`.
    /// Failed branches are skipped. One sweep runs per thread load; a
    /// newer load may start its own while the old one winds down.
    pub async fn auto_expand(&self, cancel: &CancellationToken) -> ExpandOutcome {
        let (generation, mut stack) = {
            let state = self.state.lock().await;
            if state.current_phase() != ThreadPhase::Loaded {
                return ExpandOutcome::NotLoaded;
            }
            let generation = state.generation;
            let claimed = self
                .sweeping
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |running| {
                    (running != generation).then_some(generation)
                });
            if claimed.is_err() {
                return ExpandOutcome::AlreadyRunning;
            }
            let stack: Vec<String> = state.tree.roots().iter().rev().cloned().collect();
            (generation, stack)
        };
        let _guard = SweepGuard {
            slot: &self.sweeping,
            generation,
        };

        let (mut expanded, mut failed) = (0usize, 0usize);

        while let Some(uri) = stack.pop() {
            let eligible = {
                let state = self.state.lock().await;
                if state.generation != generation {
                    return ExpandOutcome::Cancelled;
                }
                state
                    .tree
                    .get(&uri)
                    .is_some_and(|node| !node.replies.is_empty() && node.depth < self.config.auto_expand_levels)
            };
            if !eligible {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => return ExpandOutcome::Cancelled,
                _ = tokio::time::sleep(self.config.expand_delay()) => {}
            }
            if self.state.lock().await.generation != generation {
                return ExpandOutcome::Cancelled;
            }

            let fetched = self.client.get_post_thread(&uri, self.config.initial_depth).await;
            if cancel.is_cancelled() {
                return ExpandOutcome::Cancelled;
            }

            let node = match fetched {
                Ok(view) => match view.into_node() {
                    Some(node) => node,
                    None => {
                        warn!(%uri, "reply unavailable, skipping branch");
                        failed += 1;
                        continue;
                    }
                },
                Err(err) => {
                    warn!(%uri, error = %err, "failed to auto-expand replies");
                    failed += 1;
                    continue;
                }
            };

            let mut state = self.state.lock().await;
            if state.generation != generation {
                return ExpandOutcome::Cancelled;
            }
            if state.tree.replace_replies(&uri, node.replies) {
                state.expanded.insert(uri.clone());
                expanded += 1;
                stack.extend(state.tree.children(&uri).iter().rev().cloned());
            }
        }

        debug!(expanded, failed, "auto-expand sweep finished");
        ExpandOutcome::Completed { expanded, failed }
    }

    /// Fetches one reply's children on demand and splices them in.
    pub async fn handle_expand_replies(&self, uri: &str, cancel: &CancellationToken) -> Result<()> {
        let generation = {
            let state = self.state.lock().await;
            if state.tree.get(uri).is_none() {
                return Err(AppError::ExpandReplies(format!("{uri} is not part of this thread")));
            }
            state.generation
        };

        let fetched = self.client.get_post_thread(uri, self.config.initial_depth).await;
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let node = match fetched {
            Ok(view) => view
                .into_node()
                .ok_or_else(|| AppError::ExpandReplies(format!("post {uri} is unavailable"))),
            Err(err) => Err(AppError::ExpandReplies(err.to_string())),
        }
        .inspect_err(|err| warn!(%uri, error = %err, "failed to load more replies"))?;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            return Err(AppError::Cancelled);
        }
        state.tree.replace_replies(uri, node.replies);
        state.expanded.insert(uri.to_string());
        Ok(())
    }

    /// Shows or hides an already fetched subtree. Returns whether the
    /// subtree is visible afterwards.
    pub async fn toggle_replies(&self, uri: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.collapsed.remove(uri) {
            true
        } else {
            state.collapsed.insert(uri.to_string());
            false
        }
    }

    /// The single expand control of a reply row: a collapsed subtree is
    /// shown again, a never-fetched one is fetched, anything else collapses.
    pub async fn activate_replies(&self, uri: &str, cancel: &CancellationToken) -> Result<bool> {
        let (collapsed, expanded) = {
            let state = self.state.lock().await;
            (state.collapsed.contains(uri), state.expanded.contains(uri))
        };

        if collapsed {
            Ok(self.toggle_replies(uri).await)
        } else if !expanded {
            self.handle_expand_replies(uri, cancel).await?;
            Ok(true)
        } else {
            Ok(self.toggle_replies(uri).await)
        }
    }

    /// Makes a reply's subtree visible: un-collapses it, and fetches it
    /// when it was never fetched. Never hides anything.
    pub async fn show_replies(&self, uri: &str, cancel: &CancellationToken) -> Result<()> {
        let expanded = {
            let mut state = self.state.lock().await;
            state.collapsed.remove(uri);
            state.expanded.contains(uri)
        };
        if expanded {
            Ok(())
        } else {
            self.handle_expand_replies(uri, cancel).await
        }
    }

    /// Reveals one more page of already fetched replies at every level.
    /// Returns the new per-level limit.
    pub async fn load_more_replies(&self) -> usize {
        let mut state = self.state.lock().await;
        state.reveal_pages += 1;
        state.reveal_pages * self.config.replies_per_page
    }

    pub async fn phase(&self) -> ThreadPhase {
        self.state.lock().await.current_phase()
    }

    pub async fn tree(&self) -> ThreadTree {
        self.state.lock().await.tree.clone()
    }

    pub async fn is_expanded(&self, uri: &str) -> bool {
        self.state.lock().await.expanded.contains(uri)
    }

    pub async fn is_collapsed(&self, uri: &str) -> bool {
        self.state.lock().await.collapsed.contains(uri)
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Acquire) != 0
    }

    pub async fn snapshot(&self) -> ThreadSnapshot {
        let state = self.state.lock().await;
        let limit = state.reveal_pages.max(1) * self.config.replies_per_page;
        let (replies, hidden_replies) = build_views(&state, state.tree.roots(), limit);

        ThreadSnapshot {
            phase: state.current_phase(),
            ancestors: state.ancestors.clone(),
            root: state.root.clone(),
            replies,
            hidden_replies,
        }
    }
}

/// Parent chain of a thread node, oldest first.
fn collect_ancestors(parent: Option<Box<ThreadView>>) -> Vec<Post> {
    let mut ancestors = Vec::new();
    let mut next = parent;
    while let Some(view) = next {
        let Some(node) = view.into_node() else {
            break;
        };
        ancestors.push(node.post);
        next = node.parent;
    }
    ancestors.reverse();
    ancestors
}

fn build_views(state: &ThreadState, ids: &[String], limit: usize) -> (Vec<ReplyView>, usize) {
    let shown = ids.len().min(limit);
    let views = ids[..shown]
        .iter()
        .filter_map(|uri| state.tree.get(uri))
        .map(|node| {
            let is_collapsed = state.collapsed.contains(&node.post.uri);
            let (replies, hidden_replies) = if is_collapsed {
                (Vec::new(), 0)
            } else {
                build_views(state, &node.replies, limit)
            };
            ReplyView {
                post: node.post.clone(),
                depth: node.depth,
                has_replies: !node.replies.is_empty(),
                is_expanded: state.expanded.contains(&node.post.uri),
                is_collapsed,
                replies,
                hidden_replies,
            }
        })
        .collect();
    (views, ids.len() - shown)
}
