//! # osky-app
//!
//! The client-side orchestration layer: feed pagination, thread assembly
//! and the shared per-post interaction store, wired together per session.

pub mod auth;
pub mod context;
pub mod feed;
pub mod interactions;
pub mod thread;

pub use auth::Auth;
pub use context::AppContext;
pub use feed::FeedPaginator;
pub use interactions::{InteractionStore, Reaction};
pub use thread::{ExpandOutcome, ReplyView, ThreadAssembler, ThreadNode, ThreadPhase, ThreadSnapshot, ThreadTree};
