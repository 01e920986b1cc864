//! # AppError
//!
//! Centralized error handling for oldsky.
//! Ports report failures as `anyhow::Error`; the orchestration layer turns
//! them into one of these typed, user-facing states.

use thiserror::Error;

/// The primary error type for all orchestration operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// An operation needed a session and there is none
    #[error("not signed in")]
    Unauthenticated,

    /// Login or session resume rejected
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Another load holds the loading gate
    #[error("a load is already in progress")]
    Busy,

    /// Page numbers start at 1 and must follow a cached page
    #[error("page {0} cannot be loaded")]
    InvalidPage(u32),

    /// The previous page carried no continuation cursor
    #[error("no more posts after page {0}")]
    FeedExhausted(u32),

    /// Retryable feed failure; cached pages are untouched
    #[error("failed to load posts: {0}")]
    FeedLoad(String),

    /// Retryable thread failure
    #[error("failed to load thread: {0}")]
    ThreadLoad(String),

    /// On-demand reply expansion failed
    #[error("failed to load replies: {0}")]
    ExpandReplies(String),

    /// The signed-in account's profile could not be fetched
    #[error("failed to load profile: {0}")]
    Profile(String),

    /// Like/repost/comment rejected upstream
    #[error("mutation failed: {0}")]
    Mutation(String),

    /// Input rejected before any network call (e.g. empty comment)
    #[error("validation error: {0}")]
    Validation(String),

    /// The owning view went away before the result could be applied
    #[error("operation cancelled")]
    Cancelled,

    /// Settings could not be loaded or are out of range
    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Whether re-invoking the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Busy
                | AppError::FeedLoad(_)
                | AppError::ThreadLoad(_)
                | AppError::ExpandReplies(_)
                | AppError::Profile(_)
                | AppError::Mutation(_)
        )
    }
}

/// A specialized Result type for oldsky logic.
pub type Result<T> = std::result::Result<T, AppError>;
