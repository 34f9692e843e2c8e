//! Error types for the poll and reminder core.

/// Top-level error type for the mirror, scheduler and command API.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// The record does not exist, or the caller is not allowed to see it.
    #[error("not found: {0}")]
    NotFound(String),

    /// A vote referenced a choice index outside the poll's choices.
    #[error("invalid choice {choice} (poll has {available} choices)")]
    InvalidChoice {
        /// Requested zero-based choice index.
        choice: usize,
        /// Number of choices on the poll.
        available: usize,
    },

    /// An expiry duration could not be parsed.
    #[error("invalid expiry: {0}")]
    InvalidExpiry(String),

    /// Stored payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Remote store call failed.
    #[error("store write failed: {0}")]
    Store(String),

    /// Message delivery to a chat channel failed.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BotError>;
