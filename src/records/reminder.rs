//! Reminder record.

use serde::{Deserialize, Serialize};

/// A reminder delivered verbatim to its channel at `expiry`.
///
/// `author` doubles as the access-control check for reads and deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub author: String,
    pub channel: String,
    /// Unix epoch seconds at which the message is delivered.
    pub expiry: i64,
    pub message: String,
    pub id: String,
}

impl Reminder {
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        channel: impl Into<String>,
        message: impl Into<String>,
        expiry: i64,
    ) -> Self {
        Self {
            author: author.into(),
            channel: channel.into(),
            expiry,
            message: message.into(),
            id: id.into(),
        }
    }

    /// Whether the reminder is due for delivery at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry <= now
    }

    pub fn is_owned_by(&self, author: &str) -> bool {
        self.author == author
    }
}
