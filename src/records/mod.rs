//! Poll and reminder records.
//!
//! Defines the two record types held in the remote store, the
//! [`RecordKind`] discriminant used to route watch events, and the
//! `"<kind>-<id>"` key format shared by the codec, mirror and scheduler.

pub mod codec;
pub mod expiry;
pub mod poll;
pub mod reminder;

pub use poll::Poll;
pub use reminder::Reminder;

use std::time::{SystemTime, UNIX_EPOCH};

/// Kind of record stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Poll,
    Reminder,
}

impl RecordKind {
    /// Key prefix used in the remote store.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Reminder => "reminder",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Parsed store key: a record kind plus the record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub kind: RecordKind,
    pub id: String,
}

impl RecordKey {
    pub fn new(kind: RecordKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// Parse a `"<kind>-<id>"` store key.
    ///
    /// Returns `None` for keys that belong to neither record kind, or whose
    /// id part is empty.
    pub fn parse(key: &str) -> Option<Self> {
        let (prefix, id) = key.split_once('-')?;
        if id.is_empty() {
            return None;
        }
        let kind = match prefix {
            "poll" => RecordKind::Poll,
            "reminder" => RecordKind::Reminder,
            _ => return None,
        };
        Some(Self::new(kind, id))
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.kind.prefix(), self.id)
    }
}

/// A decoded record of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Poll(Poll),
    Reminder(Reminder),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Poll(_) => RecordKind::Poll,
            Self::Reminder(_) => RecordKind::Reminder,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Poll(poll) => &poll.id,
            Self::Reminder(reminder) => &reminder.id,
        }
    }

    pub fn author(&self) -> &str {
        match self {
            Self::Poll(poll) => &poll.author,
            Self::Reminder(reminder) => &reminder.author,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.kind(), self.id())
    }
}

/// Generate a short record id: the first group of a v4 UUID.
pub fn new_record_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    uuid[..8].to_owned()
}

/// Returns current UTC seconds since epoch.
pub fn now_epoch_secs() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}
