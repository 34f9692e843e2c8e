//! Record codec.
//!
//! A record is stored as a single JSON document under the [`PAYLOAD_FIELD`]
//! entry of a [`StoredObject`] named `"<kind>-<id>"`. Watch events are decoded
//! here into a [`MirrorUpdate`] carrying an explicit record kind, so the
//! mirror never has to guess what a payload contains.

use crate::error::{BotError, Result};
use crate::records::{Poll, Record, RecordKey, RecordKind, Reminder};
use crate::store::{StoredObject, WatchEvent, WatchEventKind};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// Data field holding the serialized record.
pub const PAYLOAD_FIELD: &str = "json";

/// Label carrying the record author.
pub const AUTHOR_LABEL: &str = "author";

/// Label carrying the owner a reminder was created for.
pub const OWNER_LABEL: &str = "owner";

/// Longest value the store accepts for a label.
const MAX_LABEL_LEN: usize = 63;

/// A decoded watch event, ready to apply to the mirror maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorUpdate {
    /// Insert or wholesale-replace the record.
    Upsert(Record),
    /// Remove the record with this key, if present.
    Remove(RecordKey),
}

pub fn encode_poll(poll: &Poll) -> Result<StoredObject> {
    let key = RecordKey::new(RecordKind::Poll, &poll.id);
    encode_payload(&key, poll, labels_for(&poll.author, None))
}

/// Encode a reminder; `owner` is recorded as a label only.
pub fn encode_reminder(reminder: &Reminder, owner: Option<&str>) -> Result<StoredObject> {
    let key = RecordKey::new(RecordKind::Reminder, &reminder.id);
    encode_payload(&key, reminder, labels_for(&reminder.author, owner))
}

pub fn encode(record: &Record) -> Result<StoredObject> {
    match record {
        Record::Poll(poll) => encode_poll(poll),
        Record::Reminder(reminder) => encode_reminder(reminder, None),
    }
}

fn labels_for(author: &str, owner: Option<&str>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(AUTHOR_LABEL.to_owned(), label_value(author));
    if let Some(owner) = owner {
        labels.insert(OWNER_LABEL.to_owned(), label_value(owner));
    }
    labels
}

/// Coerce a user id into a valid label value.
///
/// Label values may only hold `[A-Za-z0-9-_.]`, must start and end with an
/// alphanumeric and are capped at 63 characters. Other characters become
/// `-`. Labels are informational; the payload keeps the exact id.
pub fn label_value(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    let capped = &trimmed[..trimmed.len().min(MAX_LABEL_LEN)];
    capped
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_owned()
}

fn encode_payload<T: serde::Serialize>(
    key: &RecordKey,
    record: &T,
    labels: BTreeMap<String, String>,
) -> Result<StoredObject> {
    let json = serde_json::to_string(record)
        .map_err(|e| BotError::Codec(format!("failed to marshal {}: {e}", key.kind)))?;
    let mut data = BTreeMap::new();
    data.insert(PAYLOAD_FIELD.to_owned(), json);
    Ok(StoredObject {
        name: key.to_string(),
        labels,
        data,
    })
}

fn decode_payload<T: DeserializeOwned>(kind: RecordKind, object: &StoredObject) -> Result<T> {
    let json = object.data.get(PAYLOAD_FIELD).ok_or_else(|| {
        BotError::Codec(format!(
            "could not find {PAYLOAD_FIELD} data in {kind} object {}",
            object.name
        ))
    })?;
    serde_json::from_str(json)
        .map_err(|e| BotError::Codec(format!("failed to unmarshal {} to {kind}: {e}", object.name)))
}

pub fn decode_poll(object: &StoredObject) -> Result<Poll> {
    decode_payload(RecordKind::Poll, object)
}

pub fn decode_reminder(object: &StoredObject) -> Result<Reminder> {
    decode_payload(RecordKind::Reminder, object)
}

/// Decode the payload stored under `key`.
///
/// Fails if the payload's id disagrees with the key, since deletions are
/// routed by key alone.
pub fn decode(key: &RecordKey, object: &StoredObject) -> Result<Record> {
    let record = match key.kind {
        RecordKind::Poll => Record::Poll(decode_poll(object)?),
        RecordKind::Reminder => Record::Reminder(decode_reminder(object)?),
    };
    if record.id() != key.id {
        return Err(BotError::Codec(format!(
            "{key} holds a {} with id {}",
            key.kind,
            record.id()
        )));
    }
    Ok(record)
}

/// Decode a watch event.
///
/// Returns `Ok(None)` for keys that are not poll or reminder records.
pub fn decode_event(event: &WatchEvent) -> Result<Option<MirrorUpdate>> {
    let Some(key) = RecordKey::parse(&event.key) else {
        return Ok(None);
    };
    match event.kind {
        WatchEventKind::Added | WatchEventKind::Updated => {
            decode(&key, &event.payload).map(|record| Some(MirrorUpdate::Upsert(record)))
        }
        WatchEventKind::Deleted => Ok(Some(MirrorUpdate::Remove(key))),
    }
}
