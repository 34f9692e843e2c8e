//! Command-facing operations over the mirror.
//!
//! Command handlers call [`RecordService`] and turn any error into a chat
//! reply with [`user_facing_error`].

use crate::error::{BotError, Result};
use crate::mirror::Mirror;
use crate::records::{Poll, Record, RecordKey, RecordKind, Reminder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Poll and reminder operations shared by every command handler.
#[derive(Clone)]
pub struct RecordService {
    mirror: Arc<Mirror>,
}

impl RecordService {
    pub fn new(mirror: Arc<Mirror>) -> Self {
        Self { mirror }
    }

    pub fn mirror(&self) -> &Arc<Mirror> {
        &self.mirror
    }

    pub async fn create_poll(&self, poll: &Poll) -> Result<()> {
        self.mirror.create(&Record::Poll(poll.clone())).await?;
        info!(poll_id = %poll.id, author = %poll.author, "poll created");
        Ok(())
    }

    /// Record `voter`'s vote for the zero-based `choice` and write the poll
    /// back.
    ///
    /// The read comes from the mirror and the write carries no version, so a
    /// concurrent vote on the same poll can be overwritten.
    ///
    /// # Errors
    ///
    /// [`BotError::NotFound`] for an unknown poll, [`BotError::InvalidChoice`]
    /// for an out-of-range choice, [`BotError::Store`] if the write fails.
    pub async fn vote(&self, poll_id: &str, choice: usize, voter: &str) -> Result<Poll> {
        let poll = self
            .mirror
            .get_poll(poll_id)
            .ok_or_else(|| BotError::NotFound(format!("poll {poll_id}")))?;
        let updated = poll.with_vote(choice, voter)?;
        self.mirror.update(&Record::Poll(updated.clone())).await?;
        info!(poll_id, choice, "vote recorded");
        Ok(updated)
    }

    pub fn list_polls(&self) -> HashMap<String, Poll> {
        self.mirror.list_polls()
    }

    pub fn list_reminders(&self) -> HashMap<String, Reminder> {
        self.mirror.list_reminders()
    }

    /// Reminders authored by `author`, soonest first.
    pub fn reminders_for(&self, author: &str) -> Vec<Reminder> {
        let mut owned: Vec<Reminder> = self
            .mirror
            .list_reminders()
            .into_values()
            .filter(|reminder| reminder.is_owned_by(author))
            .collect();
        owned.sort_by(|a, b| a.expiry.cmp(&b.expiry).then_with(|| a.id.cmp(&b.id)));
        owned
    }

    /// Fetch a reminder owned by `author`.
    ///
    /// # Errors
    ///
    /// [`BotError::NotFound`] if the reminder is missing or owned by someone
    /// else.
    pub fn get_reminder(&self, id: &str, author: &str) -> Result<Reminder> {
        self.mirror
            .get_reminder(id, author)
            .ok_or_else(|| BotError::NotFound(format!("reminder {id}")))
    }

    pub async fn add_reminder(&self, reminder: &Reminder, owner: &str) -> Result<()> {
        self.mirror.create_reminder(reminder, owner).await?;
        info!(reminder_id = %reminder.id, owner, "reminder created");
        Ok(())
    }

    /// Delete a reminder owned by `author`, returning what was deleted.
    ///
    /// The store delete is best effort; the reminder disappears from listings
    /// once the deletion event is mirrored.
    pub async fn delete_reminder(&self, id: &str, author: &str) -> Result<Reminder> {
        let reminder = self.get_reminder(id, author)?;
        let key = RecordKey::new(RecordKind::Reminder, id);
        self.mirror.delete(&key.to_string()).await;
        Ok(reminder)
    }
}

/// Chat reply for a failed command.
///
/// Not-found and invalid-choice errors are the caller's mistake and are
/// shown as-is. Anything else is logged with a fresh correlation id and
/// replaced by a generic message carrying only that id.
pub fn user_facing_error(err: &BotError) -> String {
    match err {
        BotError::NotFound(what) => format!("```Could not find {what}```"),
        BotError::InvalidChoice { .. } => format!("```{err}```"),
        _ => {
            let correlation_id = uuid::Uuid::new_v4();
            error!(%correlation_id, error = %err, "command failed");
            format!("```Unexpected error with id: {correlation_id} :(```")
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::records::codec::{encode_poll, encode_reminder};
    use crate::store::{InMemoryStore, WatchEvent, WatchEventKind};

    fn make_service() -> (Arc<InMemoryStore>, RecordService) {
        let store = Arc::new(InMemoryStore::new("test"));
        let mirror = Arc::new(Mirror::new(store.clone()));
        (store, RecordService::new(mirror))
    }

    fn mirror_poll(service: &RecordService, poll: &Poll) {
        service.mirror().apply_event(&WatchEvent {
            kind: WatchEventKind::Added,
            key: format!("poll-{}", poll.id),
            payload: encode_poll(poll).unwrap(),
        });
    }

    fn mirror_reminder(service: &RecordService, reminder: &Reminder) {
        service.mirror().apply_event(&WatchEvent {
            kind: WatchEventKind::Added,
            key: format!("reminder-{}", reminder.id),
            payload: encode_reminder(reminder, None).unwrap(),
        });
    }

    fn lunch_poll() -> Poll {
        Poll::new(
            "p1",
            "author",
            "chan",
            "Lunch?",
            vec!["pizza".to_owned(), "tacos".to_owned()],
            100,
        )
    }

    #[tokio::test]
    async fn vote_on_unknown_poll_is_not_found() {
        let (_store, service) = make_service();
        let err = service.vote("nope", 0, "alice").await.unwrap_err();
        assert!(matches!(err, BotError::NotFound(_)));
    }

    #[tokio::test]
    async fn vote_out_of_range_is_invalid_choice() {
        let (store, service) = make_service();
        let poll = lunch_poll();
        service.create_poll(&poll).await.unwrap();
        mirror_poll(&service, &poll);

        let err = service.vote("p1", 2, "alice").await.unwrap_err();
        assert!(matches!(
            err,
            BotError::InvalidChoice {
                choice: 2,
                available: 2
            }
        ));
        let stored = crate::records::codec::decode_poll(&store.get("poll-p1").unwrap()).unwrap();
        assert!(stored.votes.is_empty());
    }

    #[tokio::test]
    async fn vote_writes_updated_poll_to_store() {
        let (store, service) = make_service();
        let poll = lunch_poll();
        service.create_poll(&poll).await.unwrap();
        mirror_poll(&service, &poll);

        let updated = service.vote("p1", 1, "alice").await.unwrap();
        assert_eq!(updated.vote_count(1), 1);

        let stored = crate::records::codec::decode_poll(&store.get("poll-p1").unwrap()).unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn vote_propagates_store_failure() {
        let (store, service) = make_service();
        let poll = lunch_poll();
        service.create_poll(&poll).await.unwrap();
        mirror_poll(&service, &poll);
        store.set_fail_writes(true);

        let err = service.vote("p1", 0, "alice").await.unwrap_err();
        assert!(matches!(err, BotError::Store(_)));
    }

    #[tokio::test]
    async fn reminders_are_scoped_to_their_author() {
        let (_store, service) = make_service();
        let mine = Reminder::new("r1", "alice", "c", "one", 20);
        let also_mine = Reminder::new("r2", "alice", "c", "two", 10);
        let theirs = Reminder::new("r3", "bob", "c", "three", 5);
        for reminder in [&mine, &also_mine, &theirs] {
            mirror_reminder(&service, reminder);
        }

        let ids: Vec<String> = service
            .reminders_for("alice")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["r2".to_owned(), "r1".to_owned()]);
        assert_eq!(service.list_reminders().len(), 3);

        assert!(matches!(
            service.get_reminder("r3", "alice"),
            Err(BotError::NotFound(_))
        ));
        assert_eq!(service.get_reminder("r3", "bob").unwrap(), theirs);
    }

    #[tokio::test]
    async fn delete_reminder_checks_author_before_deleting() {
        let (store, service) = make_service();
        let reminder = Reminder::new("r1", "bob", "c", "hi", 10);
        service.add_reminder(&reminder, "bob").await.unwrap();
        mirror_reminder(&service, &reminder);

        let err = service.delete_reminder("r1", "alice").await.unwrap_err();
        assert!(matches!(err, BotError::NotFound(_)));
        assert!(store.delete_calls().is_empty());

        let deleted = service.delete_reminder("r1", "bob").await.unwrap();
        assert_eq!(deleted, reminder);
        assert_eq!(store.delete_calls(), vec!["reminder-r1".to_owned()]);
        assert!(store.is_empty());
    }

    #[test]
    fn internal_errors_are_hidden_behind_a_correlation_id() {
        let msg = user_facing_error(&BotError::Store("etcd timeout".to_owned()));
        assert!(msg.starts_with("```Unexpected error with id: "));
        assert!(msg.ends_with(" :(```"));
        assert!(!msg.contains("etcd"));
    }

    #[test]
    fn caller_mistakes_are_reported_directly() {
        let msg = user_facing_error(&BotError::NotFound("poll p9".to_owned()));
        assert_eq!(msg, "```Could not find poll p9```");

        let msg = user_facing_error(&BotError::InvalidChoice {
            choice: 4,
            available: 2,
        });
        assert!(msg.contains("invalid choice 4"));
    }
}
