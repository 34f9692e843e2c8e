//! Watch-synchronised mirror of every poll and reminder.
//!
//! The [`Mirror`] is a read-mostly projection of the remote store. Writes
//! are forwarded to the store and only become visible here once the
//! matching watch event has been consumed by [`Mirror::run_watch`], which
//! is the sole writer of the local maps.
//!
//! # Consistency
//!
//! A caller that writes and immediately reads may see stale data. Votes are
//! applied as get → modify → update without a version check, so two
//! concurrent votes on the same poll can lose one of them.

use crate::error::Result;
use crate::records::codec::{self, MirrorUpdate};
use crate::records::{Poll, Record, RecordKind, Reminder};
use crate::store::{RemoteStore, WatchEvent};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct MirrorState {
    polls: HashMap<String, Poll>,
    reminders: HashMap<String, Reminder>,
}

/// In-memory view of the store, kept current by its watch stream.
pub struct Mirror {
    store: Arc<dyn RemoteStore>,
    state: Mutex<MirrorState>,
}

impl Mirror {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            state: Mutex::new(MirrorState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MirrorState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Snapshot of all polls keyed by id.
    pub fn list_polls(&self) -> HashMap<String, Poll> {
        self.lock().polls.clone()
    }

    /// Snapshot of all reminders keyed by id.
    pub fn list_reminders(&self) -> HashMap<String, Reminder> {
        self.lock().reminders.clone()
    }

    /// Snapshot of all records of one kind keyed by id.
    pub fn list(&self, kind: RecordKind) -> HashMap<String, Record> {
        let state = self.lock();
        match kind {
            RecordKind::Poll => state
                .polls
                .iter()
                .map(|(id, poll)| (id.clone(), Record::Poll(poll.clone())))
                .collect(),
            RecordKind::Reminder => state
                .reminders
                .iter()
                .map(|(id, reminder)| (id.clone(), Record::Reminder(reminder.clone())))
                .collect(),
        }
    }

    pub fn get_poll(&self, id: &str) -> Option<Poll> {
        self.lock().polls.get(id).cloned()
    }

    /// Look up a reminder owned by `author`.
    ///
    /// A reminder owned by someone else is reported exactly like a missing one.
    pub fn get_reminder(&self, id: &str, author: &str) -> Option<Reminder> {
        self.lock()
            .reminders
            .get(id)
            .filter(|reminder| reminder.is_owned_by(author))
            .cloned()
    }

    /// Create the record in the store. The mirror is not touched.
    pub async fn create(&self, record: &Record) -> Result<()> {
        let object = codec::encode(record)?;
        self.store.create(object).await
    }

    /// Create a reminder, labelling it with the user it was set for.
    pub async fn create_reminder(&self, reminder: &Reminder, owner: &str) -> Result<()> {
        let object = codec::encode_reminder(reminder, Some(owner))?;
        self.store.create(object).await
    }

    /// Replace the record in the store. The mirror is not touched.
    pub async fn update(&self, record: &Record) -> Result<()> {
        let object = codec::encode(record)?;
        self.store.update(object).await
    }

    /// Ask the store to delete `key`.
    ///
    /// Failures are logged and swallowed: the record stays visible until a
    /// deletion event arrives, whatever this call returns.
    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key, error = %e, "failed to delete record from store; it remains in the mirror");
        }
    }

    /// Apply one watch event to the local maps.
    pub(crate) fn apply_event(&self, event: &WatchEvent) {
        match codec::decode_event(event) {
            Ok(Some(update)) => self.apply(update),
            Ok(None) => debug!(key = %event.key, "ignoring watch event for unrecognised key"),
            Err(e) => warn!(key = %event.key, error = %e, "discarding undecodable watch event"),
        }
    }

    fn apply(&self, update: MirrorUpdate) {
        let mut state = self.lock();
        match update {
            MirrorUpdate::Upsert(Record::Poll(poll)) => {
                debug!(poll_id = %poll.id, "mirroring poll");
                state.polls.insert(poll.id.clone(), poll);
            }
            MirrorUpdate::Upsert(Record::Reminder(reminder)) => {
                debug!(reminder_id = %reminder.id, "mirroring reminder");
                state.reminders.insert(reminder.id.clone(), reminder);
            }
            MirrorUpdate::Remove(key) => {
                let removed = match key.kind {
                    RecordKind::Poll => state.polls.remove(&key.id).is_some(),
                    RecordKind::Reminder => state.reminders.remove(&key.id).is_some(),
                };
                if removed {
                    debug!(%key, "removed record from mirror");
                }
            }
        }
    }

    /// Consume the store's watch stream until cancelled or the stream ends.
    ///
    /// Events are applied one at a time in arrival order.
    ///
    /// # Errors
    ///
    /// Returns an error if the watch cannot be opened.
    pub async fn run_watch(&self, cancel: CancellationToken) -> Result<()> {
        let mut events = self.store.watch().await?;
        info!(namespace = self.store.namespace(), "mirror watch started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("mirror watch cancelled");
                    break;
                }
                next = events.next() => match next {
                    Some(event) => self.apply_event(&event),
                    None => {
                        warn!("mirror watch stream ended");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Spawn [`run_watch`](Self::run_watch) as the dedicated consumer task.
    pub fn spawn_watch(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let mirror = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = mirror.run_watch(cancel).await {
                tracing::error!(error = %e, "mirror watch failed to start");
            }
        })
    }
}
