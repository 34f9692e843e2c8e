//! In-process store used by tests and local runs.
//!
//! Behaves like the ConfigMap store: conflicting creates and writes to
//! missing names fail, and every successful mutation is broadcast to all
//! open watches. Fault switches let tests simulate an unreachable store.

use crate::error::{BotError, Result};
use crate::store::{RemoteStore, StoredObject, WatchEvent, WatchEventKind, WatchStream};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, StoredObject>,
    subscribers: Vec<mpsc::UnboundedSender<WatchEvent>>,
    fail_writes: bool,
    fail_deletes: bool,
    delete_calls: Vec<String>,
}

impl Inner {
    fn broadcast(&mut self, event: WatchEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

/// In-memory [`RemoteStore`].
pub struct InMemoryStore {
    namespace: String,
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make create and update calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make delete calls fail.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    /// Every key passed to [`RemoteStore::delete`], including failed calls.
    pub fn delete_calls(&self) -> Vec<String> {
        self.lock().delete_calls.clone()
    }

    /// Current stored object for `key`.
    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().objects.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    /// Broadcast an arbitrary event without changing stored state.
    ///
    /// Used to simulate duplicate, foreign or corrupt events.
    pub fn publish(&self, event: WatchEvent) {
        self.lock().broadcast(event);
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn create(&self, object: StoredObject) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(BotError::Store(format!("create {}: store unavailable", object.name)));
        }
        if inner.objects.contains_key(&object.name) {
            return Err(BotError::Store(format!("create {}: already exists", object.name)));
        }
        inner.objects.insert(object.name.clone(), object.clone());
        inner.broadcast(WatchEvent {
            kind: WatchEventKind::Added,
            key: object.name.clone(),
            payload: object,
        });
        Ok(())
    }

    async fn update(&self, object: StoredObject) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(BotError::Store(format!("update {}: store unavailable", object.name)));
        }
        if !inner.objects.contains_key(&object.name) {
            return Err(BotError::Store(format!("update {}: not found", object.name)));
        }
        inner.objects.insert(object.name.clone(), object.clone());
        inner.broadcast(WatchEvent {
            kind: WatchEventKind::Updated,
            key: object.name.clone(),
            payload: object,
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.delete_calls.push(key.to_owned());
        if inner.fail_deletes {
            return Err(BotError::Store(format!("delete {key}: store unavailable")));
        }
        let Some(object) = inner.objects.remove(key) else {
            return Err(BotError::Store(format!("delete {key}: not found")));
        };
        inner.broadcast(WatchEvent {
            kind: WatchEventKind::Deleted,
            key: key.to_owned(),
            payload: object,
        });
        Ok(())
    }

    async fn watch(&self) -> Result<WatchStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        for object in inner.objects.values() {
            let _ = tx.send(WatchEvent {
                kind: WatchEventKind::Added,
                key: object.name.clone(),
                payload: object.clone(),
            });
        }
        inner.subscribers.push(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn object(name: &str) -> StoredObject {
        StoredObject {
            name: name.to_owned(),
            ..StoredObject::default()
        }
    }

    #[tokio::test]
    async fn watch_replays_existing_objects_then_streams_changes() {
        let store = InMemoryStore::new("test");
        store.create(object("poll-a")).await.unwrap();

        let mut stream = store.watch().await.unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(first.kind, WatchEventKind::Added);
        assert_eq!(first.key, "poll-a");

        store.update(object("poll-a")).await.unwrap();
        store.delete("poll-a").await.unwrap();
        assert_eq!(stream.next().await.unwrap().kind, WatchEventKind::Updated);
        assert_eq!(stream.next().await.unwrap().kind, WatchEventKind::Deleted);
    }

    #[tokio::test]
    async fn create_conflict_and_missing_update_fail() {
        let store = InMemoryStore::new("test");
        store.create(object("poll-a")).await.unwrap();
        assert!(store.create(object("poll-a")).await.is_err());
        assert!(store.update(object("poll-b")).await.is_err());
        assert!(store.delete("poll-b").await.is_err());
    }

    #[tokio::test]
    async fn fault_switches_block_mutations() {
        let store = InMemoryStore::new("test");
        store.set_fail_writes(true);
        assert!(store.create(object("poll-a")).await.is_err());
        assert!(store.is_empty());

        store.set_fail_writes(false);
        store.create(object("poll-a")).await.unwrap();
        store.set_fail_deletes(true);
        assert!(store.delete("poll-a").await.is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.delete_calls(), vec!["poll-a".to_owned()]);
    }

    #[tokio::test]
    async fn dropped_watch_is_pruned() {
        let store = InMemoryStore::new("test");
        let stream = store.watch().await.unwrap();
        drop(stream);
        store.create(object("poll-a")).await.unwrap();
        assert!(store.lock().subscribers.is_empty());
    }
}
