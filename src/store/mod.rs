//! Remote key-value store contract.
//!
//! The store is the source of truth for every record. Implementations only
//! need to provide create/update/delete of named objects in one namespace
//! and a watch stream of change events for that namespace.

pub mod configmap;
mod lines;
pub mod memory;

pub use configmap::ConfigMapStore;
pub use memory::InMemoryStore;

use crate::error::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named object as held by the store: labels plus string data fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// What happened to the object named in a [`WatchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Added,
    Updated,
    Deleted,
}

/// One change notification from the store's watch stream.
///
/// Ordering is causal per key only; events may be duplicated or delayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: String,
    pub payload: StoredObject,
}

/// Live stream of watch events.
pub type WatchStream = BoxStream<'static, WatchEvent>;

/// Store adapter contract consumed by the mirror.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Namespace this adapter reads and writes.
    fn namespace(&self) -> &str;

    /// Create a new object. Fails if the name already exists.
    async fn create(&self, object: StoredObject) -> Result<()>;

    /// Replace an existing object. Fails if the name does not exist.
    async fn update(&self, object: StoredObject) -> Result<()>;

    /// Delete an object by name.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Open a watch over every object in the namespace.
    ///
    /// The stream starts by reporting each existing object as
    /// [`WatchEventKind::Added`].
    async fn watch(&self) -> Result<WatchStream>;
}
