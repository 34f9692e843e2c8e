//! Kubernetes ConfigMap-backed store.
//!
//! Each record is one ConfigMap in the configured namespace. Changes are
//! observed list-then-watch: every connection first lists the namespace,
//! emits `Deleted` for names seen before but no longer listed and `Added`
//! for everything listed, then watches from the list's resourceVersion.
//! The watch API streams one JSON event per line. When a connection ends
//! it is re-established with exponential backoff, so objects deleted while
//! disconnected still reach consumers as deletions.

use crate::config::StoreConfig;
use crate::error::{BotError, Result};
use crate::store::lines::LineParser;
use crate::store::{RemoteStore, StoredObject, WatchEvent, WatchEventKind, WatchStream};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// First reconnect delay after a watch connection ends.
const INITIAL_BACKOFF_SECS: u64 = 2;

/// Upper bound for the reconnect delay.
const MAX_BACKOFF_SECS: u64 = 60;

/// Buffered watch events before the reader applies backpressure.
const WATCH_BUFFER: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigMap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    metadata: ObjectMeta,
    #[serde(default)]
    data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
}

impl ConfigMap {
    fn from_object(object: StoredObject, namespace: &str) -> Self {
        Self {
            api_version: Some("v1".to_owned()),
            kind: Some("ConfigMap".to_owned()),
            metadata: ObjectMeta {
                name: object.name,
                namespace: Some(namespace.to_owned()),
                labels: object.labels,
            },
            data: object.data,
        }
    }

    fn into_object(self) -> StoredObject {
        StoredObject {
            name: self.metadata.name,
            labels: self.metadata.labels,
            data: self.data,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigMapList {
    #[serde(default)]
    metadata: ListMeta,
    #[serde(default)]
    items: Vec<ConfigMap>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMeta {
    #[serde(default)]
    resource_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWatchEvent {
    #[serde(rename = "type")]
    kind: String,
    object: serde_json::Value,
}

/// One decoded line of the watch stream.
#[derive(Debug)]
enum WatchLine {
    Event(WatchEvent),
    /// The server ended the watch, e.g. `410 Gone` for a stale resourceVersion.
    Expired(String),
    Skip,
}

/// Parse one line of the watch stream.
///
/// Bookmarks and unreadable lines are skipped. An `ERROR` event means the
/// watch can no longer be continued and a relist is needed.
fn parse_watch_line(line: &str) -> WatchLine {
    let raw: RawWatchEvent = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "skipping unreadable watch line");
            return WatchLine::Skip;
        }
    };

    let kind = match raw.kind.as_str() {
        "ADDED" => WatchEventKind::Added,
        "MODIFIED" => WatchEventKind::Updated,
        "DELETED" => WatchEventKind::Deleted,
        "BOOKMARK" => return WatchLine::Skip,
        "ERROR" => return WatchLine::Expired(raw.object.to_string()),
        other => {
            warn!(event_type = other, "ignoring watch event");
            return WatchLine::Skip;
        }
    };

    match serde_json::from_value::<ConfigMap>(raw.object) {
        Ok(config_map) => {
            let payload = config_map.into_object();
            WatchLine::Event(WatchEvent {
                kind,
                key: payload.name.clone(),
                payload,
            })
        }
        Err(e) => {
            warn!(error = %e, "skipping watch event with malformed object");
            WatchLine::Skip
        }
    }
}

/// Connection details shared with the background watch task.
#[derive(Clone)]
struct Endpoint {
    client: reqwest::Client,
    collection_url: String,
    token: Option<String>,
}

impl Endpoint {
    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn object_url(&self, name: &str) -> String {
        format!("{}/{name}", self.collection_url)
    }
}

/// [`RemoteStore`] over the Kubernetes core/v1 ConfigMap API.
pub struct ConfigMapStore {
    namespace: String,
    endpoint: Endpoint,
}

impl ConfigMapStore {
    /// Create a store against `api_url` (e.g. `https://kubernetes.default.svc`).
    pub fn new(api_url: &str, namespace: &str, token: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, namespace, token)
    }

    fn with_client(
        client: reqwest::Client,
        api_url: &str,
        namespace: &str,
        token: Option<String>,
    ) -> Self {
        let collection_url = format!(
            "{}/api/v1/namespaces/{namespace}/configmaps",
            api_url.trim_end_matches('/')
        );
        Self {
            namespace: namespace.to_owned(),
            endpoint: Endpoint {
                client,
                collection_url,
                token,
            },
        }
    }

    /// Build a store from configuration, reading the bearer token and the
    /// optional CA bundle from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured file cannot be read or the CA bundle
    /// is not valid PEM.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let token = match &config.token_path {
            Some(path) => Some(std::fs::read_to_string(path)?.trim().to_owned()),
            None => None,
        };

        let mut builder = reqwest::Client::builder();
        if let Some(path) = &config.ca_cert_path {
            let pem = std::fs::read(path)?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| BotError::Config(format!("invalid CA bundle {}: {e}", path.display())))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| BotError::Config(format!("cannot build store client: {e}")))?;

        Ok(Self::with_client(
            client,
            &config.api_url,
            &config.namespace,
            token,
        ))
    }

    async fn send(&self, action: &str, name: &str, request: reqwest::RequestBuilder) -> Result<()> {
        let response = self
            .endpoint
            .authorized(request)
            .send()
            .await
            .map_err(|e| BotError::Store(format!("{action} {name}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Store(format!("{action} {name} failed ({status}): {body}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for ConfigMapStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn create(&self, object: StoredObject) -> Result<()> {
        let name = object.name.clone();
        let body = ConfigMap::from_object(object, &self.namespace);
        let request = self
            .endpoint
            .client
            .post(&self.endpoint.collection_url)
            .json(&body);
        self.send("create", &name, request).await
    }

    async fn update(&self, object: StoredObject) -> Result<()> {
        let name = object.name.clone();
        let body = ConfigMap::from_object(object, &self.namespace);
        let request = self
            .endpoint
            .client
            .put(self.endpoint.object_url(&name))
            .json(&body);
        self.send("update", &name, request).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let request = self.endpoint.client.delete(self.endpoint.object_url(key));
        self.send("delete", key, request).await
    }

    async fn watch(&self) -> Result<WatchStream> {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let endpoint = self.endpoint.clone();
        tokio::spawn(run_watch(endpoint, tx));
        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// Keep the namespace synchronised until the receiving side is dropped.
async fn run_watch(endpoint: Endpoint, tx: mpsc::Sender<WatchEvent>) {
    // Names the consumer currently believes exist.
    let mut known = BTreeSet::new();
    let mut backoff_secs = INITIAL_BACKOFF_SECS;
    loop {
        match sync_once(&endpoint, &tx, &mut known).await {
            Ok(0) => debug!("configmap watch ended without events"),
            Ok(delivered) => {
                debug!(delivered, "configmap watch ended; relisting");
                backoff_secs = INITIAL_BACKOFF_SECS;
            }
            Err(e) => warn!("configmap watch failed: {e}; retrying in {backoff_secs}s"),
        }

        if tx.is_closed() {
            break;
        }

        tokio::select! {
            _ = tx.closed() => break,
            _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
        }
        backoff_secs = backoff_secs.saturating_mul(2).min(MAX_BACKOFF_SECS);
    }
    info!("configmap watch stopped");
}

/// One list-then-watch cycle. Returns how many watch events were sent.
async fn sync_once(
    endpoint: &Endpoint,
    tx: &mpsc::Sender<WatchEvent>,
    known: &mut BTreeSet<String>,
) -> anyhow::Result<usize> {
    let resource_version = relist(endpoint, tx, known).await?;
    watch_from(endpoint, tx, known, resource_version.as_deref()).await
}

async fn forward(tx: &mpsc::Sender<WatchEvent>, event: WatchEvent) -> anyhow::Result<()> {
    tx.send(event)
        .await
        .map_err(|_| anyhow::anyhow!("watch receiver dropped"))
}

/// List the namespace and reconcile `known` against it.
///
/// Returns the list's resourceVersion for the following watch.
async fn relist(
    endpoint: &Endpoint,
    tx: &mpsc::Sender<WatchEvent>,
    known: &mut BTreeSet<String>,
) -> anyhow::Result<Option<String>> {
    let response = endpoint
        .authorized(endpoint.client.get(&endpoint.collection_url))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("list request failed ({status}): {body}");
    }

    let list: ConfigMapList = response.json().await?;
    let listed: BTreeSet<String> = list
        .items
        .iter()
        .map(|item| item.metadata.name.clone())
        .collect();

    let vanished: Vec<String> = known.difference(&listed).cloned().collect();
    for name in vanished {
        debug!(key = %name, "object vanished while disconnected");
        known.remove(&name);
        let payload = StoredObject {
            name: name.clone(),
            ..StoredObject::default()
        };
        forward(
            tx,
            WatchEvent {
                kind: WatchEventKind::Deleted,
                key: name,
                payload,
            },
        )
        .await?;
    }

    for item in list.items {
        let payload = item.into_object();
        known.insert(payload.name.clone());
        forward(
            tx,
            WatchEvent {
                kind: WatchEventKind::Added,
                key: payload.name.clone(),
                payload,
            },
        )
        .await?;
    }

    debug!(objects = known.len(), "configmap list synchronised");
    Ok(list.metadata.resource_version)
}

/// Run one watch connection from `resource_version`, forwarding events.
async fn watch_from(
    endpoint: &Endpoint,
    tx: &mpsc::Sender<WatchEvent>,
    known: &mut BTreeSet<String>,
    resource_version: Option<&str>,
) -> anyhow::Result<usize> {
    let mut request = endpoint
        .client
        .get(&endpoint.collection_url)
        .query(&[("watch", "true")]);
    if let Some(version) = resource_version {
        request = request.query(&[("resourceVersion", version)]);
    }
    let response = endpoint.authorized(request).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("watch request failed ({status}): {body}");
    }

    let mut parser = LineParser::new();
    let mut bytes = response.bytes_stream();
    let mut delivered = 0;
    while let Some(chunk) = bytes.next().await {
        for line in parser.push(&chunk?) {
            if !handle_line(&line, tx, known, &mut delivered).await? {
                return Ok(delivered);
            }
        }
    }
    if let Some(line) = parser.flush() {
        handle_line(&line, tx, known, &mut delivered).await?;
    }
    Ok(delivered)
}

/// Forward one watch line. Returns `false` once the watch has expired.
async fn handle_line(
    line: &str,
    tx: &mpsc::Sender<WatchEvent>,
    known: &mut BTreeSet<String>,
    delivered: &mut usize,
) -> anyhow::Result<bool> {
    match parse_watch_line(line) {
        WatchLine::Event(event) => {
            if event.kind == WatchEventKind::Deleted {
                known.remove(&event.key);
            } else {
                known.insert(event.key.clone());
            }
            forward(tx, event).await?;
            *delivered += 1;
            Ok(true)
        }
        WatchLine::Expired(status) => {
            info!(%status, "configmap watch expired; relisting");
            Ok(false)
        }
        WatchLine::Skip => Ok(true),
    }
}
