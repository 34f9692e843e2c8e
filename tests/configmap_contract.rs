//! ConfigMap Store Contract Tests
//!
//! These tests verify the HTTP requests the ConfigMap store sends to the
//! Kubernetes API and how it maps responses and watch streams back.

use futures_util::StreamExt;
use mirrorbot::records::Poll;
use mirrorbot::records::codec::encode_poll;
use mirrorbot::store::{
    ConfigMapStore, RemoteStore, StoredObject, WatchEvent, WatchEventKind, WatchStream,
};
use mirrorbot::{BotError, Mirror};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COLLECTION: &str = "/api/v1/namespaces/saltbot/configmaps";

fn store_for(server: &MockServer) -> ConfigMapStore {
    ConfigMapStore::new(&server.uri(), "saltbot", Some("sa-token".to_owned()))
}

fn sample_object() -> StoredObject {
    let poll = Poll::new(
        "abc123",
        "author-1",
        "chan-1",
        "Lunch?",
        vec!["pizza".to_owned(), "tacos".to_owned()],
        1_700_000_000,
    );
    encode_poll(&poll).unwrap()
}

// ────────────────────────────────────────────────────────────────────────────
// Writes
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_posts_configmap_with_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COLLECTION))
        .and(header("Authorization", "Bearer sa-token"))
        .and(body_partial_json(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "poll-abc123",
                "namespace": "saltbot",
                "labels": {"author": "author-1"}
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = store_for(&mock_server).create(sample_object()).await;
    assert!(result.is_ok(), "create should succeed: {result:?}");
}

#[tokio::test]
async fn test_update_puts_to_object_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(format!("{COLLECTION}/poll-abc123")))
        .and(body_partial_json(json!({"metadata": {"name": "poll-abc123"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    store_for(&mock_server)
        .update(sample_object())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_targets_object_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path(format!("{COLLECTION}/reminder-r1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    store_for(&mock_server).delete("reminder-r1").await.unwrap();
}

#[tokio::test]
async fn test_conflict_is_store_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COLLECTION))
        .respond_with(
            ResponseTemplate::new(409).set_body_string("configmaps \"poll-abc123\" already exists"),
        )
        .mount(&mock_server)
        .await;

    let err = store_for(&mock_server)
        .create(sample_object())
        .await
        .unwrap_err();
    assert!(matches!(err, BotError::Store(_)));
    assert!(err.to_string().contains("409"));
}

#[tokio::test]
async fn test_missing_object_delete_is_store_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path(format!("{COLLECTION}/poll-gone")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let err = store_for(&mock_server).delete("poll-gone").await.unwrap_err();
    assert!(matches!(err, BotError::Store(_)));
}

// ────────────────────────────────────────────────────────────────────────────
// Watch
// ────────────────────────────────────────────────────────────────────────────

fn list_body(resource_version: &str, items: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "kind": "ConfigMapList",
        "apiVersion": "v1",
        "metadata": {"resourceVersion": resource_version},
        "items": items
    })
}

/// Answer list requests; watch mocks mounted with a higher priority win for
/// `?watch=true`.
async fn mount_list(server: &MockServer, body: serde_json::Value, times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(COLLECTION))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .with_priority(5);
    match times {
        Some(n) => mock.up_to_n_times(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

async fn next_event(stream: &mut WatchStream, secs: u64) -> WatchEvent {
    tokio::time::timeout(Duration::from_secs(secs), stream.next())
        .await
        .expect("watch event within timeout")
        .expect("stream open")
}

#[tokio::test]
async fn test_watch_lists_then_watches_from_resource_version() {
    let mock_server = MockServer::start().await;

    mount_list(
        &mock_server,
        list_body("42", vec![json!({"metadata": {"name": "poll-a"}, "data": {"json": "{}"}})]),
        None,
    )
    .await;
    Mock::given(method("GET"))
        .and(path(COLLECTION))
        .and(query_param("watch", "true"))
        .and(query_param("resourceVersion", "42"))
        .and(header("Authorization", "Bearer sa-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"type":"MODIFIED","object":{"metadata":{"name":"poll-a"},"data":{"json":"{}"}}}"#,
        ))
        .with_priority(1)
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server);
    let mut stream = store.watch().await.unwrap();

    let listed = next_event(&mut stream, 2).await;
    assert_eq!(listed.kind, WatchEventKind::Added);
    assert_eq!(listed.key, "poll-a");
    let watched = next_event(&mut stream, 2).await;
    assert_eq!(watched.kind, WatchEventKind::Updated);
    assert_eq!(watched.key, "poll-a");
}

#[tokio::test]
async fn test_watch_streams_events_and_skips_noise() {
    let mock_server = MockServer::start().await;

    let body = concat!(
        r#"{"type":"ADDED","object":{"metadata":{"name":"poll-a"},"data":{"json":"{}"}}}"#,
        "\n",
        r#"{"type":"BOOKMARK","object":{"metadata":{"resourceVersion":"7"}}}"#,
        "\n",
        "\n",
        r#"{"type":"MODIFIED","object":{"metadata":{"name":"poll-a"},"data":{"json":"{}"}}}"#,
        "\r\n",
        "garbage\n",
        r#"{"type":"DELETED","object":{"metadata":{"name":"poll-a"}}}"#,
    );

    mount_list(&mock_server, list_body("1", vec![]), None).await;
    Mock::given(method("GET"))
        .and(path(COLLECTION))
        .and(query_param("watch", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .with_priority(1)
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server);
    let mut stream = store.watch().await.unwrap();

    let mut kinds = Vec::new();
    for _ in 0..3 {
        let event = next_event(&mut stream, 2).await;
        assert_eq!(event.key, "poll-a");
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            WatchEventKind::Added,
            WatchEventKind::Updated,
            WatchEventKind::Deleted
        ]
    );
}

#[tokio::test]
async fn test_watch_reconnects_after_failure() {
    let mock_server = MockServer::start().await;

    mount_list(&mock_server, list_body("1", vec![]), None).await;
    Mock::given(method("GET"))
        .and(path(COLLECTION))
        .and(query_param("watch", "true"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(COLLECTION))
        .and(query_param("watch", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"type":"ADDED","object":{"metadata":{"name":"reminder-r1"}}}"#,
        ))
        .with_priority(2)
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server);
    let mut stream = store.watch().await.unwrap();

    let event = next_event(&mut stream, 10).await;
    assert_eq!(event.kind, WatchEventKind::Added);
    assert_eq!(event.key, "reminder-r1");
}

#[tokio::test]
async fn test_relist_emits_delete_for_objects_gone_while_disconnected() {
    let mock_server = MockServer::start().await;

    mount_list(
        &mock_server,
        list_body("5", vec![json!({"metadata": {"name": "poll-p1"}, "data": {"json": "{}"}})]),
        Some(1),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(COLLECTION))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body("9", vec![])))
        .with_priority(6)
        .mount(&mock_server)
        .await;
    // Every watch connection ends immediately without events.
    Mock::given(method("GET"))
        .and(path(COLLECTION))
        .and(query_param("watch", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .with_priority(1)
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server);
    let mut stream = store.watch().await.unwrap();

    let listed = next_event(&mut stream, 2).await;
    assert_eq!(listed.kind, WatchEventKind::Added);
    assert_eq!(listed.key, "poll-p1");

    let vanished = next_event(&mut stream, 10).await;
    assert_eq!(vanished.kind, WatchEventKind::Deleted);
    assert_eq!(vanished.key, "poll-p1");
}

#[tokio::test]
async fn test_mirror_drops_record_deleted_during_reconnect() {
    let mock_server = MockServer::start().await;

    let object = sample_object();
    let item = json!({
        "metadata": {"name": object.name, "labels": object.labels},
        "data": object.data
    });
    mount_list(&mock_server, list_body("5", vec![item]), Some(1)).await;
    Mock::given(method("GET"))
        .and(path(COLLECTION))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body("9", vec![])))
        .with_priority(6)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(COLLECTION))
        .and(query_param("watch", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .with_priority(1)
        .mount(&mock_server)
        .await;

    let mirror = Arc::new(Mirror::new(Arc::new(store_for(&mock_server))));
    let cancel = CancellationToken::new();
    let handle = mirror.spawn_watch(cancel.clone());

    tokio::time::timeout(Duration::from_secs(2), async {
        while mirror.get_poll("abc123").is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("poll mirrored from the initial list");

    tokio::time::timeout(Duration::from_secs(10), async {
        while mirror.get_poll("abc123").is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("poll removed after relist");

    cancel.cancel();
    handle.await.unwrap();
}
