//! Integration tests for the acquisition pipeline and its HTTP surface.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::{is_completed, ScriptedProvider, TestHarness, DEFAULT_DESTINATION};
use relaycast::acquisition::JobStatus;
use relaycast_common::{ByteRange, Error, ObjectId, ObjectMetadata, Result};
use relaycast_store::{ByteStream, LocalObjectStore, NewObject, ObjectStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Delegating store whose uploads are always refused.
struct RejectingStore {
    inner: LocalObjectStore,
}

#[async_trait]
impl ObjectStore for RejectingStore {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    async fn fetch_metadata(&self, id: &ObjectId) -> Result<ObjectMetadata> {
        self.inner.fetch_metadata(id).await
    }

    async fn open_range_stream(&self, id: &ObjectId, range: ByteRange) -> Result<ByteStream> {
        self.inner.open_range_stream(id, range).await
    }

    async fn create(&self, _object: &NewObject, _source: &Path) -> Result<ObjectMetadata> {
        Err(Error::UploadFailed("store rejected the upload".into()))
    }

    async fn copy(&self, id: &ObjectId, parent: &str) -> Result<ObjectMetadata> {
        self.inner.copy(id, parent).await
    }

    async fn trash(&self, id: &ObjectId) -> Result<()> {
        self.inner.trash(id).await
    }

    async fn list(&self, parent: &str, mime_prefix: Option<&str>) -> Result<Vec<ObjectMetadata>> {
        self.inner.list(parent, mime_prefix).await
    }
}

async fn audio_server(bytes: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/audio.webm"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/webm")
                .set_body_bytes(bytes),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn falls_back_to_next_provider_and_stores_result() {
    let audio: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    let server = audio_server(audio.clone()).await;
    let h = TestHarness::with_providers(vec![
        ScriptedProvider::broken("first"),
        ScriptedProvider::serving(
            "second",
            "Artist - Song: Live?",
            &format!("{}/audio.webm", server.uri()),
        ),
    ])
    .await;

    let id = h.ctx.runner.submit("artist song", None).unwrap();
    let seen = h.wait_for_job(&id).await;
    let last = seen.last().unwrap();

    assert!(is_completed(last), "unexpected terminal snapshot: {last:?}");
    assert_eq!(last.percent, 100.0);
    assert_eq!(last.title.as_deref(), Some("Artist - Song: Live?"));

    let object_id = last.object_id.clone().expect("completed job carries object id");
    let meta = h.store.fetch_metadata(&object_id).await.unwrap();
    assert_eq!(meta.size, audio.len() as u64);
    assert_eq!(meta.mime_type, "audio/webm");
    assert_eq!(meta.parent.as_deref(), Some(DEFAULT_DESTINATION));
    let name = meta.name.unwrap();
    assert!(name.ends_with(".webm"), "name was {name}");
    assert!(!name.contains(':') && !name.contains('?'), "name was {name}");
}

#[tokio::test]
async fn percent_never_decreases() {
    let server = audio_server(vec![7u8; 256 * 1024]).await;
    let h = TestHarness::with_providers(vec![ScriptedProvider::serving(
        "only",
        "Song",
        &format!("{}/audio.webm", server.uri()),
    )])
    .await;

    let id = h.ctx.runner.submit("song", Some("music")).unwrap();
    let seen = h.wait_for_job(&id).await;

    for pair in seen.windows(2) {
        assert!(
            pair[1].percent >= pair[0].percent,
            "percent went backwards: {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
    assert_eq!(seen.last().unwrap().status, JobStatus::Completed);

    let stored = h.store.list("music", Some("audio/")).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn all_providers_failing_ends_in_error() {
    let h = TestHarness::with_providers(vec![
        ScriptedProvider::broken("first"),
        ScriptedProvider::broken("second"),
    ])
    .await;

    let id = h.ctx.runner.submit("anything", None).unwrap();
    let seen = h.wait_for_job(&id).await;
    let last = seen.last().unwrap();

    assert_eq!(last.status, JobStatus::Error);
    let message = last.message.as_deref().unwrap();
    assert!(message.contains("second"), "message was {message}");
    assert!(last.object_id.is_none());
    assert!(h.store.list(DEFAULT_DESTINATION, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_download_leaves_no_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/audio.webm"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let h = TestHarness::with_providers(vec![ScriptedProvider::serving(
        "only",
        "Song",
        &format!("{}/audio.webm", server.uri()),
    )])
    .await;

    let id = h.ctx.runner.submit("song", None).unwrap();
    let last = h.wait_for_job(&id).await.pop().unwrap();

    assert_eq!(last.status, JobStatus::Error);
    assert!(h.store.list(DEFAULT_DESTINATION, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_upload_ends_in_error() {
    let server = audio_server(vec![9u8; 8 * 1024]).await;
    let h = TestHarness::with_store(
        vec![ScriptedProvider::serving(
            "only",
            "Song",
            &format!("{}/audio.webm", server.uri()),
        )],
        |inner| Arc::new(RejectingStore { inner }),
    )
    .await;

    let id = h.ctx.runner.submit("song", None).unwrap();
    let seen = h.wait_for_job(&id).await;
    let last = seen.last().unwrap();

    assert_eq!(last.status, JobStatus::Error);
    let message = last.message.as_deref().unwrap();
    assert!(message.contains("Upload failed"), "message was {message}");
    assert!(last.object_id.is_none());
    assert!(h.store.list(DEFAULT_DESTINATION, None).await.unwrap().is_empty());
    assert!(seen.iter().all(|s| s.status != JobStatus::Completed));
}

#[tokio::test]
async fn submit_returns_before_work_finishes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/audio.webm"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![1u8; 1024])
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    let h = TestHarness::with_providers(vec![ScriptedProvider::serving(
        "only",
        "Song",
        &format!("{}/audio.webm", server.uri()),
    )])
    .await;
    let addr = h.serve().await;

    let started = Instant::now();
    h.ctx.runner.submit("song", None).unwrap();
    assert!(started.elapsed() < Duration::from_millis(50));

    let started = Instant::now();
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/download"))
        .json(&serde_json::json!({ "query": "song" }))
        .send()
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(resp.status(), 200);
    assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");
    let body: serde_json::Value = resp.json().await.unwrap();
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let job: serde_json::Value = reqwest::get(format!("http://{addr}/jobs/{job_id}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(job["query"], "song");
    assert_eq!(job["destination"], DEFAULT_DESTINATION);
    assert_ne!(job["status"], "completed");
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let (_h, addr) = TestHarness::with_server().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/download"))
        .json(&serde_json::json!({ "query": "   " }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn unknown_job_is_404() {
    let (_h, addr) = TestHarness::with_server().await;

    let resp = reqwest::get(format!(
        "http://{addr}/jobs/00000000-0000-4000-8000-000000000000"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = reqwest::get(format!("http://{addr}/jobs/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
