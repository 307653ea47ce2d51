//! Router-level tests for health and library routes.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{TestHarness, DEFAULT_DESTINATION};
use http_body_util::BodyExt;
use relaycast::server::create_router;
use relaycast_store::ObjectStore;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_version() {
    let h = TestHarness::new().await;
    let app = create_router(h.ctx.clone());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn list_filters_by_kind() {
    let h = TestHarness::new().await;
    h.put_object("song.mp3", "audio/mpeg", b"abc").await;
    h.put_object("clip.mp4", "video/mp4", b"defg").await;
    let app = create_router(h.ctx.clone());

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/library/folders/{DEFAULT_DESTINATION}?kind=audio"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "song.mp3");

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/library/folders/{DEFAULT_DESTINATION}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);

    let response = app
        .oneshot(
            Request::get(format!("/library/folders/{DEFAULT_DESTINATION}?kind=pictures"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn folders_named_like_actions_can_be_listed() {
    let h = TestHarness::new().await;
    let original = h.put_object("song.mp3", "audio/mpeg", b"abc").await;
    for folder in ["copy", "trash"] {
        h.store.copy(&original.id, folder).await.unwrap();
    }
    let app = create_router(h.ctx.clone());

    for folder in ["copy", "trash"] {
        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/library/folders/{folder}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "listing {folder}");
        let body = body_json(response).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["parent"], folder);
    }
}

#[tokio::test]
async fn copy_places_object_in_new_folder() {
    let h = TestHarness::new().await;
    let original = h.put_object("song.mp3", "audio/mpeg", b"abcdef").await;
    let app = create_router(h.ctx.clone());

    let response = app
        .oneshot(post_json(
            "/library/copy",
            json!({ "objectId": original.id, "parent": "favourites" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_ne!(body["id"], json!(original.id));
    assert_eq!(body["parent"], "favourites");
    assert_eq!(body["size"], 6);

    let copies = h.store.list("favourites", None).await.unwrap();
    assert_eq!(copies.len(), 1);
}

#[tokio::test]
async fn copy_requires_parent() {
    let h = TestHarness::new().await;
    let original = h.put_object("song.mp3", "audio/mpeg", b"abc").await;
    let app = create_router(h.ctx.clone());

    let response = app
        .oneshot(post_json(
            "/library/copy",
            json!({ "objectId": original.id, "parent": " " }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trash_hides_object() {
    let h = TestHarness::new().await;
    let original = h.put_object("song.mp3", "audio/mpeg", b"abc").await;
    let app = create_router(h.ctx.clone());

    let response = app
        .clone()
        .oneshot(post_json("/library/trash", json!({ "objectId": original.id })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(h.store.list(DEFAULT_DESTINATION, None).await.unwrap().is_empty());

    let response = app
        .oneshot(
            Request::get(format!("/stream/{}", original.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn trash_of_missing_object_is_404() {
    let h = TestHarness::new().await;
    let app = create_router(h.ctx.clone());

    let response = app
        .oneshot(post_json("/library/trash", json!({ "objectId": "missing" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "object_not_found");
}

#[tokio::test]
async fn download_without_any_destination_is_rejected() {
    let h = TestHarness::new().await;
    let runner = h.ctx.runner.clone().with_default_destination(None);

    assert!(runner.submit("song", None).is_err());
    assert!(runner.submit("song", Some("  ")).is_err());
    assert!(runner.submit("song", Some("music")).is_ok());
}
