//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use labelman_core::gateway::Fixture;
use labelman_server::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

const FIXTURE: &str = r#"
datasets:
  ds1:
    name: Pets
    items:
      - { id: a, storage_path: p1, signed_url: "https://cdn.test/a.jpg", custom_tags: [cat] }
      - { id: b, storage_path: p2 }
cluster_results:
  cr1:
    - { storage_path: p1, cluster_id: 0 }
    - { storage_path: p2, cluster_id: 1 }
"#;

fn app(token: Option<&str>) -> Router {
    let fixture = Fixture::from_yaml_str(FIXTURE).unwrap();
    build_router(AppState::from_fixture(fixture, token.map(str::to_string)))
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_dataset_items_envelope() {
    let (status, body) = send(app(None), get("/api/datasets/ds1/items")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["dataset_name"], "Pets");
    assert_eq!(body["imageData"].as_array().unwrap().len(), 2);
    assert_eq!(body["analysisData"][0]["custom_tags"], json!(["cat"]));
}

#[tokio::test]
async fn test_unknown_dataset_is_not_found() {
    let (status, body) = send(app(None), get("/api/datasets/nope/items")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_cluster_result_shape() {
    let (status, body) = send(app(None), get("/api/clustering/results/cr1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["results"][1], json!({"storage_path": "p2", "cluster_id": 1}));
}

#[tokio::test]
async fn test_tag_add_list_delete() {
    let app = app(None);

    let (status, body) = send(
        app.clone(),
        json_request(Method::POST, "/api/images/b/tags", json!({"tag": " tabby cat "})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tags"], json!(["tabby cat"]));

    let (_, body) = send(app.clone(), get("/api/images/b/tags")).await;
    assert_eq!(body["tags"], json!(["tabby cat"]));

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri("/api/images/b/tags/tabby%20cat")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app.clone(), delete).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(app, get("/api/images/b/tags")).await;
    assert_eq!(body["tags"], json!([]));
}

#[tokio::test]
async fn test_blank_tag_and_missing_tag_are_rejected() {
    let app = app(None);
    let (status, body) = send(
        app.clone(),
        json_request(Method::POST, "/api/images/a/tags", json!({"tag": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri("/api/images/a/tags/dog")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, delete).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Tag not found: dog");
}

#[tokio::test]
async fn test_bulk_tag_by_cluster() {
    let (status, body) = send(
        app(None),
        json_request(
            Method::POST,
            "/api/clustering/bulk-tag",
            json!({"clusterResultId": "cr1", "group_labels": {"1": "dog"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Tagged 1 images across 1 clusters");
}

#[tokio::test]
async fn test_training_needs_two_labels() {
    let (status, body) = send(
        app(None),
        json_request(
            Method::POST,
            "/api/training/train",
            json!({"training_config": {"model_architecture": "resnet18", "epochs": 3}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("two distinct labels"));
}

#[tokio::test]
async fn test_bearer_token_is_enforced() {
    let app = app(Some("s3cret"));

    let (status, body) = send(app.clone(), get("/api/datasets/ds1/items")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let authed = Request::builder()
        .uri("/api/datasets/ds1/items")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app, authed).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_gets_envelope() {
    let (status, body) = send(app(None), get("/nothing/here")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}
