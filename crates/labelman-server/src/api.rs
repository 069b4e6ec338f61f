//! REST handlers for labelman-server.
//!
//! Every response uses the `{success, error, ...}` envelope the client
//! gateway expects, including failures.

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, warn};

use labelman_core::gateway::{
    BulkTagRequest, ClusterResultBody, ClusterResultData, Empty, Envelope, Gateway, MessageBody,
    SaveModelRequest, TagRequest, TagsBody, TrainBody, TrainRequest,
};
use labelman_core::LabelmanError;

use crate::state::AppState;

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/datasets/{dataset_id}/items", get(dataset_items))
        .route("/clustering/results/{cluster_result_id}", get(cluster_result))
        .route("/clustering/bulk-tag", post(bulk_tag))
        .route("/images/{image_id}/tags", get(list_tags).post(add_tag))
        .route("/images/{image_id}/tags/{tag}", delete(delete_tag))
        .route("/training/train", post(train))
        .route("/models/save", post(save_model))
        .route("/config", get(server_config))
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn ok<T: Serialize>(body: T) -> Response {
    Json(Envelope::ok(body)).into_response()
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(Envelope::<Empty>::failure(message))).into_response()
}

fn error_response(e: LabelmanError) -> Response {
    let message = e.to_string();
    let status = if message.contains("not found") {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_REQUEST
    };
    debug!(%status, error = %message, "Request failed");
    failure(status, message)
}

/// Rejects requests without the configured bearer token.
pub async fn require_token(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.token.as_deref() else {
        return next.run(req).await;
    };
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected) {
        next.run(req).await
    } else {
        warn!(path = %req.uri().path(), "Rejected request without a valid token");
        failure(StatusCode::UNAUTHORIZED, "Missing or invalid bearer token")
    }
}

pub async fn not_found() -> Response {
    failure(StatusCode::NOT_FOUND, "No such endpoint")
}

// ─── Datasets ────────────────────────────────────────────────────────────────

async fn dataset_items(State(state): State<AppState>, Path(dataset_id): Path<String>) -> Response {
    match state.backend.fetch_dataset_items(&dataset_id).await {
        Ok(payload) => ok(payload),
        Err(e) => error_response(e),
    }
}

async fn cluster_result(
    State(state): State<AppState>,
    Path(cluster_result_id): Path<String>,
) -> Response {
    match state.backend.fetch_cluster_result(&cluster_result_id).await {
        Ok(results) => ok(ClusterResultBody {
            data: Some(ClusterResultData { results }),
        }),
        Err(e) => error_response(e),
    }
}

async fn bulk_tag(State(state): State<AppState>, Json(req): Json<BulkTagRequest>) -> Response {
    match state.backend.bulk_tag_by_cluster(&req).await {
        Ok(message) => ok(MessageBody {
            message: Some(message),
        }),
        Err(e) => error_response(e),
    }
}

// ─── Tags ────────────────────────────────────────────────────────────────────

async fn list_tags(State(state): State<AppState>, Path(image_id): Path<String>) -> Response {
    match state.backend.list_tags(&image_id).await {
        Ok(tags) => ok(TagsBody { tags: Some(tags) }),
        Err(e) => error_response(e),
    }
}

async fn add_tag(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
    Json(req): Json<TagRequest>,
) -> Response {
    let tag = req.tag.trim();
    if tag.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Tag cannot be empty");
    }
    match state.backend.add_tag(&image_id, tag).await {
        Ok(()) => ok(TagsBody {
            tags: state.backend.custom_tags(&image_id),
        }),
        Err(e) => error_response(e),
    }
}

async fn delete_tag(
    State(state): State<AppState>,
    Path((image_id, tag)): Path<(String, String)>,
) -> Response {
    match state.backend.delete_tag(&image_id, &tag).await {
        Ok(()) => ok(Empty {}),
        Err(e) => error_response(e),
    }
}

// ─── Training ────────────────────────────────────────────────────────────────

async fn train(State(state): State<AppState>, Json(req): Json<TrainRequest>) -> Response {
    match state.backend.submit_training(&req).await {
        Ok(results) => ok(TrainBody {
            training_results: Some(results),
        }),
        Err(e) => error_response(e),
    }
}

async fn save_model(State(state): State<AppState>, Json(req): Json<SaveModelRequest>) -> Response {
    match state.backend.save_model(&req).await {
        Ok(()) => ok(MessageBody {
            message: Some(format!("Model '{}' saved", req.model_display_name)),
        }),
        Err(e) => error_response(e),
    }
}

async fn server_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "version": env!("CARGO_PKG_VERSION"),
        "auth": state.token.is_some(),
    }))
}
