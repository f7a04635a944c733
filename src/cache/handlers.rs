use super::node::CacheNode;
use super::protocol::{
    DataParams, DataRequest, ENDPOINT_DATA, ENDPOINT_PEER_GET, ENDPOINT_STATS, PING_ACK,
    PeerRequest, PeerResponse, STATUS_SUCCESS, decode_message, encode_message,
};
use crate::error::{CacheError, ErrorBody};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;

/// Routes served by every cache node.
pub fn router(node: Arc<CacheNode>) -> Router {
    Router::new()
        .route(ENDPOINT_DATA, get(handle_data))
        .route(ENDPOINT_PEER_GET, post(handle_peer_get))
        .route(ENDPOINT_STATS, get(handle_stats))
        .layer(Extension(node))
}

pub fn error_response(err: &CacheError) -> Response {
    (err.status_code(), Json(ErrorBody::from(err))).into_response()
}

pub async fn handle_data(
    Extension(node): Extension<Arc<CacheNode>>,
    Query(params): Query<DataParams>,
) -> Response {
    let request = match DataRequest::try_from(params) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("[{}] rejected request: {}", node.id(), e);
            return error_response(&e);
        }
    };

    tracing::debug!("[{}] {}", node.id(), request.action());

    let outcome = match request {
        DataRequest::Ping => return (StatusCode::OK, PING_ACK).into_response(),
        DataRequest::Get { key } => node
            .get(&key)
            .await
            .map(|value| (StatusCode::OK, value.into_bytes()).into_response()),
        DataRequest::Set { key, value } => node
            .set(&key, value)
            .map(|_| (StatusCode::OK, STATUS_SUCCESS).into_response()),
        DataRequest::Delete { key } => node
            .delete(&key)
            .map(|_| (StatusCode::OK, STATUS_SUCCESS).into_response()),
    };

    outcome.unwrap_or_else(|e| {
        tracing::debug!("[{}] request failed: {}", node.id(), e);
        error_response(&e)
    })
}

pub async fn handle_peer_get(Extension(node): Extension<Arc<CacheNode>>, body: Bytes) -> Response {
    let request: PeerRequest = match decode_message(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("[{}] malformed peer request: {}", node.id(), e);
            return error_response(&e);
        }
    };

    let encoded = node.serve_peer(&request.key).await.and_then(|value| {
        encode_message(&PeerResponse {
            value: value.to_vec(),
        })
    });

    match encoded {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("[{}] failed to serve peer get {}: {}", node.id(), request.key, e);
            error_response(&e)
        }
    }
}

pub async fn handle_stats(Extension(node): Extension<Arc<CacheNode>>) -> impl IntoResponse {
    Json(node.stats())
}
