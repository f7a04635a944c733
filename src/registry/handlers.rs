use super::service::Registry;
use super::types::{
    ENDPOINT_REGISTRY, MembersResponse, REGISTER_SUCCESS, RegistryParams, RegistryRequest,
};
use crate::cache::handlers::error_response;
use crate::cache::protocol::PING_ACK;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route(ENDPOINT_REGISTRY, get(handle_registry))
        .layer(Extension(registry))
}

pub async fn handle_registry(
    Extension(registry): Extension<Arc<Registry>>,
    Query(params): Query<RegistryParams>,
) -> Response {
    let request = match RegistryRequest::try_from(params) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Rejected registry request: {}", e);
            return error_response(&e);
        }
    };

    match request {
        RegistryRequest::Register { name } => match registry.register(&name).await {
            Ok(()) => (StatusCode::OK, REGISTER_SUCCESS).into_response(),
            Err(e) => {
                tracing::warn!("Registration of {} refused: {}", name, e);
                error_response(&e)
            }
        },
        RegistryRequest::Members => Json(MembersResponse {
            members: registry.members().await,
        })
        .into_response(),
        RegistryRequest::Ping => (StatusCode::OK, PING_ACK).into_response(),
        RegistryRequest::Route(request) => match registry.route(&request).await {
            Ok((status, body)) => (status, body).into_response(),
            Err(e) => {
                tracing::debug!("Routing {} failed: {}", request.action(), e);
                error_response(&e)
            }
        },
    }
}
