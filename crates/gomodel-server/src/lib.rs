//! The OpenAI-compatible northbound edge.

pub mod error;
pub mod handlers;
pub mod layers;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};

use gomodel_core::SharedState;

/// Builds the ingress router. Layer order (outermost first): request-id,
/// audit capture, master-key auth, body-size limit.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/responses", post(handlers::responses))
        .route("/v1/embeddings", post(handlers::embeddings))
        .route("/v1/models", get(handlers::list_models))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(from_fn_with_state(state.clone(), layers::auth))
        .layer(from_fn_with_state(state.clone(), layers::audit))
        .layer(axum::middleware::from_fn(layers::request_id))
        .with_state(state)
}
