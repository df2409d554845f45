//! HTTP API surface - registration, membership and stats queries
//!
//! Handlers decode their inputs, delegate to the registry or the store, and
//! encode the response; no business logic lives here. Background failures
//! never reach this layer - the only store errors surfaced are from the
//! synchronous read path of `/stats`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;

use crate::registry::ServiceRegistry;
use crate::store::{MetricStore, StoreError};

mod register;
mod services;
mod stats;

pub use register::register_sidecar;
pub use services::get_services;
pub use stats::get_stats;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub store: Arc<dyn MetricStore>,
}

/// Build the router. Method mismatches (e.g. GET /register) get axum's
/// automatic 405.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/register", post(register_sidecar))
        .route("/services", get(get_services))
        .route("/stats", get(get_stats))
        .with_state(state)
}

/// Errors a handler can surface directly to the caller.
pub(crate) enum ApiError {
    /// Missing or unparseable parameters.
    BadRequest(String),
    /// The request body could not be decoded.
    Decode(String),
    /// The store read failed.
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response<Body> {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Decode(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Store(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        tracing::debug!("API error: {} - {}", status, message);

        Response::builder()
            .status(status)
            .body(Body::from(message))
            .unwrap_or_else(|_| Response::new(Body::from("Internal error building error response")))
    }
}
