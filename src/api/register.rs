// Register endpoint - admits a sidecar into the service registry

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::model::{RegisterRequest, RegisterResponse};
use crate::registry::RegistryError;

use super::{ApiError, AppState};

/// POST /register - body is a `RegisterRequest`.
///
/// 200 with `code: 0` on success; 409 with `code: 1` and the canonical
/// message for a duplicate `(service_name, control_address)`; 400 for empty
/// fields; 500 when the body does not decode.
pub async fn register_sidecar(State(state): State<AppState>, body: Bytes) -> Response {
    let request: RegisterRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return ApiError::Decode(err.to_string()).into_response(),
    };

    match state.registry.register(&request) {
        Ok(()) => (StatusCode::OK, Json(RegisterResponse::success())).into_response(),
        Err(RegistryError::AlreadyRegistered) => (
            StatusCode::CONFLICT,
            Json(RegisterResponse::failed("Registrant already exists!")),
        )
            .into_response(),
        Err(RegistryError::ShuttingDown) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(RegisterResponse::failed("registry is shutting down")),
        )
            .into_response(),
        // InvalidArgument; NotFound cannot come out of register
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(RegisterResponse::failed(&err.to_string())),
        )
            .into_response(),
    }
}
