// Services endpoint - snapshot of the current registry membership

use axum::extract::State;
use axum::Json;

use crate::model::ServiceInfos;

use super::AppState;

/// GET /services
pub async fn get_services(State(state): State<AppState>) -> Json<ServiceInfos> {
    Json(ServiceInfos {
        services: state.registry.services(),
    })
}
