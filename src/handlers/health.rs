use axum::{extract::State, Json};

use crate::{models::health::HealthStatus, AppState};

/// Handler for GET /api/health
/// Returns the last probe result; probing happens on the monitor's own schedule
pub async fn get_health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.health.status())
}
