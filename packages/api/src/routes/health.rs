use crate::state::AppState;
use agroscan_vision::ModelStatus;
use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbStatus {
    Ok,
    Unavailable,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub model_status: ModelStatus,
    pub model_version: String,
    pub db_status: DbStatus,
}

/// Always answers 200; degraded components show up in the body.
#[tracing::instrument(name = "GET /health", skip(state))]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_status = match state.store.ping().await {
        Ok(()) => DbStatus::Ok,
        Err(e) => {
            tracing::warn!("Database ping failed: {}", e);
            DbStatus::Unavailable
        }
    };

    Json(HealthResponse {
        model_status: state.model_status(),
        model_version: state.model_version.clone(),
        db_status,
    })
}
