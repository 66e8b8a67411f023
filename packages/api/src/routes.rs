use axum::Json;
use serde::Serialize;

pub mod auth;
pub mod health;
pub mod predict;
pub mod scans;

#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub message: &'static str,
}

#[tracing::instrument(name = "GET /")]
pub async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to the Agroscan AI backend. POST a tea leaf photo to /predict.",
    })
}
