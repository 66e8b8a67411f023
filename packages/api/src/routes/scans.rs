use crate::entity::scan;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::NewScan;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SaveScanRequest {
    pub user_email: String,
    pub prediction: String,
    pub confidence: f64,
    pub recommendation: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveScanOut {
    pub scan_id: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanOut {
    pub scan_id: i32,
    pub prediction: String,
    pub confidence: f64,
    pub treatment_recommendation: String,
    /// RFC 3339, UTC
    pub date: String,
}

impl From<scan::Model> for ScanOut {
    fn from(model: scan::Model) -> Self {
        Self {
            scan_id: model.id,
            prediction: model.prediction,
            confidence: model.confidence,
            treatment_recommendation: model.recommendation,
            date: model.created_at.and_utc().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanHistory {
    pub scans: Vec<ScanOut>,
    pub count: usize,
}

impl SaveScanRequest {
    fn validate(&self, state: &AppState) -> Result<(), ApiError> {
        if self.user_email.trim().is_empty() {
            return Err(ApiError::bad_request("user_email must not be empty"));
        }
        if self.prediction.trim().is_empty() {
            return Err(ApiError::bad_request("prediction must not be empty"));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ApiError::bad_request("confidence must lie between 0 and 1"));
        }
        if self.prediction == state.policy.out_of_domain_label() {
            return Err(ApiError::bad_request("Rejected images cannot be saved"));
        }
        if !state.policy.labels().iter().any(|l| l == &self.prediction) {
            return Err(ApiError::bad_request(format!(
                "Unknown prediction label '{}'",
                self.prediction
            )));
        }
        Ok(())
    }
}

#[tracing::instrument(name = "POST /save_scan", skip(state, input), fields(email = %input.user_email))]
pub async fn save_scan(
    State(state): State<AppState>,
    Json(input): Json<SaveScanRequest>,
) -> Result<(StatusCode, Json<SaveScanOut>), ApiError> {
    input.validate(&state)?;

    let scan_id = state
        .store
        .save_scan(
            &input.user_email,
            NewScan {
                prediction: input.prediction,
                confidence: input.confidence,
                recommendation: input.recommendation,
            },
        )
        .await?;
    metrics::counter!("scans_saved_total").increment(1);

    Ok((StatusCode::CREATED, Json(SaveScanOut { scan_id })))
}

#[tracing::instrument(name = "GET /get_scans", skip(state))]
pub async fn get_scans(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<ScanHistory>, ApiError> {
    let scans: Vec<ScanOut> = state
        .store
        .list_scans(&email)
        .await?
        .into_iter()
        .map(ScanOut::from)
        .collect();

    Ok(Json(ScanHistory {
        count: scans.len(),
        scans,
    }))
}
