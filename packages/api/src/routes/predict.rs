use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{NewScan, StoreError};
use agroscan_vision::Outcome;
use axum::Json;
use axum::extract::{Multipart, State};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// What happened to the optional save that rides along with a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    Saved,
    NotRequested,
    SkippedRejected,
    UserNotFound,
    Failed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub save_status: SaveStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scan_id: Option<i32>,
}

struct PredictForm {
    image: Option<Bytes>,
    user_email: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<PredictForm, ApiError> {
    let mut form = PredictForm {
        image: None,
        user_email: None,
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "image" => {
                form.image = Some(field.bytes().await?);
            }
            "user_email" => {
                let email = field.text().await?;
                let email = email.trim();
                if !email.is_empty() {
                    form.user_email = Some(email.to_string());
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

#[tracing::instrument(name = "POST /predict", skip(state, multipart))]
pub async fn predict(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let form = read_form(multipart).await?;
    let image = form
        .image
        .ok_or_else(|| ApiError::bad_request("No image file provided"))?;

    let outcome = state.classify_image(image).await?;

    let (save_status, scan_id) = match form.user_email {
        None => (SaveStatus::NotRequested, None),
        Some(_) if !outcome.status.is_persistable() => (SaveStatus::SkippedRejected, None),
        Some(email) => save_outcome(&state, &email, &outcome).await,
    };

    Ok(Json(PredictResponse {
        outcome,
        save_status,
        scan_id,
    }))
}

async fn save_outcome(
    state: &AppState,
    email: &str,
    outcome: &Outcome,
) -> (SaveStatus, Option<i32>) {
    let scan = NewScan {
        prediction: outcome.predicted_label.clone(),
        confidence: outcome.confidence,
        recommendation: outcome.recommendation.clone(),
    };

    match state.store.save_scan(email, scan).await {
        Ok(scan_id) => {
            metrics::counter!("scans_saved_total").increment(1);
            (SaveStatus::Saved, Some(scan_id))
        }
        Err(StoreError::UserNotFound(_)) => {
            tracing::warn!(email, "prediction not saved, unknown user");
            (SaveStatus::UserNotFound, None)
        }
        Err(e) => {
            tracing::error!("Failed to save prediction for {}: {}", email, e);
            (SaveStatus::Failed, None)
        }
    }
}
