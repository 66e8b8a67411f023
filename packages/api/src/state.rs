use agroscan_vision::{
    DecisionPolicy, ModelLoader, ModelManifest, ModelStatus, Outcome, Preprocessor,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

use crate::error::ApiError;
use crate::store::ScanStore;
use crate::token::TokenIssuer;

pub type AppState = Arc<State>;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application context built once at startup and shared by every handler.
pub struct State {
    pub store: ScanStore,
    pub model: Arc<ModelLoader>,
    pub model_version: String,
    pub preprocessor: Preprocessor,
    pub policy: DecisionPolicy,
    pub tokens: TokenIssuer,
    pub max_upload_bytes: usize,
}

impl State {
    pub fn new(
        store: ScanStore,
        model: Arc<ModelLoader>,
        manifest: &ModelManifest,
        policy: DecisionPolicy,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            store,
            model,
            model_version: manifest.version.clone(),
            preprocessor: Preprocessor::new(manifest.input_height, manifest.input_width),
            policy,
            tokens,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn model_status(&self) -> ModelStatus {
        self.model.status()
    }

    /// image bytes → tensor → scores → outcome
    pub async fn classify_image(&self, raw: Bytes) -> Result<Outcome, ApiError> {
        let preprocessor = self.preprocessor;
        let tensor = tokio::task::spawn_blocking(move || preprocessor.preprocess(&raw))
            .await
            .map_err(|e| ApiError::internal(format!("Preprocessing task failed: {}", e)))??;

        let started = Instant::now();
        let scores = self.model.infer(tensor).await?;
        metrics::histogram!("inference_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let outcome = self.policy.classify(&scores)?;
        metrics::counter!("predictions_total", "status" => outcome.status.as_str()).increment(1);
        tracing::info!(
            status = outcome.status.as_str(),
            prediction = %outcome.predicted_label,
            confidence = outcome.confidence,
            "image classified"
        );
        Ok(outcome)
    }
}
