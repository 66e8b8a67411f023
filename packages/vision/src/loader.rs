//! # Model Artifact Loader
//!
//! Holds the one classifier instance shared by every request. The classifier
//! is read-only after load, so inference runs without a lock; only the
//! first-load sequence is serialized (check, lock, check again, load).

use crate::error::{ModelError, ModelLoadError};
use crate::preprocess::ImageTensor;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A loaded model: image tensor in, one score per class out.
pub trait Classifier: Send + Sync {
    fn infer(&self, image: &ImageTensor) -> Result<Vec<f32>, ModelError>;
}

/// Produces a [`Classifier`]. Loading is blocking and runs off the async runtime.
pub trait ModelSource: Send + Sync {
    fn describe(&self) -> String;
    fn load(&self) -> Result<Arc<dyn Classifier>, ModelLoadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Loaded during startup; a failed load stays failed until restart.
    #[default]
    Eager,
    /// Loaded by the first request; a failed load is retried by the next one.
    Lazy,
}

impl std::str::FromStr for LoadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eager" => Ok(LoadPolicy::Eager),
            "lazy" => Ok(LoadPolicy::Lazy),
            other => Err(format!("unknown load policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Ready,
    NotLoaded,
    Failed,
}

enum Slot {
    Unloaded,
    Ready(Arc<dyn Classifier>),
    Failed(String),
}

pub struct ModelLoader {
    source: Arc<dyn ModelSource>,
    policy: LoadPolicy,
    num_classes: usize,
    slot: RwLock<Slot>,
    load_lock: Mutex<()>,
}

impl ModelLoader {
    pub fn new(source: Arc<dyn ModelSource>, policy: LoadPolicy, num_classes: usize) -> Self {
        Self {
            source,
            policy,
            num_classes,
            slot: RwLock::new(Slot::Unloaded),
            load_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    pub fn status(&self) -> ModelStatus {
        match &*self.slot.read() {
            Slot::Unloaded => ModelStatus::NotLoaded,
            Slot::Ready(_) => ModelStatus::Ready,
            Slot::Failed(_) => ModelStatus::Failed,
        }
    }

    /// Startup load. Concurrent callers share a single attempt.
    pub async fn load(&self) -> Result<(), ModelLoadError> {
        if self.ready().is_some() {
            return Ok(());
        }
        let _guard = self.load_lock.lock().await;
        if self.ready().is_some() {
            return Ok(());
        }
        self.load_locked().await.map(|_| ())
    }

    /// Runs one inference and checks the output against the label count.
    pub async fn infer(&self, image: ImageTensor) -> Result<Vec<f64>, ModelError> {
        let classifier = self.classifier().await?;
        let scores = tokio::task::spawn_blocking(move || classifier.infer(&image))
            .await
            .map_err(|e| ModelError::Inference(format!("inference task failed: {}", e)))??;

        if scores.len() != self.num_classes {
            return Err(ModelError::Inference(format!(
                "model returned {} scores for {} labels",
                scores.len(),
                self.num_classes
            )));
        }
        Ok(scores.into_iter().map(widen).collect())
    }

    fn ready(&self) -> Option<Arc<dyn Classifier>> {
        match &*self.slot.read() {
            Slot::Ready(classifier) => Some(classifier.clone()),
            _ => None,
        }
    }

    async fn classifier(&self) -> Result<Arc<dyn Classifier>, ModelError> {
        if let Some(classifier) = self.ready() {
            return Ok(classifier);
        }

        if self.policy == LoadPolicy::Eager {
            return Err(match &*self.slot.read() {
                Slot::Failed(reason) => ModelError::NotReady(reason.clone()),
                _ => ModelError::NotReady("model has not been loaded".to_string()),
            });
        }

        let _guard = self.load_lock.lock().await;
        if let Some(classifier) = self.ready() {
            return Ok(classifier);
        }
        self.load_locked()
            .await
            .map_err(|e| ModelError::NotReady(e.to_string()))
    }

    /// Caller must hold `load_lock`.
    async fn load_locked(&self) -> Result<Arc<dyn Classifier>, ModelLoadError> {
        let source = self.source.clone();
        let description = source.describe();
        tracing::info!("Loading model from {}", description);

        let result = tokio::task::spawn_blocking(move || source.load())
            .await
            .map_err(|e| ModelLoadError::new(description.clone(), e))
            .and_then(|r| r);

        match result {
            Ok(classifier) => {
                *self.slot.write() = Slot::Ready(classifier.clone());
                tracing::info!("Model loaded from {}", description);
                Ok(classifier)
            }
            Err(e) => {
                tracing::error!("Could not load model: {}", e);
                *self.slot.write() = Slot::Failed(e.to_string());
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLoader")
            .field("source", &self.source.describe())
            .field("policy", &self.policy)
            .field("status", &self.status())
            .finish()
    }
}

/// `f32` to `f64` through the shortest decimal that round-trips the `f32`,
/// so `0.7f32` becomes `0.7` rather than `0.699999988...`.
fn widen(score: f32) -> f64 {
    score.to_string().parse().unwrap_or(f64::from(score))
}
