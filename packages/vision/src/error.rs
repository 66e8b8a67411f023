use thiserror::Error;

/// Raised while reading or validating a model manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("manifest declares no labels")]
    EmptyLabels,
    #[error("duplicate label '{0}' in manifest")]
    DuplicateLabel(String),
    #[error("out-of-domain label '{0}' is not part of the label set")]
    UnknownSentinel(String),
    #[error("input resolution must be non-zero, got {height}x{width}")]
    ZeroResolution { height: u32, width: u32 },
    #[error("confidence threshold must lie in (0, 1), got {0}")]
    InvalidThreshold(f64),
}

#[derive(Debug, Error)]
#[error("failed to load model {path}: {reason}")]
pub struct ModelLoadError {
    pub path: String,
    pub reason: String,
}

impl ModelLoadError {
    pub fn new(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures surfaced by [`crate::loader::ModelLoader::infer`].
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model is not ready: {0}")]
    NotReady(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct InvalidImageError(pub String);

/// A probability vector that violates the classifier's preconditions.
#[derive(Debug, Error, PartialEq)]
pub enum InvalidInputError {
    #[error("expected {expected} scores, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("probability vector contains no finite score")]
    NoFiniteScore,
}
