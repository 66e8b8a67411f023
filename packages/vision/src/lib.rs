//! Agroscan vision core
//!
//! image bytes → [`preprocess::Preprocessor`] → [`loader::ModelLoader`] →
//! [`decision::DecisionPolicy`] → [`decision::Outcome`]

pub mod decision;
pub mod error;
pub mod loader;
pub mod manifest;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocess;

pub use decision::{DecisionPolicy, Outcome, OutcomeStatus};
pub use error::{InvalidImageError, InvalidInputError, ManifestError, ModelError, ModelLoadError};
pub use loader::{Classifier, LoadPolicy, ModelLoader, ModelSource, ModelStatus};
pub use manifest::ModelManifest;
pub use preprocess::{ImageTensor, Preprocessor};
