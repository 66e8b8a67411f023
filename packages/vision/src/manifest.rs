//! Versioned model manifest.
//!
//! The artifact path, its input resolution and its label vocabulary are one
//! unit: a model retrained at a different size ships a new manifest instead of
//! a tweaked constant somewhere else.

use crate::error::ManifestError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_PATH: &str = "./tea_disease_model.onnx";
pub const DEFAULT_SENTINEL: &str = "Other_Non_Tea_Leaf";

/// Label order of the v2 tea model. Keras sorts class directories by byte
/// value, which is why the sentinel sits at index 1.
const TEA_LABELS: [&str; 9] = [
    "Anthracnose",
    "Other_Non_Tea_Leaf",
    "algal leaf",
    "bird eye spot",
    "brown blight",
    "gray light",
    "healthy",
    "red leaf spot",
    "white spot",
];

const TEA_RECOMMENDATIONS: [(&str, &str); 9] = [
    (
        "Anthracnose",
        "Anthracnose disease. Prune infected parts, remove fallen leaves, and apply recommended fungicides.",
    ),
    (
        "Other_Non_Tea_Leaf",
        "The image does not look like a tea leaf. Photograph a single tea leaf against a plain background and try again.",
    ),
    (
        "algal leaf",
        "Algal leaf spot. Improve air circulation, reduce humidity, and consider copper-based fungicides if severe.",
    ),
    (
        "bird eye spot",
        "Bird's eye spot. Improve drainage, ensure proper spacing, and consider cultural practices to reduce moisture.",
    ),
    (
        "brown blight",
        "Brown blight. Improve sanitation, remove infected leaves, and use appropriate fungicides as per local recommendations.",
    ),
    (
        "gray light",
        "Gray blight. Improve air circulation, avoid overhead irrigation, and use fungicides if necessary.",
    ),
    (
        "healthy",
        "Your tea plant appears healthy! Continue good agricultural practices, including proper fertilization and pest monitoring.",
    ),
    (
        "red leaf spot",
        "Red leaf spot. Ensure balanced fertilization, especially potassium, and manage soil moisture.",
    ),
    (
        "white spot",
        "White spot. Improve plant vigor, reduce stress, and consider organic or chemical treatments.",
    ),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelManifest {
    /// Version tag reported by `/health`
    pub version: String,
    pub model_path: PathBuf,
    pub input_height: u32,
    pub input_width: u32,
    /// Class vocabulary in the index order the model was trained with
    pub labels: Vec<String>,
    pub out_of_domain_label: String,
    /// Overrides merged on top of the built-in advice table
    #[serde(default)]
    pub recommendations: HashMap<String, String>,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            version: "tea-v2-224".to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_height: 224,
            input_width: 224,
            labels: TEA_LABELS.iter().map(|l| l.to_string()).collect(),
            out_of_domain_label: DEFAULT_SENTINEL.to_string(),
            recommendations: HashMap::new(),
        }
    }
}

impl ModelManifest {
    /// Reads a JSON manifest. A relative `model_path` is resolved against the
    /// directory containing the manifest.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut manifest: ModelManifest = serde_json::from_str(&raw)?;
        if manifest.model_path.is_relative() {
            if let Some(dir) = path.parent() {
                manifest.model_path = dir.join(&manifest.model_path);
            }
        }
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn with_model_path(mut self, model_path: impl Into<PathBuf>) -> Self {
        self.model_path = model_path.into();
        self
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.labels.is_empty() {
            return Err(ManifestError::EmptyLabels);
        }
        let mut seen = HashSet::with_capacity(self.labels.len());
        for label in &self.labels {
            if !seen.insert(label.as_str()) {
                return Err(ManifestError::DuplicateLabel(label.clone()));
            }
        }
        if !seen.contains(self.out_of_domain_label.as_str()) {
            return Err(ManifestError::UnknownSentinel(
                self.out_of_domain_label.clone(),
            ));
        }
        if self.input_height == 0 || self.input_width == 0 {
            return Err(ManifestError::ZeroResolution {
                height: self.input_height,
                width: self.input_width,
            });
        }
        Ok(())
    }

    /// Built-in tea advice with the manifest's own entries layered on top.
    pub fn recommendation_table(&self) -> HashMap<String, String> {
        let mut table: HashMap<String, String> = TEA_RECOMMENDATIONS
            .iter()
            .map(|(label, text)| (label.to_string(), text.to_string()))
            .collect();
        table.extend(
            self.recommendations
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        table
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }
}
