use crate::error::{ModelError, ModelLoadError};
use crate::loader::{Classifier, ModelSource};
use crate::manifest::ModelManifest;
use crate::preprocess::ImageTensor;
use std::path::PathBuf;
use std::sync::Arc;
use tract_onnx::prelude::*;

/// ONNX artifact on disk with its input fact pinned to `[1, H, W, 3]`.
#[derive(Debug, Clone)]
pub struct OnnxModelSource {
    path: PathBuf,
    height: u32,
    width: u32,
}

impl OnnxModelSource {
    pub fn new(path: impl Into<PathBuf>, height: u32, width: u32) -> Self {
        Self {
            path: path.into(),
            height,
            width,
        }
    }

    pub fn from_manifest(manifest: &ModelManifest) -> Self {
        Self::new(
            manifest.model_path.clone(),
            manifest.input_height,
            manifest.input_width,
        )
    }
}

impl ModelSource for OnnxModelSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Arc<dyn Classifier>, ModelLoadError> {
        let (h, w) = (self.height as usize, self.width as usize);
        let plan = tract_onnx::onnx()
            .model_for_path(&self.path)
            .and_then(|model| model.with_input_fact(0, f32::fact([1, h, w, 3]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| ModelLoadError::new(self.describe(), e))?;

        Ok(Arc::new(OnnxClassifier { plan }))
    }
}

struct OnnxClassifier {
    plan: TypedRunnableModel<TypedModel>,
}

impl Classifier for OnnxClassifier {
    fn infer(&self, image: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        let data = image
            .array()
            .as_slice()
            .ok_or_else(|| ModelError::Inference("input tensor is not contiguous".to_string()))?;
        let input = Tensor::from_shape(&image.shape(), data)
            .map_err(|e| ModelError::Inference(format!("invalid input tensor: {}", e)))?;

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| ModelError::Inference(format!("failed to run model: {}", e)))?;

        let scores = outputs
            .first()
            .ok_or_else(|| ModelError::Inference("model produced no outputs".to_string()))?
            .to_array_view::<f32>()
            .map_err(|e| ModelError::Inference(format!("output is not f32: {}", e)))?;

        Ok(scores.iter().copied().collect())
    }
}
