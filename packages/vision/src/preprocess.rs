use crate::error::InvalidImageError;
use image::imageops::{self, FilterType};
use ndarray::Array4;

const UNREADABLE: &str = "Invalid image file. Could not identify image format.";

/// Batched NHWC float tensor fed to the classifier, shape `(1, H, W, 3)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(pub Array4<f32>);

impl ImageTensor {
    pub fn shape(&self) -> [usize; 4] {
        let s = self.0.shape();
        [s[0], s[1], s[2], s[3]]
    }

    pub fn array(&self) -> &Array4<f32> {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
    height: u32,
    width: u32,
}

impl Preprocessor {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    /// Decodes, converts to RGB, resizes and scales pixels into `[0, 1]`.
    pub fn preprocess(&self, raw: &[u8]) -> Result<ImageTensor, InvalidImageError> {
        if raw.is_empty() {
            return Err(InvalidImageError(UNREADABLE.to_string()));
        }
        let decoded = image::load_from_memory(raw).map_err(|e| {
            tracing::debug!("image decode failed: {}", e);
            InvalidImageError(UNREADABLE.to_string())
        })?;

        // Palette, grayscale and alpha sources all collapse to 8-bit RGB here.
        let rgb = decoded.to_rgb8();
        let resized = imageops::resize(&rgb, self.width, self.height, FilterType::CatmullRom);

        let (h, w) = (self.height as usize, self.width as usize);
        let tensor = Array4::<f32>::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
            let p = resized.get_pixel(x as u32, y as u32);
            p[c] as f32 / 255.0
        });
        Ok(ImageTensor(tensor))
    }
}
