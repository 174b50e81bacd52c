//! Appearance embedding extraction via ONNX Runtime.
//!
//! Crops a detection out of its source frame and runs it through a
//! pretrained ResNet-style backbone (classifier head removed), producing a
//! 512-dimensional feature vector. Crops that clamp below 10 px in either
//! dimension are unusable and reported as `Ok(None)`, not as errors.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

use crate::types::{BoundingBox, Embedding};

// --- Named constants ---
const EMBED_INPUT_SIZE: usize = 224;
const EMBED_DIM: usize = 512;
/// ImageNet channel statistics; the backbone was trained against these.
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Minimum usable crop edge in pixels. Anything smaller carries too little
/// appearance signal to embed.
const MIN_CROP_DIM: u32 = 10;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Boundary to the pretrained embedding model.
///
/// Contract: deterministic output for identical input, constant vector
/// length across calls. `Ok(None)` marks a record as unusable (dropped
/// from clustering); `Err` marks a failed inference (also dropped, but
/// logged by the caller as a failure rather than a skip).
pub trait EmbeddingExtractor {
    fn extract(
        &mut self,
        image: &RgbImage,
        bbox: &BoundingBox,
    ) -> Result<Option<(Embedding, RgbImage)>, EmbedderError>;
}

/// Clamp `bbox` to the image and cut the crop, or `None` if the clamped
/// region is narrower or shorter than [`MIN_CROP_DIM`].
pub fn usable_crop(image: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let (x, y, w, h) = bbox.clamp_to(image.width(), image.height())?;
    if w < MIN_CROP_DIM || h < MIN_CROP_DIM {
        return None;
    }
    Some(imageops::crop_imm(image, x, y, w, h).to_image())
}

/// ONNX-backed embedding extractor.
pub struct OnnxEmbedder {
    session: Session,
}

impl OnnxEmbedder {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded embedding model"
        );

        Ok(Self { session })
    }

    /// Preprocess a crop into a normalized NCHW float tensor.
    fn preprocess(crop: &RgbImage) -> Array4<f32> {
        let size = EMBED_INPUT_SIZE;
        let resized = imageops::resize(crop, size as u32, size as u32, FilterType::Triangle);

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let v = pixel.0[c] as f32 / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }
        tensor
    }
}

impl EmbeddingExtractor for OnnxEmbedder {
    fn extract(
        &mut self,
        image: &RgbImage,
        bbox: &BoundingBox,
    ) -> Result<Option<(Embedding, RgbImage)>, EmbedderError> {
        let Some(crop) = usable_crop(image, bbox) else {
            tracing::debug!(bbox = %bbox.to_csv(), "crop too small or outside frame; skipping");
            return Ok(None);
        };

        let input = Self::preprocess(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("feature extraction: {e}")))?;

        let values: Vec<f32> = raw.to_vec();
        if values.len() != EMBED_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBED_DIM}-dim embedding, got {}",
                values.len()
            )));
        }

        Ok(Some((Embedding::new(values), crop)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn image_of(w: u32, h: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([value, value, value]))
    }

    #[test]
    fn test_usable_crop_ok() {
        let img = image_of(100, 100, 50);
        let crop = usable_crop(&img, &BoundingBox::new(10.0, 10.0, 40.0, 60.0)).unwrap();
        assert_eq!((crop.width(), crop.height()), (30, 50));
    }

    #[test]
    fn test_usable_crop_too_narrow() {
        let img = image_of(100, 100, 50);
        assert!(usable_crop(&img, &BoundingBox::new(10.0, 10.0, 19.0, 60.0)).is_none());
    }

    #[test]
    fn test_usable_crop_too_short() {
        let img = image_of(100, 100, 50);
        assert!(usable_crop(&img, &BoundingBox::new(10.0, 10.0, 60.0, 19.0)).is_none());
    }

    #[test]
    fn test_usable_crop_exactly_minimum() {
        let img = image_of(100, 100, 50);
        let crop = usable_crop(&img, &BoundingBox::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        assert_eq!((crop.width(), crop.height()), (10, 10));
    }

    #[test]
    fn test_usable_crop_clamped_below_minimum() {
        // 40 px wide on paper, but only 5 px remain inside the frame.
        let img = image_of(100, 100, 50);
        assert!(usable_crop(&img, &BoundingBox::new(95.0, 10.0, 135.0, 60.0)).is_none());
    }

    #[test]
    fn test_usable_crop_fully_outside() {
        let img = image_of(100, 100, 50);
        assert!(usable_crop(&img, &BoundingBox::new(200.0, 200.0, 300.0, 300.0)).is_none());
        assert!(usable_crop(&img, &BoundingBox::ZERO).is_none());
    }

    #[test]
    fn test_preprocess_output_shape() {
        let crop = image_of(50, 80, 128);
        let tensor = OnnxEmbedder::preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_normalization() {
        // A uniform 255 crop maps each channel to (1.0 - mean) / std.
        let crop = image_of(32, 32, 255);
        let tensor = OnnxEmbedder::preprocess(&crop);
        for c in 0..3 {
            let expected = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            let val = tensor[[0, c, 0, 0]];
            assert!((val - expected).abs() < 1e-5, "channel {c}: {val} vs {expected}");
        }
    }

    #[test]
    fn test_preprocess_uniform_stays_uniform() {
        let crop = image_of(17, 93, 77);
        let tensor = OnnxEmbedder::preprocess(&crop);
        let first = tensor[[0, 0, 0, 0]];
        assert!(tensor
            .index_axis(ndarray::Axis(0), 0)
            .index_axis(ndarray::Axis(0), 0)
            .iter()
            .all(|&v| (v - first).abs() < 1e-6));
    }
}
