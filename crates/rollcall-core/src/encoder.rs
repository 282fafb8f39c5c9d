//! Face encoder via ONNX Runtime.
//!
//! Extracts 128-dimensional face encodings from RGB face crops using the
//! MobileFaceNet model. The crop is taken straight from the detector box
//! (expanded to a square with a small margin) — no landmark alignment.

use crate::types::{BoundingBox, Encoding};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ENCODER_INPUT_SIZE: usize = 112;
const ENCODER_MEAN: f32 = 127.5;
const ENCODER_STD: f32 = 127.5;
const ENCODING_DIM: usize = 128;
/// Fraction of the box size added on each side before cropping.
const CROP_MARGIN: f32 = 0.2;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0} — download mobilefacenet.onnx and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face box lies outside the frame")]
    DegenerateCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// MobileFaceNet-based face encoder.
pub struct FaceEncoder {
    session: Session,
}

impl FaceEncoder {
    /// Load the encoder ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EncoderError> {
        if !Path::new(model_path).exists() {
            return Err(EncoderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face encoder model"
        );

        Ok(Self { session })
    }

    /// Extract an encoding for a detected face in an RGB frame.
    pub fn extract(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Encoding, EncoderError> {
        let crop = crop_face(frame, width as usize, height as usize, face)
            .ok_or(EncoderError::DegenerateCrop)?;
        let input = preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("encoding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != ENCODING_DIM {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {ENCODING_DIM}-dim encoding, got {}",
                raw.len()
            )));
        }

        // L2-normalize so Euclidean distances are comparable across frames.
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|x| x / norm).collect()
        } else {
            raw
        };

        Ok(Encoding { values })
    }
}

/// Crop the face region to a square RGB patch of the encoder input size.
///
/// The detector box is expanded by [`CROP_MARGIN`] on each side, squared on
/// its longer edge, clamped to the frame, then resized with bilinear
/// sampling. Returns `None` when the clamped region is empty.
fn crop_face(frame: &[u8], width: usize, height: usize, face: &BoundingBox) -> Option<Vec<u8>> {
    if width == 0 || height == 0 || frame.len() < width * height * 3 {
        return None;
    }

    let margin_x = face.width * CROP_MARGIN;
    let margin_y = face.height * CROP_MARGIN;
    let side = (face.width + 2.0 * margin_x).max(face.height + 2.0 * margin_y);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x0 = (cx - side / 2.0).max(0.0);
    let y0 = (cy - side / 2.0).max(0.0);
    let x1 = (cx + side / 2.0).min(width as f32);
    let y1 = (cy + side / 2.0).min(height as f32);

    let crop_w = x1 - x0;
    let crop_h = y1 - y0;
    if crop_w < 1.0 || crop_h < 1.0 {
        return None;
    }

    let size = ENCODER_INPUT_SIZE;
    let mut out = vec![0u8; size * size * 3];

    for y in 0..size {
        let src_y = y0 + (y as f32 + 0.5) * crop_h / size as f32 - 0.5;
        let sy0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let sy1 = (sy0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..size {
            let src_x = x0 + (x as f32 + 0.5) * crop_w / size as f32 - 0.5;
            let sx0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let sx1 = (sx0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..3 {
                let tl = frame[(sy0 * width + sx0) * 3 + c] as f32;
                let tr = frame[(sy0 * width + sx1) * 3 + c] as f32;
                let bl = frame[(sy1 * width + sx0) * 3 + c] as f32;
                let br = frame[(sy1 * width + sx1) * 3 + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                out[(y * size + x) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    Some(out)
}

/// Preprocess a 112x112 RGB crop into a NCHW float tensor.
fn preprocess(crop: &[u8]) -> Array4<f32> {
    let size = ENCODER_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        for x in 0..size {
            for c in 0..3 {
                let pixel = crop
                    .get((y * size + x) * 3 + c)
                    .copied()
                    .unwrap_or(0) as f32;
                tensor[[0, c, y, x]] = (pixel - ENCODER_MEAN) / ENCODER_STD;
            }
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9 }
    }

    #[test]
    fn test_crop_face_output_size() {
        let w = 200usize;
        let h = 150usize;
        let frame = vec![90u8; w * h * 3];
        let crop = crop_face(&frame, w, h, &bbox(50.0, 40.0, 60.0, 60.0)).unwrap();
        assert_eq!(crop.len(), ENCODER_INPUT_SIZE * ENCODER_INPUT_SIZE * 3);
    }

    #[test]
    fn test_crop_face_uniform_stays_uniform() {
        let w = 100usize;
        let h = 100usize;
        let frame = vec![200u8; w * h * 3];
        let crop = crop_face(&frame, w, h, &bbox(20.0, 20.0, 40.0, 40.0)).unwrap();
        assert!(crop.iter().all(|&p| p == 200));
    }

    #[test]
    fn test_crop_face_clamps_to_frame_edges() {
        // Box hanging off the top-left corner still crops.
        let w = 100usize;
        let h = 100usize;
        let frame = vec![50u8; w * h * 3];
        let crop = crop_face(&frame, w, h, &bbox(-20.0, -20.0, 50.0, 50.0));
        assert!(crop.is_some());
    }

    #[test]
    fn test_crop_face_fully_outside_is_none() {
        let w = 100usize;
        let h = 100usize;
        let frame = vec![50u8; w * h * 3];
        assert!(crop_face(&frame, w, h, &bbox(200.0, 200.0, 50.0, 50.0)).is_none());
    }

    #[test]
    fn test_crop_face_short_buffer_is_none() {
        assert!(crop_face(&[0u8; 10], 100, 100, &bbox(10.0, 10.0, 20.0, 20.0)).is_none());
    }

    #[test]
    fn test_preprocess_output_shape() {
        let crop = vec![128u8; ENCODER_INPUT_SIZE * ENCODER_INPUT_SIZE * 3];
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, ENCODER_INPUT_SIZE, ENCODER_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_normalization() {
        // Pixel value 128 normalizes to (128 - 127.5) / 127.5.
        let crop = vec![128u8; ENCODER_INPUT_SIZE * ENCODER_INPUT_SIZE * 3];
        let tensor = preprocess(&crop);
        let expected = (128.0 - ENCODER_MEAN) / ENCODER_STD;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }
}
