//! UltraFace face detector via ONNX Runtime.
//!
//! Runs the version-RFB-320 UltraFace model: a single forward pass yields
//! per-anchor class scores and already-decoded corner boxes in normalized
//! coordinates, so post-processing is score filtering plus NMS.

use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DETECTOR_INPUT_WIDTH: usize = 320;
const DETECTOR_INPUT_HEIGHT: usize = 240;
const DETECTOR_MEAN: f32 = 127.0;
const DETECTOR_STD: f32 = 128.0;
const DETECTOR_CONFIDENCE_THRESHOLD: f32 = 0.7;
const DETECTOR_NMS_THRESHOLD: f32 = 0.5;
/// Per-anchor score layout: [background, face].
const DETECTOR_CLASSES: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download version-RFB-320.onnx and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// UltraFace-based face detector.
pub struct FaceDetector {
    session: Session,
    /// Output tensor indices: (scores, boxes).
    output_indices: (usize, usize),
}

impl FaceDetector {
    /// Load the UltraFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded face detector model"
        );

        if output_names.len() < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "detector model requires 2 outputs (scores, boxes), got {}",
                output_names.len()
            )));
        }

        let output_indices = discover_output_indices(&output_names);
        tracing::debug!(?output_indices, "detector output tensor mapping");

        Ok(Self { session, output_indices })
    }

    /// Detect faces in an RGB frame, returning boxes sorted by confidence.
    pub fn detect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        let input = preprocess(frame, width as usize, height as usize);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (scores_idx, boxes_idx) = self.output_indices;
        let (_, scores) = outputs[scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[boxes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        let detections = decode(
            scores,
            boxes,
            width as f32,
            height as f32,
            DETECTOR_CONFIDENCE_THRESHOLD,
        );

        let mut result = nms(detections, DETECTOR_NMS_THRESHOLD);
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(result)
    }
}

/// Discover output tensor ordering by name.
///
/// UltraFace exports name the tensors "scores" and "boxes"; fall back to the
/// standard positional ordering [scores, boxes] when the names differ.
fn discover_output_indices(names: &[String]) -> (usize, usize) {
    let scores = names.iter().position(|n| n == "scores");
    let boxes = names.iter().position(|n| n == "boxes");
    match (scores, boxes) {
        (Some(s), Some(b)) => (s, b),
        _ => {
            tracing::info!(
                ?names,
                "detector output names not recognized, using positional mapping [0]=scores, [1]=boxes"
            );
            (0, 1)
        }
    }
}

/// Preprocess an RGB frame into a NCHW float tensor.
///
/// Bilinear resize to the fixed 320x240 input, then normalize each channel
/// to the UltraFace input distribution.
fn preprocess(frame: &[u8], width: usize, height: usize) -> Array4<f32> {
    let in_w = DETECTOR_INPUT_WIDTH;
    let in_h = DETECTOR_INPUT_HEIGHT;
    let mut tensor = Array4::<f32>::zeros((1, 3, in_h, in_w));
    if width == 0 || height == 0 || frame.len() < width * height * 3 {
        return tensor;
    }

    let scale_x = width as f32 / in_w as f32;
    let scale_y = height as f32 / in_h as f32;

    for y in 0..in_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..in_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..3 {
                let tl = frame[(y0 * width + x0) * 3 + c] as f32;
                let tr = frame[(y0 * width + x1) * 3 + c] as f32;
                let bl = frame[(y1 * width + x0) * 3 + c] as f32;
                let br = frame[(y1 * width + x1) * 3 + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                tensor[[0, c, y, x]] = (val - DETECTOR_MEAN) / DETECTOR_STD;
            }
        }
    }

    tensor
}

/// Decode raw model output into frame-space bounding boxes.
///
/// `scores` is [background, face] per anchor; `boxes` is [x1, y1, x2, y2]
/// per anchor, normalized to [0, 1] relative to the model input.
fn decode(
    scores: &[f32],
    boxes: &[f32],
    frame_width: f32,
    frame_height: f32,
    threshold: f32,
) -> Vec<BoundingBox> {
    let num_anchors = scores.len() / DETECTOR_CLASSES;
    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let confidence = scores[idx * DETECTOR_CLASSES + 1];
        if confidence <= threshold {
            continue;
        }

        let box_off = idx * 4;
        if box_off + 3 >= boxes.len() {
            continue;
        }
        let x1 = (boxes[box_off].clamp(0.0, 1.0)) * frame_width;
        let y1 = (boxes[box_off + 1].clamp(0.0, 1.0)) * frame_height;
        let x2 = (boxes[box_off + 2].clamp(0.0, 1.0)) * frame_width;
        let y2 = (boxes[box_off + 3].clamp(0.0, 1.0)) * frame_height;

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
        });
    }

    detections
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppressed[j] {
                continue;
            }
            if iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection-over-Union between two bounding boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_w = (x2 - x1).max(0.0);
    let inter_h = (y2 - y1).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = a.width * a.height;
    let area_b = b.width * b.height;
    let union_area = area_a + area_b - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(detections, 0.5);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.5).is_empty());
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        // Two anchors: one confident face, one background-dominated.
        let scores = vec![0.1, 0.9, 0.8, 0.2];
        let boxes = vec![
            0.25, 0.25, 0.75, 0.75, // kept
            0.0, 0.0, 0.5, 0.5, // filtered (score 0.2)
        ];
        let dets = decode(&scores, &boxes, 640.0, 480.0, DETECTOR_CONFIDENCE_THRESHOLD);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert!((d.x - 160.0).abs() < 1e-3);
        assert!((d.y - 120.0).abs() < 1e-3);
        assert!((d.width - 320.0).abs() < 1e-3);
        assert!((d.height - 240.0).abs() < 1e-3);
        assert!((d.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_clamps_out_of_range_boxes() {
        let scores = vec![0.0, 0.99];
        let boxes = vec![-0.2, -0.2, 1.3, 1.1];
        let dets = decode(&scores, &boxes, 100.0, 100.0, 0.5);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].x, 0.0);
        assert_eq!(dets[0].y, 0.0);
        assert!((dets[0].width - 100.0).abs() < 1e-3);
        assert!((dets[0].height - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_drops_degenerate_boxes() {
        let scores = vec![0.0, 0.99];
        let boxes = vec![0.5, 0.5, 0.5, 0.6]; // zero width
        let dets = decode(&scores, &boxes, 100.0, 100.0, 0.5);
        assert!(dets.is_empty());
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = ["boxes", "scores"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (1, 0));
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = ["467", "468"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (0, 1));
    }

    #[test]
    fn test_preprocess_uniform_frame() {
        // A uniform gray frame should produce a uniform normalized tensor.
        let w = 64usize;
        let h = 48usize;
        let frame = vec![127u8; w * h * 3];
        let tensor = preprocess(&frame, w, h);
        let expected = (127.0 - DETECTOR_MEAN) / DETECTOR_STD;
        assert_eq!(tensor.shape(), &[1, 3, DETECTOR_INPUT_HEIGHT, DETECTOR_INPUT_WIDTH]);
        assert!(tensor.iter().all(|&v| (v - expected).abs() < 1e-6));
    }

    #[test]
    fn test_preprocess_short_buffer_is_zeroed() {
        let tensor = preprocess(&[0u8; 10], 64, 48);
        assert!(tensor.iter().all(|&v| v == 0.0));
    }
}
