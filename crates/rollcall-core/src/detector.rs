//! UltraFace face detector via ONNX Runtime.
//!
//! Runs the version-RFB-320 model: a single-shot detector whose outputs are
//! per-anchor class scores and corner boxes normalized to [0, 1], with the
//! priors already applied by the export. Post-processing is a confidence
//! filter plus NMS.

use crate::types::FaceBox;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const ULTRAFACE_INPUT_WIDTH: u32 = 320;
const ULTRAFACE_INPUT_HEIGHT: u32 = 240;
const ULTRAFACE_MEAN: f32 = 127.0;
const ULTRAFACE_STD: f32 = 128.0;
const ULTRAFACE_CONFIDENCE_THRESHOLD: f32 = 0.7;
const ULTRAFACE_IOU_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download version-RFB-320.onnx and place it in the model dir")]
    ModelNotFound(String),
    #[error("frame is not {width}x{height} RGB8: got {actual} bytes")]
    InvalidFrame { width: u32, height: u32, actual: usize },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl From<ort::Error<ort::session::builder::SessionBuilder>> for DetectorError {
    fn from(err: ort::Error<ort::session::builder::SessionBuilder>) -> Self {
        DetectorError::Ort(err.into())
    }
}

/// UltraFace-based face detector.
#[derive(Debug)]
pub struct FaceDetector {
    session: Session,
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

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded UltraFace model"
        );

        Ok(Self { session })
    }

    /// Detect faces in an RGB8 frame, returning boxes sorted by descending
    /// confidence.
    ///
    /// An empty vec means no face cleared the confidence threshold. That is
    /// a normal outcome — the caller presents a retry affordance — never an
    /// error.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceBox>, DetectorError> {
        let input = preprocess(rgb, width, height)?;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("score tensor: {e}")))?;
        let (_, boxes) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("box tensor: {e}")))?;

        let candidates = decode(
            scores,
            boxes,
            width as f32,
            height as f32,
            ULTRAFACE_CONFIDENCE_THRESHOLD,
        );

        let mut kept = nms(candidates, ULTRAFACE_IOU_THRESHOLD);
        kept.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(kept)
    }
}

/// Resize an RGB8 frame to the UltraFace input size and normalize into a
/// NCHW float tensor.
fn preprocess(rgb: &[u8], width: u32, height: u32) -> Result<Array4<f32>, DetectorError> {
    let expected = (width as usize) * (height as usize) * 3;
    if rgb.len() < expected {
        return Err(DetectorError::InvalidFrame {
            width,
            height,
            actual: rgb.len(),
        });
    }

    let img = RgbImage::from_raw(width, height, rgb[..expected].to_vec()).ok_or(
        DetectorError::InvalidFrame {
            width,
            height,
            actual: rgb.len(),
        },
    )?;
    let resized = image::imageops::resize(
        &img,
        ULTRAFACE_INPUT_WIDTH,
        ULTRAFACE_INPUT_HEIGHT,
        FilterType::Triangle,
    );

    let mut tensor = Array4::<f32>::zeros((
        1,
        3,
        ULTRAFACE_INPUT_HEIGHT as usize,
        ULTRAFACE_INPUT_WIDTH as usize,
    ));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 - ULTRAFACE_MEAN) / ULTRAFACE_STD;
        }
    }

    Ok(tensor)
}

/// Decode flat score/box tensors into frame-space boxes.
///
/// `scores` is [1, N, 2] flattened as (background, face) pairs; `boxes` is
/// [1, N, 4] flattened corner form in [0, 1].
fn decode(
    scores: &[f32],
    boxes: &[f32],
    frame_w: f32,
    frame_h: f32,
    threshold: f32,
) -> Vec<FaceBox> {
    let count = scores.len() / 2;
    let mut out = Vec::new();

    for idx in 0..count {
        let confidence = scores[idx * 2 + 1];
        if confidence < threshold {
            continue;
        }

        let off = idx * 4;
        if off + 3 >= boxes.len() {
            break;
        }

        let x1 = (boxes[off] * frame_w).clamp(0.0, frame_w);
        let y1 = (boxes[off + 1] * frame_h).clamp(0.0, frame_h);
        let x2 = (boxes[off + 2] * frame_w).clamp(0.0, frame_w);
        let y2 = (boxes[off + 3] * frame_h).clamp(0.0, frame_h);

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        out.push(FaceBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
        });
    }

    out
}

/// Non-Maximum Suppression: keep a detection only if it does not overlap a
/// higher-confidence one beyond the IoU threshold.
fn nms(mut detections: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<FaceBox> = Vec::new();
    for det in detections {
        if kept.iter().all(|k| iou(k, &det) <= iou_threshold) {
            kept.push(det);
        }
    }
    kept
}

/// Intersection-over-Union of two boxes.
fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32, conf: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
        }
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        // Two anchors: one background-heavy, one confident face.
        let scores = [0.9, 0.1, 0.05, 0.95];
        let boxes = [0.0, 0.0, 0.5, 0.5, 0.25, 0.25, 0.75, 0.75];
        let dets = decode(&scores, &boxes, 640.0, 480.0, 0.7);

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].x, 160.0);
        assert_eq!(dets[0].y, 120.0);
        assert_eq!(dets[0].width, 320.0);
        assert_eq!(dets[0].height, 240.0);
        assert_eq!(dets[0].confidence, 0.95);
    }

    #[test]
    fn test_decode_drops_degenerate_boxes() {
        let scores = [0.0, 0.99];
        let boxes = [0.5, 0.5, 0.5, 0.5]; // zero area
        assert!(decode(&scores, &boxes, 640.0, 480.0, 0.7).is_empty());
    }

    #[test]
    fn test_decode_clamps_to_frame() {
        let scores = [0.0, 0.99];
        let boxes = [-0.1, -0.1, 1.2, 1.2];
        let dets = decode(&scores, &boxes, 640.0, 480.0, 0.7);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].x, 0.0);
        assert_eq!(dets[0].y, 0.0);
        assert_eq!(dets[0].width, 640.0);
        assert_eq!(dets[0].height, 480.0);
    }

    #[test]
    fn test_iou_identical_is_one() {
        let a = face(10.0, 10.0, 100.0, 100.0, 0.9);
        assert!((iou(&a, &a.clone()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = face(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = face(100.0, 100.0, 10.0, 10.0, 0.9);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_nms_suppresses_overlap() {
        let dets = vec![
            face(0.0, 0.0, 100.0, 100.0, 0.8),
            face(5.0, 5.0, 100.0, 100.0, 0.95),
            face(300.0, 300.0, 80.0, 80.0, 0.7),
        ];
        let kept = nms(dets, 0.3);
        assert_eq!(kept.len(), 2);
        // The higher-confidence overlapping box survives.
        assert_eq!(kept[0].confidence, 0.95);
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let rgb = vec![127u8; 64 * 48 * 3];
        let tensor = preprocess(&rgb, 64, 48).unwrap();
        assert_eq!(
            tensor.shape(),
            &[
                1,
                3,
                ULTRAFACE_INPUT_HEIGHT as usize,
                ULTRAFACE_INPUT_WIDTH as usize
            ]
        );
        // Pixel 127 normalizes to exactly 0.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_preprocess_rejects_short_buffer() {
        let rgb = vec![0u8; 10];
        assert!(matches!(
            preprocess(&rgb, 64, 48),
            Err(DetectorError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceDetector::load("/nonexistent/version-RFB-320.onnx").unwrap_err();
        assert!(matches!(err, DetectorError::ModelNotFound(_)));
    }
}
