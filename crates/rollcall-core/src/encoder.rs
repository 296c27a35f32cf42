//! Face descriptor encoder via ONNX Runtime.
//!
//! Produces 128-dimensional L2-normalized descriptors from face crops. The
//! dimension and normalization match the descriptors the enrollment client
//! produces, so stored and live vectors are directly comparable.

use crate::types::{Descriptor, FaceBox};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ENCODER_INPUT_SIZE: u32 = 150;
const ENCODER_MEAN: f32 = 127.5;
const ENCODER_STD: f32 = 128.0;
const ENCODER_MODEL_VERSION: &str = "slimface-128";
/// Margin added around the detector box before cropping, as a fraction of
/// the box's longer side. The detector crops tight; the encoder was trained
/// on slightly looser crops.
const CROP_MARGIN: f32 = 0.2;

/// Descriptor length the bundled encoder model emits.
pub const DESCRIPTOR_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0} — place the descriptor model in the model dir")]
    ModelNotFound(String),
    #[error("frame is not {width}x{height} RGB8: got {actual} bytes")]
    InvalidFrame { width: u32, height: u32, actual: usize },
    #[error("face box lies outside the frame")]
    BoxOutsideFrame,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("descriptor has wrong dimension: expected {expected}, got {actual}")]
    WrongDimension { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl From<ort::Error<ort::session::builder::SessionBuilder>> for EncoderError {
    fn from(err: ort::Error<ort::session::builder::SessionBuilder>) -> Self {
        EncoderError::Ort(err.into())
    }
}

/// ONNX-backed descriptor encoder.
#[derive(Debug)]
pub struct FaceEncoder {
    session: Session,
}

impl FaceEncoder {
    /// Load the descriptor ONNX model from the given path.
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
            "loaded descriptor model"
        );

        Ok(Self { session })
    }

    /// Extract a descriptor for one detected face in an RGB8 frame.
    pub fn encode(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        face: &FaceBox,
    ) -> Result<Descriptor, EncoderError> {
        let crop = square_crop(rgb, width, height, face)?;
        let input = preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("descriptor extraction: {e}")))?;

        if raw.len() != DESCRIPTOR_DIM {
            return Err(EncoderError::WrongDimension {
                expected: DESCRIPTOR_DIM,
                actual: raw.len(),
            });
        }

        Ok(Descriptor {
            values: l2_normalize(raw),
            model_version: Some(ENCODER_MODEL_VERSION.to_string()),
        })
    }
}

/// Expand the detector box to a square with margin, clamp to the frame,
/// crop, and resize to the encoder input size.
fn square_crop(
    rgb: &[u8],
    width: u32,
    height: u32,
    face: &FaceBox,
) -> Result<RgbImage, EncoderError> {
    let expected = (width as usize) * (height as usize) * 3;
    if rgb.len() < expected {
        return Err(EncoderError::InvalidFrame {
            width,
            height,
            actual: rgb.len(),
        });
    }

    let img = RgbImage::from_raw(width, height, rgb[..expected].to_vec()).ok_or(
        EncoderError::InvalidFrame {
            width,
            height,
            actual: rgb.len(),
        },
    )?;

    let side = face.width.max(face.height) * (1.0 + CROP_MARGIN);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x0 = (cx - side / 2.0).max(0.0) as u32;
    let y0 = (cy - side / 2.0).max(0.0) as u32;
    let x1 = ((cx + side / 2.0) as u32).min(width);
    let y1 = ((cy + side / 2.0) as u32).min(height);

    if x1 <= x0 || y1 <= y0 {
        return Err(EncoderError::BoxOutsideFrame);
    }

    let crop = image::imageops::crop_imm(&img, x0, y0, x1 - x0, y1 - y0).to_image();
    Ok(image::imageops::resize(
        &crop,
        ENCODER_INPUT_SIZE,
        ENCODER_INPUT_SIZE,
        FilterType::Triangle,
    ))
}

/// Normalize a 150x150 RGB crop into a NCHW float tensor.
fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let size = ENCODER_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - ENCODER_MEAN) / ENCODER_STD;
        }
    }

    tensor
}

/// Scale a raw embedding to unit length. A zero vector is returned as-is.
fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(width: u32, height: u32, value: u8) -> Vec<u8> {
        vec![value; (width * height * 3) as usize]
    }

    #[test]
    fn test_square_crop_output_size() {
        let rgb = flat_frame(640, 480, 90);
        let face = FaceBox {
            x: 200.0,
            y: 150.0,
            width: 120.0,
            height: 160.0,
            confidence: 0.9,
        };
        let crop = square_crop(&rgb, 640, 480, &face).unwrap();
        assert_eq!(crop.dimensions(), (ENCODER_INPUT_SIZE, ENCODER_INPUT_SIZE));
    }

    #[test]
    fn test_square_crop_clamps_at_frame_edge() {
        let rgb = flat_frame(320, 240, 90);
        let face = FaceBox {
            x: 300.0,
            y: 220.0,
            width: 60.0,
            height: 60.0,
            confidence: 0.9,
        };
        // Box spills past the bottom-right corner; crop clamps instead of failing.
        let crop = square_crop(&rgb, 320, 240, &face).unwrap();
        assert_eq!(crop.dimensions(), (ENCODER_INPUT_SIZE, ENCODER_INPUT_SIZE));
    }

    #[test]
    fn test_square_crop_rejects_box_outside_frame() {
        let rgb = flat_frame(320, 240, 90);
        let face = FaceBox {
            x: 500.0,
            y: 400.0,
            width: 50.0,
            height: 50.0,
            confidence: 0.9,
        };
        assert!(matches!(
            square_crop(&rgb, 320, 240, &face),
            Err(EncoderError::BoxOutsideFrame)
        ));
    }

    #[test]
    fn test_square_crop_rejects_short_buffer() {
        let face = FaceBox {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            confidence: 0.9,
        };
        assert!(matches!(
            square_crop(&[0u8; 4], 320, 240, &face),
            Err(EncoderError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn test_preprocess_normalization() {
        let crop = RgbImage::from_pixel(
            ENCODER_INPUT_SIZE,
            ENCODER_INPUT_SIZE,
            image::Rgb([128, 128, 128]),
        );
        let tensor = preprocess(&crop);
        let expected = (128.0 - ENCODER_MEAN) / ENCODER_STD;
        assert_eq!(tensor.shape(), &[1, 3, 150, 150]);
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
        assert_eq!(tensor[[0, 1, 10, 20]], tensor[[0, 2, 10, 20]]);
    }

    #[test]
    fn test_l2_normalize_unit_length() {
        let raw = vec![3.0, 4.0];
        let normalized = l2_normalize(&raw);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        let raw = vec![0.0, 0.0, 0.0];
        assert_eq!(l2_normalize(&raw), raw);
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceEncoder::load("/nonexistent/slimface.onnx").unwrap_err();
        assert!(matches!(err, EncoderError::ModelNotFound(_)));
    }
}
