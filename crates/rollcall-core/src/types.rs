use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Axis-aligned box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Two descriptors of different lengths were compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("descriptor shape mismatch: {left} vs {right} dimensions")]
pub struct ShapeMismatch {
    pub left: usize,
    pub right: usize,
}

/// Face descriptor vector (128-dimensional for the bundled encoder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
    /// Encoder version that produced this descriptor (e.g., "slimface-128").
    pub model_version: Option<String>,
}

impl Descriptor {
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to another descriptor.
    ///
    /// Fails with [`ShapeMismatch`] instead of zipping short: a truncated
    /// comparison would produce a plausible but wrong distance.
    pub fn distance(&self, other: &Descriptor) -> Result<f32, ShapeMismatch> {
        if self.values.len() != other.values.len() {
            return Err(ShapeMismatch {
                left: self.values.len(),
                right: other.values.len(),
            });
        }

        let sum: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        Ok(sum.sqrt())
    }
}

/// An enrolled face profile with metadata.
///
/// A volunteer may hold several labeled profiles ("normal", "glasses", ...);
/// verification scores against all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceProfile {
    pub id: String,
    pub user: String,
    pub label: String,
    pub descriptor: Descriptor,
    pub created_at: String,
}
