//! rollcall-core — face verification engine for volunteer event check-in.
//!
//! Detection (UltraFace) and descriptor extraction run via ONNX Runtime;
//! scoring converts Euclidean distance to a bounded similarity, and the
//! verification policy turns scores into check-in decisions.

pub mod comparator;
pub mod detector;
pub mod encoder;
pub mod policy;
pub mod types;

pub use comparator::{GalleryMatch, SimilarityComparator, DEFAULT_MAX_DISTANCE};
pub use policy::{Decision, VerifyFault, VerifySession, VerifyState, DEFAULT_MATCH_THRESHOLD};
pub use types::{Descriptor, FaceBox, FaceProfile, ShapeMismatch};
