use rollcall_core::detector::{DetectorError, FaceDetector};
use rollcall_core::encoder::{EncoderError, FaceEncoder};
use rollcall_core::policy::InvalidTransition;
use rollcall_core::{
    Decision, Descriptor, FaceProfile, GalleryMatch, ShapeMismatch, SimilarityComparator,
    VerifyFault, VerifySession,
};
use rollcall_hw::Camera;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] rollcall_hw::CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("{0}")]
    Shape(#[from] ShapeMismatch),
    #[error("no face detected in any captured frame")]
    NoFaceDetected,
    #[error("verification policy: {0}")]
    Policy(#[from] InvalidTransition),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of an enrollment operation.
pub struct EnrollResult {
    pub descriptor: Descriptor,
    pub quality_score: f32,
}

/// Result of one verification attempt against a gallery.
pub struct VerifyReport {
    pub decision: Decision,
    /// Profile with the best score. Present whenever the gallery was
    /// non-empty, whatever the decision — useful for operator diagnostics.
    pub profile_id: Option<String>,
    pub profile_label: Option<String>,
    /// Owner of the best-scoring profile; identifies the volunteer when the
    /// gallery spans all users.
    pub matched_user: Option<String>,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Enroll {
        frames_count: usize,
        reply: oneshot::Sender<Result<EnrollResult, EngineError>>,
    },
    Verify {
        gallery: Vec<FaceProfile>,
        frames_count: usize,
        reply: oneshot::Sender<Result<VerifyReport, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request enrollment: capture frames, detect the best face, extract a
    /// descriptor.
    pub async fn enroll(&self, frames_count: usize) -> Result<EnrollResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                frames_count,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Request verification: capture frames, detect, extract, score against
    /// the gallery, decide.
    pub async fn verify(
        &self,
        gallery: Vec<FaceProfile>,
        frames_count: usize,
    ) -> Result<VerifyReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                gallery,
                frames_count,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the camera, loads both ONNX models, discards warmup frames, then
/// enters a request loop. Fails fast at startup if any resource is
/// unavailable — serving a check-in surface with broken models would turn
/// every attempt into a late failure.
pub fn spawn_engine(
    camera_device: &str,
    detector_path: &str,
    encoder_path: &str,
    warmup_frames: usize,
    comparator: SimilarityComparator,
    threshold: f32,
) -> Result<EngineHandle, EngineError> {
    let camera = Camera::open(camera_device)?;
    tracing::info!(
        device = camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let mut detector = FaceDetector::load(detector_path)?;
    tracing::info!(path = detector_path, "UltraFace detector loaded");

    let mut encoder = FaceEncoder::load(encoder_path)?;
    tracing::info!(path = encoder_path, "descriptor encoder loaded");

    // Discard warmup frames for camera AGC/AE stabilization
    if warmup_frames > 0 {
        tracing::info!(count = warmup_frames, "discarding warmup frames");
        for _ in 0..warmup_frames {
            let _ = camera.capture_frame();
        }
    }

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        frames_count,
                        reply,
                    } => {
                        let result =
                            run_enroll(&camera, &mut detector, &mut encoder, frames_count);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Verify {
                        gallery,
                        frames_count,
                        reply,
                    } => {
                        let result = run_verify(
                            &camera,
                            &mut detector,
                            &mut encoder,
                            &comparator,
                            &gallery,
                            threshold,
                            frames_count,
                        );
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}

/// Capture frames, pick the best face (highest confidence), extract a
/// descriptor.
fn run_enroll(
    camera: &Camera,
    detector: &mut FaceDetector,
    encoder: &mut FaceEncoder,
    frames_count: usize,
) -> Result<EnrollResult, EngineError> {
    let (frames, dark_skipped) = camera.capture_frames(frames_count)?;
    tracing::debug!(
        captured = frames.len(),
        dark_skipped,
        "enroll: captured frames"
    );

    if frames.is_empty() {
        return Err(EngineError::NoFaceDetected);
    }

    // Find the frame with the best (highest confidence) face detection
    let mut best_face = None;
    let mut best_confidence = 0.0f32;
    let mut best_frame_idx = 0;

    for (i, frame) in frames.iter().enumerate() {
        let faces = detector.detect(&frame.data, frame.width, frame.height)?;
        if let Some(face) = faces.first() {
            if face.confidence > best_confidence {
                best_confidence = face.confidence;
                best_face = Some(face.clone());
                best_frame_idx = i;
            }
        }
    }

    let face = best_face.ok_or(EngineError::NoFaceDetected)?;
    let frame = &frames[best_frame_idx];

    tracing::info!(
        confidence = face.confidence,
        frame = best_frame_idx,
        "enroll: best face selected"
    );

    let descriptor = encoder.encode(&frame.data, frame.width, frame.height, &face)?;

    Ok(EnrollResult {
        descriptor,
        quality_score: best_confidence,
    })
}

/// One verification attempt, driven through the policy state machine:
/// capture, extract descriptors, score against the gallery, decide.
fn run_verify(
    camera: &Camera,
    detector: &mut FaceDetector,
    encoder: &mut FaceEncoder,
    comparator: &SimilarityComparator,
    gallery: &[FaceProfile],
    threshold: f32,
    frames_count: usize,
) -> Result<VerifyReport, EngineError> {
    let mut session = VerifySession::new(threshold);
    session.start_capture()?;

    let (frames, dark_skipped) = match camera.capture_frames(frames_count) {
        Ok(captured) => captured,
        Err(e) => {
            session.fail(VerifyFault::CameraUnavailable(e.to_string()));
            return Err(e.into());
        }
    };
    tracing::debug!(
        captured = frames.len(),
        dark_skipped,
        "verify: captured frames"
    );

    // Extract one probe descriptor per frame that shows a face.
    let mut probes: Vec<Descriptor> = Vec::new();
    for frame in &frames {
        let faces = match detector.detect(&frame.data, frame.width, frame.height) {
            Ok(faces) => faces,
            Err(e) => {
                session.fail(VerifyFault::ModelUnavailable(e.to_string()));
                return Err(e.into());
            }
        };
        let Some(face) = faces.first() else {
            continue;
        };
        match encoder.encode(&frame.data, frame.width, frame.height, face) {
            Ok(probe) => probes.push(probe),
            Err(e) => {
                session.fail(VerifyFault::ModelUnavailable(e.to_string()));
                return Err(e.into());
            }
        }
    }

    // Short-circuit: without a probe, nothing ever reaches the comparator.
    if probes.is_empty() {
        session.no_face()?;
        return Err(EngineError::NoFaceDetected);
    }

    session.begin_verify()?;

    let mut best: Option<GalleryMatch> = None;
    for probe in &probes {
        let candidate = match comparator.best_match(probe, gallery) {
            Ok(candidate) => candidate,
            Err(e) => {
                session.fail(VerifyFault::ShapeMismatch);
                return Err(e.into());
            }
        };
        if let Some(m) = candidate {
            let is_better = best.as_ref().map(|b| m.score > b.score).unwrap_or(true);
            if is_better {
                best = Some(m);
            }
        }
    }

    // An empty gallery scores 0.0 and decides NotMatched.
    let score = best.as_ref().map(|m| m.score).unwrap_or(0.0);
    let decision = session.complete(score)?;

    Ok(VerifyReport {
        decision,
        profile_id: best.as_ref().map(|m| m.profile_id.clone()),
        profile_label: best.as_ref().map(|m| m.profile_label.clone()),
        matched_user: best.map(|m| m.user),
    })
}
