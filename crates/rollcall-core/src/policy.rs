//! Verification policy: the per-attempt state machine and match decision.
//!
//! One check-in attempt walks `Idle → Capturing → Verifying` and ends in
//! `Matched`, `NotMatched`, or `Failed`. Every attempt is user-initiated;
//! there is no automatic retry or backoff. `NotMatched` and `Failed` are
//! terminal for the attempt but restartable from `Capturing`.

use thiserror::Error;

/// Similarity cutoff above which a face is declared a match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Faults that end an attempt without producing a score.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyFault {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("verification models unavailable: {0}")]
    ModelUnavailable(String),
    #[error("descriptor shape mismatch")]
    ShapeMismatch,
}

/// Outcome of a scored attempt. `NotMatched` is a negative result, not an
/// error: the attempt completed and the face simply did not clear the bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Matched { score: f32 },
    NotMatched { score: f32 },
}

impl Decision {
    pub fn score(&self) -> f32 {
        match self {
            Decision::Matched { score } | Decision::NotMatched { score } => *score,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Decision::Matched { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyState {
    Idle,
    Capturing,
    Verifying,
    Matched { score: f32 },
    NotMatched { score: f32 },
    Failed { fault: VerifyFault },
}

impl VerifyState {
    fn name(&self) -> &'static str {
        match self {
            VerifyState::Idle => "idle",
            VerifyState::Capturing => "capturing",
            VerifyState::Verifying => "verifying",
            VerifyState::Matched { .. } => "matched",
            VerifyState::NotMatched { .. } => "not-matched",
            VerifyState::Failed { .. } => "failed",
        }
    }
}

/// An event was applied in a state that does not accept it.
#[derive(Debug, Clone, Error)]
#[error("invalid transition: {event} while {state}")]
pub struct InvalidTransition {
    pub state: &'static str,
    pub event: &'static str,
}

/// Drives one verification attempt from camera start to decision.
#[derive(Debug)]
pub struct VerifySession {
    threshold: f32,
    state: VerifyState,
}

impl VerifySession {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            state: VerifyState::Idle,
        }
    }

    pub fn state(&self) -> &VerifyState {
        &self.state
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// The camera was started. Valid from `Idle` or from a finished negative
    /// attempt (`NotMatched`, `Failed`) — that is the restart path.
    pub fn start_capture(&mut self) -> Result<(), InvalidTransition> {
        match self.state {
            VerifyState::Idle | VerifyState::NotMatched { .. } | VerifyState::Failed { .. } => {
                self.state = VerifyState::Capturing;
                Ok(())
            }
            _ => Err(self.rejected("start_capture")),
        }
    }

    /// A frame with a detected face was handed to the encoder.
    pub fn begin_verify(&mut self) -> Result<(), InvalidTransition> {
        match self.state {
            VerifyState::Capturing => {
                self.state = VerifyState::Verifying;
                Ok(())
            }
            _ => Err(self.rejected("begin_verify")),
        }
    }

    /// Short-circuit: the extractor reported no face while capturing. The
    /// attempt fails without a descriptor ever reaching the comparator.
    pub fn no_face(&mut self) -> Result<(), InvalidTransition> {
        match self.state {
            VerifyState::Capturing => {
                self.state = VerifyState::Failed {
                    fault: VerifyFault::NoFaceDetected,
                };
                Ok(())
            }
            _ => Err(self.rejected("no_face")),
        }
    }

    /// A similarity score arrived; decide match / no-match against the
    /// threshold and finish the attempt.
    pub fn complete(&mut self, score: f32) -> Result<Decision, InvalidTransition> {
        match self.state {
            VerifyState::Verifying => {
                let decision = if score >= self.threshold {
                    Decision::Matched { score }
                } else {
                    Decision::NotMatched { score }
                };
                self.state = match decision {
                    Decision::Matched { score } => VerifyState::Matched { score },
                    Decision::NotMatched { score } => VerifyState::NotMatched { score },
                };
                Ok(decision)
            }
            _ => Err(self.rejected("complete")),
        }
    }

    /// An I/O fault ended the attempt. Accepted from any state; the session
    /// stays restartable via `start_capture`.
    pub fn fail(&mut self, fault: VerifyFault) {
        self.state = VerifyState::Failed { fault };
    }

    fn rejected(&self, event: &'static str) -> InvalidTransition {
        InvalidTransition {
            state: self.state.name(),
            event,
        }
    }
}
