//! Check-in orchestration: verification, journal guard, remote recording.
//!
//! The match decision and the recording leg are kept separate all the way
//! to the caller: "face recognized, but recording failed" is its own
//! outcome, never conflated with a failed verification.

use crate::engine::{EngineError, EngineHandle};
use rollcall_api::{ApiError, AttendanceClient, AttendanceRecord};
use rollcall_core::Decision;
use rollcall_store::{AttendanceEntry, CheckinInsert, Store, StoreError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckinError {
    #[error("user {0} has no enrolled profiles")]
    NotEnrolled(String),
    #[error("no attendance entry for {user} at {event}")]
    NoAttendance { user: String, event: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How the recording leg ended after a successful match.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordingStatus {
    /// Journaled locally and acknowledged by the attendance service.
    Recorded {
        local: AttendanceEntry,
        remote: AttendanceRecord,
    },
    /// The (user, event) pair was already journaled; nothing was re-sent.
    AlreadyRecorded { local: AttendanceEntry },
    /// The attendance service could not be reached or rejected the post.
    /// The match still stands; the provisional journal row was rolled back
    /// so a later attempt can record.
    Failed { reason: String },
}

/// Full result of one check-in attempt.
#[derive(Debug, Serialize)]
pub struct CheckinOutcome {
    pub matched: bool,
    pub score: f32,
    pub profile_label: Option<String>,
    /// Absent when the face did not match — recording is never attempted.
    pub recording: Option<RecordingStatus>,
}

/// Wires the engine, the journal, and the attendance service together.
#[derive(Clone)]
pub struct CheckinFlow {
    engine: EngineHandle,
    store: Store,
    api: AttendanceClient,
    frames_per_verify: usize,
}

impl CheckinFlow {
    pub fn new(
        engine: EngineHandle,
        store: Store,
        api: AttendanceClient,
        frames_per_verify: usize,
    ) -> Self {
        Self {
            engine,
            store,
            api,
            frames_per_verify,
        }
    }

    /// Run one check-in attempt for `user` at `event`.
    pub async fn check_in(&self, user: &str, event: &str) -> Result<CheckinOutcome, CheckinError> {
        let gallery = self.store.profiles_for_user(user).await?;
        if gallery.is_empty() {
            return Err(CheckinError::NotEnrolled(user.to_string()));
        }

        let report = self.engine.verify(gallery, self.frames_per_verify).await?;

        let score = report.decision.score();
        match report.decision {
            Decision::NotMatched { .. } => {
                tracing::info!(user, event, score, "check-in: face not matched");
                Ok(CheckinOutcome {
                    matched: false,
                    score,
                    profile_label: report.profile_label,
                    recording: None,
                })
            }
            Decision::Matched { .. } => {
                tracing::info!(
                    user,
                    event,
                    score,
                    label = report.profile_label.as_deref(),
                    "check-in: face matched"
                );
                let recording = self.record(user, event, score).await?;
                Ok(CheckinOutcome {
                    matched: true,
                    score,
                    profile_label: report.profile_label,
                    recording: Some(recording),
                })
            }
        }
    }

    /// Journal the check-in and post it to the attendance service.
    async fn record(
        &self,
        user: &str,
        event: &str,
        score: f32,
    ) -> Result<RecordingStatus, CheckinError> {
        let local = match self.store.record_checkin(user, event, score).await? {
            CheckinInsert::Duplicate(existing) => {
                tracing::info!(user, event, "check-in already journaled");
                return Ok(RecordingStatus::AlreadyRecorded { local: existing });
            }
            CheckinInsert::Fresh(row) => row,
        };

        match self.api.verify_checkin(event, score).await {
            Ok(remote) => {
                self.store.set_remote_id(&local.id, &remote.id).await?;
                let mut local = local;
                local.remote_id = Some(remote.id.clone());
                Ok(RecordingStatus::Recorded { local, remote })
            }
            Err(e) => {
                tracing::warn!(user, event, error = %e, "recording failed after match");
                // Roll back the provisional row so a retry can record. No
                // automatic retry is scheduled.
                if let Err(del) = self.store.delete_checkin(&local.id).await {
                    tracing::error!(id = %local.id, error = %del, "rollback of provisional journal row failed");
                }
                Ok(RecordingStatus::Failed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Attach a certificate URL to a recorded check-in. The remote link is
    /// best-effort: a failure is logged and the local journal still updates.
    pub async fn attach_certificate(
        &self,
        user: &str,
        event: &str,
        certificate_url: &str,
    ) -> Result<AttendanceEntry, CheckinError> {
        let Some(entry) = self.store.find_checkin(user, event).await? else {
            return Err(CheckinError::NoAttendance {
                user: user.to_string(),
                event: event.to_string(),
            });
        };

        if let Some(remote_id) = &entry.remote_id {
            if let Err(e) = self.api.attach_certificate(remote_id, certificate_url).await {
                log_certificate_failure(remote_id, &e);
            }
        } else {
            tracing::warn!(user, event, "no remote attendance id; certificate kept local only");
        }

        let updated = self
            .store
            .attach_certificate(user, event, certificate_url)
            .await?;
        Ok(updated)
    }
}

fn log_certificate_failure(remote_id: &str, e: &ApiError) {
    tracing::warn!(remote_id, error = %e, "remote certificate attach failed; continuing");
}
