use crate::checkin::CheckinFlow;
use crate::engine::EngineHandle;
use rollcall_store::Store;
use zbus::interface;

/// Static daemon facts surfaced by `Status`.
pub struct StatusInfo {
    pub camera_device: String,
    pub similarity_threshold: f32,
    pub max_distance: f32,
    pub api_base_url: String,
    pub key_fingerprint: String,
}

/// D-Bus interface for the Rollcall check-in daemon.
///
/// Bus name: org.ngo.Rollcall1
/// Object path: /org/ngo/Rollcall1
pub struct RollcallService {
    flow: CheckinFlow,
    engine: EngineHandle,
    store: Store,
    status: StatusInfo,
    frames_per_verify: usize,
    frames_per_enroll: usize,
}

impl RollcallService {
    pub fn new(
        flow: CheckinFlow,
        engine: EngineHandle,
        store: Store,
        status: StatusInfo,
        frames_per_verify: usize,
        frames_per_enroll: usize,
    ) -> Self {
        Self {
            flow,
            engine,
            store,
            status,
            frames_per_verify,
            frames_per_enroll,
        }
    }
}

fn fdo_err(e: impl std::fmt::Display) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "org.ngo.Rollcall1")]
impl RollcallService {
    /// Enroll a new face profile for the given user.
    async fn enroll(&self, user: &str, label: &str) -> zbus::fdo::Result<String> {
        tracing::info!(user, label, "enroll requested");
        let result = self
            .engine
            .enroll(self.frames_per_enroll)
            .await
            .map_err(fdo_err)?;
        let profile = self
            .store
            .insert_profile(user, label, &result.descriptor)
            .await
            .map_err(fdo_err)?;

        Ok(serde_json::json!({
            "id": profile.id,
            "user": profile.user,
            "label": profile.label,
            "qualityScore": result.quality_score,
            "createdAt": profile.created_at,
        })
        .to_string())
    }

    /// Run one check-in attempt for the given user and event. Returns the
    /// full outcome JSON, including the recording leg.
    async fn check_in(&self, user: &str, event_id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(user, event_id, "check-in requested");
        let outcome = self.flow.check_in(user, event_id).await.map_err(fdo_err)?;
        serde_json::to_string(&outcome).map_err(fdo_err)
    }

    /// Identify whoever is in front of the camera against every enrolled
    /// profile. No attendance is recorded.
    async fn identify(&self) -> zbus::fdo::Result<String> {
        tracing::info!("identify requested");
        let gallery = self.store.all_profiles().await.map_err(fdo_err)?;
        if gallery.is_empty() {
            return Err(fdo_err("no profiles enrolled"));
        }
        let report = self
            .engine
            .verify(gallery, self.frames_per_verify)
            .await
            .map_err(fdo_err)?;

        Ok(serde_json::json!({
            "matched": report.decision.is_match(),
            "score": report.decision.score(),
            "user": report.matched_user,
            "label": report.profile_label,
        })
        .to_string())
    }

    /// Attach a certificate URL to a recorded check-in.
    async fn attach_certificate(
        &self,
        user: &str,
        event_id: &str,
        certificate_url: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(user, event_id, "attach_certificate requested");
        let entry = self
            .flow
            .attach_certificate(user, event_id, certificate_url)
            .await
            .map_err(fdo_err)?;
        serde_json::to_string(&entry).map_err(fdo_err)
    }

    /// List enrolled face profiles for the given user.
    async fn list_profiles(&self, user: &str) -> zbus::fdo::Result<String> {
        let summaries = self.store.list_profiles(user).await.map_err(fdo_err)?;
        serde_json::to_string(&summaries).map_err(fdo_err)
    }

    /// Remove an enrolled face profile by ID.
    async fn remove_profile(&self, user: &str, profile_id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(user, profile_id, "remove_profile requested");
        self.store
            .remove_profile(user, profile_id)
            .await
            .map_err(fdo_err)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let (profiles, attendance) = self.store.counts().await.map_err(fdo_err)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "camera": self.status.camera_device,
            "similarityThreshold": self.status.similarity_threshold,
            "maxDistance": self.status.max_distance,
            "attendanceService": self.status.api_base_url,
            "keyFingerprint": self.status.key_fingerprint,
            "profiles": profiles,
            "attendance": attendance,
        })
        .to_string())
    }
}
