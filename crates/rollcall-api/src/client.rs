//! HTTP client for the attendance service.

use crate::wire::{
    AckResponse, AttachCertificateRequest, AttendanceRecord, VerifyCheckinRequest,
    VerifyCheckinResponse,
};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("attendance service rejected the request: {0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Client for the attendance service, bearing a service credential.
#[derive(Clone)]
pub struct AttendanceClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl AttendanceClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Record a verified check-in: `POST /api/attendance/face-verify`.
    ///
    /// Only called after the policy produced a match; the score rides along
    /// so the server can audit the decision.
    pub async fn verify_checkin(
        &self,
        event_id: &str,
        verification_score: f32,
    ) -> Result<AttendanceRecord, ApiError> {
        let url = format!("{}/api/attendance/face-verify", self.base_url);
        tracing::debug!(%url, event_id, verification_score, "posting check-in");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&VerifyCheckinRequest {
                event_id: event_id.to_string(),
                verification_score,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: VerifyCheckinResponse = response.json().await?;
        if !body.success {
            return Err(ApiError::Rejected(
                body.message.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        body.attendance.ok_or_else(|| {
            ApiError::MalformedResponse("success without an attendance record".to_string())
        })
    }

    /// Link a certificate to a recorded attendance:
    /// `POST /api/attendance/{attendanceId}/certificate`.
    ///
    /// Best-effort from the caller's point of view — a failure here never
    /// rolls back certificate issuance to the volunteer.
    pub async fn attach_certificate(
        &self,
        attendance_id: &str,
        certificate_url: &str,
    ) -> Result<(), ApiError> {
        let url = format!("{}/api/attendance/{attendance_id}/certificate", self.base_url);
        tracing::debug!(%url, "posting certificate link");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&AttachCertificateRequest {
                certificate_url: certificate_url.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let ack: AckResponse = response.json().await?;
        if !ack.success {
            return Err(ApiError::Rejected(
                ack.message.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            AttendanceClient::new("https://api.example/", "tok", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, "https://api.example");
    }
}
