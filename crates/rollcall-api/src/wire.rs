//! Wire types for the attendance service. Field names are camelCase on the
//! wire to match the existing web client.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/attendance/face-verify`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCheckinRequest {
    pub event_id: String,
    pub verification_score: f32,
}

/// Response envelope for the check-in post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCheckinResponse {
    pub success: bool,
    #[serde(default)]
    pub attendance: Option<AttendanceRecord>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Server-side attendance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub event_id: String,
    pub volunteer_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub verification_method: Option<String>,
    #[serde(default)]
    pub verification_score: Option<f32>,
    #[serde(default)]
    pub check_in: Option<String>,
    #[serde(default)]
    pub certificate_url: Option<String>,
}

/// Body of `POST /api/attendance/{attendanceId}/certificate`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachCertificateRequest {
    pub certificate_url: String,
}

/// Generic success/message acknowledgement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_request_uses_camel_case() {
        let body = VerifyCheckinRequest {
            event_id: "ev-1".into(),
            verification_score: 0.83,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["eventId"], "ev-1");
        assert!((json["verificationScore"].as_f64().unwrap() - 0.83).abs() < 1e-6);
    }

    #[test]
    fn test_verify_response_with_attendance() {
        let json = r#"{
            "success": true,
            "attendance": {
                "id": "att-9",
                "eventId": "ev-1",
                "volunteerId": "vol-3",
                "status": "attended",
                "verificationMethod": "face_recognition",
                "verificationScore": 0.83,
                "checkIn": "2025-05-01T10:00:00Z"
            }
        }"#;
        let parsed: VerifyCheckinResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.success);
        let record = parsed.attendance.unwrap();
        assert_eq!(record.id, "att-9");
        assert_eq!(record.event_id, "ev-1");
        assert_eq!(record.volunteer_id, "vol-3");
        assert_eq!(record.verification_method.as_deref(), Some("face_recognition"));
    }

    #[test]
    fn test_verify_response_failure_message_only() {
        let json = r#"{"success": false, "message": "not registered for this event"}"#;
        let parsed: VerifyCheckinResponse = serde_json::from_str(json).unwrap();
        assert!(!parsed.success);
        assert!(parsed.attendance.is_none());
        assert_eq!(
            parsed.message.as_deref(),
            Some("not registered for this event")
        );
    }

    #[test]
    fn test_certificate_request_field_name() {
        let body = AttachCertificateRequest {
            certificate_url: "https://certs.example/a.pdf".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["certificateUrl"], "https://certs.example/a.pdf");
    }
}
