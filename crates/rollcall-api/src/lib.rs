//! rollcall-api — HTTP client for the remote attendance service.
//!
//! The daemon talks to the same endpoints the web client uses: a check-in
//! post after a successful match, and a best-effort certificate attach.

pub mod client;
pub mod wire;

pub use client::{ApiError, AttendanceClient};
pub use wire::AttendanceRecord;
