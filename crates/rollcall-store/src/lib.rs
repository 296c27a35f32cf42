//! rollcall-store — SQLite-backed face profiles and attendance journal.
//!
//! Descriptors are sealed with AES-256-GCM before they touch disk. The
//! attendance journal enforces at-most-one row per (user, event) via a
//! uniqueness constraint and a conditional insert.

pub mod crypto;
pub mod db;

pub use crypto::{CryptoError, DescriptorCipher};
pub use db::{AttendanceEntry, CheckinInsert, ProfileSummary, Store, StoreError};
