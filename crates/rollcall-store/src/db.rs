//! SQLite wiring for profiles and the attendance journal.
//!
//! All access goes through one `tokio_rusqlite::Connection`, so statements
//! from concurrent D-Bus handlers serialize on the connection's worker
//! thread.

use crate::crypto::{CryptoError, DescriptorCipher};
use rollcall_core::{Descriptor, FaceProfile};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS profiles (
    id            TEXT PRIMARY KEY,
    user          TEXT NOT NULL,
    label         TEXT NOT NULL,
    descriptor    BLOB NOT NULL,
    model_version TEXT,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_profiles_user ON profiles(user);

CREATE TABLE IF NOT EXISTS attendance (
    id              TEXT PRIMARY KEY,
    user            TEXT NOT NULL,
    event           TEXT NOT NULL,
    score           REAL NOT NULL,
    checked_in_at   TEXT NOT NULL,
    certificate_url TEXT,
    remote_id       TEXT,
    UNIQUE(user, event)
);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("attendance entry not found: {0}")]
    EntryNotFound(String),
}

/// Profile metadata without the descriptor — what listing surfaces expose.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub id: String,
    pub user: String,
    pub label: String,
    pub model_version: Option<String>,
    pub created_at: String,
}

/// One row of the local attendance journal.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceEntry {
    pub id: String,
    pub user: String,
    pub event: String,
    pub score: f32,
    pub checked_in_at: String,
    pub certificate_url: Option<String>,
    /// Id of the server-side AttendanceRecord once the remote post succeeds.
    pub remote_id: Option<String>,
}

/// Result of the conditional journal insert.
#[derive(Debug, Clone)]
pub enum CheckinInsert {
    /// A new row was written.
    Fresh(AttendanceEntry),
    /// The (user, event) pair was already journaled; nothing was written.
    Duplicate(AttendanceEntry),
}

/// Handle to the profile store and attendance journal.
#[derive(Clone)]
pub struct Store {
    conn: tokio_rusqlite::Connection,
    cipher: Arc<DescriptorCipher>,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn open(path: &std::path::Path, cipher: Arc<DescriptorCipher>) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = tokio_rusqlite::Connection::open(path).await?;
        Self::init(conn, cipher).await
    }

    /// In-memory store for tests.
    pub async fn open_in_memory(cipher: Arc<DescriptorCipher>) -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init(conn, cipher).await
    }

    async fn init(
        conn: tokio_rusqlite::Connection,
        cipher: Arc<DescriptorCipher>,
    ) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn, cipher })
    }

    /// Enroll a profile: seal the descriptor and insert a new row.
    pub async fn insert_profile(
        &self,
        user: &str,
        label: &str,
        descriptor: &Descriptor,
    ) -> Result<FaceProfile, StoreError> {
        let profile = FaceProfile {
            id: uuid::Uuid::new_v4().to_string(),
            user: user.to_string(),
            label: label.to_string(),
            descriptor: descriptor.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let sealed = self.cipher.seal(&descriptor.values)?;
        let row = profile.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO profiles (id, user, label, descriptor, model_version, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        row.id,
                        row.user,
                        row.label,
                        sealed,
                        row.descriptor.model_version,
                        row.created_at
                    ],
                )?;
                Ok(())
            })
            .await?;

        tracing::info!(user, label, id = %profile.id, "profile enrolled");
        Ok(profile)
    }

    /// All profiles for one user, descriptors unsealed.
    pub async fn profiles_for_user(&self, user: &str) -> Result<Vec<FaceProfile>, StoreError> {
        let user = user.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user, label, descriptor, model_version, created_at
                     FROM profiles WHERE user = ?1 ORDER BY created_at",
                )?;
                let rows = stmt
                    .query_map(params![user], sealed_profile_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        self.unseal_profiles(rows)
    }

    /// Every enrolled profile, descriptors unsealed — the identification
    /// gallery.
    pub async fn all_profiles(&self) -> Result<Vec<FaceProfile>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user, label, descriptor, model_version, created_at
                     FROM profiles ORDER BY user, created_at",
                )?;
                let rows = stmt
                    .query_map([], sealed_profile_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        self.unseal_profiles(rows)
    }

    /// Profile metadata for one user, without descriptors.
    pub async fn list_profiles(&self, user: &str) -> Result<Vec<ProfileSummary>, StoreError> {
        let user = user.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user, label, model_version, created_at
                     FROM profiles WHERE user = ?1 ORDER BY created_at",
                )?;
                let rows = stmt
                    .query_map(params![user], |row| {
                        Ok(ProfileSummary {
                            id: row.get(0)?,
                            user: row.get(1)?,
                            label: row.get(2)?,
                            model_version: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Remove one of a user's profiles. Returns false if no row matched.
    pub async fn remove_profile(&self, user: &str, id: &str) -> Result<bool, StoreError> {
        let (user, id) = (user.to_string(), id.to_string());
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM profiles WHERE user = ?1 AND id = ?2",
                    params![user, id],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(removed)
    }

    /// Conditional insert into the attendance journal.
    ///
    /// At most one row may exist per (user, event); a second check-in for
    /// the same pair returns the existing row untouched.
    pub async fn record_checkin(
        &self,
        user: &str,
        event: &str,
        score: f32,
    ) -> Result<CheckinInsert, StoreError> {
        let entry = AttendanceEntry {
            id: uuid::Uuid::new_v4().to_string(),
            user: user.to_string(),
            event: event.to_string(),
            score,
            checked_in_at: chrono::Utc::now().to_rfc3339(),
            certificate_url: None,
            remote_id: None,
        };

        let candidate = entry.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "INSERT OR IGNORE INTO attendance (id, user, event, score, checked_in_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        candidate.id,
                        candidate.user,
                        candidate.event,
                        candidate.score as f64,
                        candidate.checked_in_at
                    ],
                )?;
                if n > 0 {
                    return Ok(CheckinInsert::Fresh(candidate));
                }
                let existing = conn.query_row(
                    "SELECT id, user, event, score, checked_in_at, certificate_url, remote_id
                     FROM attendance WHERE user = ?1 AND event = ?2",
                    params![candidate.user, candidate.event],
                    entry_from_row,
                )?;
                Ok(CheckinInsert::Duplicate(existing))
            })
            .await?;
        Ok(inserted)
    }

    /// Roll back a provisional journal row (remote recording failed).
    pub async fn delete_checkin(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM attendance WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Link a journal row to its server-side AttendanceRecord.
    pub async fn set_remote_id(&self, id: &str, remote_id: &str) -> Result<(), StoreError> {
        let (id, remote_id) = (id.to_string(), remote_id.to_string());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE attendance SET remote_id = ?2 WHERE id = ?1",
                    params![id, remote_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Find the journal row for a (user, event) pair.
    pub async fn find_checkin(
        &self,
        user: &str,
        event: &str,
    ) -> Result<Option<AttendanceEntry>, StoreError> {
        let (user, event) = (user.to_string(), event.to_string());
        let entry = self
            .conn
            .call(move |conn| {
                let entry = conn
                    .query_row(
                        "SELECT id, user, event, score, checked_in_at, certificate_url, remote_id
                         FROM attendance WHERE user = ?1 AND event = ?2",
                        params![user, event],
                        entry_from_row,
                    )
                    .optional()?;
                Ok(entry)
            })
            .await?;
        Ok(entry)
    }

    /// Record a certificate URL on an existing journal row.
    pub async fn attach_certificate(
        &self,
        user: &str,
        event: &str,
        url: &str,
    ) -> Result<AttendanceEntry, StoreError> {
        let (user_owned, event_owned, url) =
            (user.to_string(), event.to_string(), url.to_string());
        let entry = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE attendance SET certificate_url = ?3 WHERE user = ?1 AND event = ?2",
                    params![user_owned, event_owned, url],
                )?;
                if n == 0 {
                    return Ok(None);
                }
                let entry = conn.query_row(
                    "SELECT id, user, event, score, checked_in_at, certificate_url, remote_id
                     FROM attendance WHERE user = ?1 AND event = ?2",
                    params![user_owned, event_owned],
                    entry_from_row,
                )?;
                Ok(Some(entry))
            })
            .await?;
        entry.ok_or_else(|| StoreError::EntryNotFound(format!("{user}/{event}")))
    }

    /// (profile count, attendance count) for status reporting.
    pub async fn counts(&self) -> Result<(i64, i64), StoreError> {
        let counts = self
            .conn
            .call(|conn| {
                let profiles =
                    conn.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?;
                let attendance =
                    conn.query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))?;
                Ok((profiles, attendance))
            })
            .await?;
        Ok(counts)
    }

    fn unseal_profiles(
        &self,
        rows: Vec<SealedProfile>,
    ) -> Result<Vec<FaceProfile>, StoreError> {
        rows.into_iter()
            .map(|row| {
                let values = self.cipher.open(&row.sealed)?;
                Ok(FaceProfile {
                    id: row.id,
                    user: row.user,
                    label: row.label,
                    descriptor: Descriptor {
                        values,
                        model_version: row.model_version,
                    },
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}

/// A profile row as read from disk, descriptor still sealed.
struct SealedProfile {
    id: String,
    user: String,
    label: String,
    sealed: Vec<u8>,
    model_version: Option<String>,
    created_at: String,
}

fn sealed_profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SealedProfile> {
    Ok(SealedProfile {
        id: row.get(0)?,
        user: row.get(1)?,
        label: row.get(2)?,
        sealed: row.get(3)?,
        model_version: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceEntry> {
    Ok(AttendanceEntry {
        id: row.get(0)?,
        user: row.get(1)?,
        event: row.get(2)?,
        score: row.get::<_, f64>(3)? as f32,
        checked_in_at: row.get(4)?,
        certificate_url: row.get(5)?,
        remote_id: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Store {
        let cipher = Arc::new(DescriptorCipher::from_key_bytes(&[3u8; 32]).unwrap());
        Store::open_in_memory(cipher).await.unwrap()
    }

    fn descriptor(values: Vec<f32>) -> Descriptor {
        Descriptor {
            values,
            model_version: Some("slimface-128".into()),
        }
    }

    #[tokio::test]
    async fn test_profile_roundtrip_through_encryption() {
        let store = store().await;
        let desc = descriptor(vec![0.1, -0.2, 0.3]);
        let saved = store.insert_profile("ana", "normal", &desc).await.unwrap();

        let loaded = store.profiles_for_user("ana").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, saved.id);
        assert_eq!(loaded[0].descriptor.values, desc.values);
        assert_eq!(loaded[0].descriptor.model_version, desc.model_version);
    }

    #[tokio::test]
    async fn test_profiles_are_scoped_by_user() {
        let store = store().await;
        store
            .insert_profile("ana", "normal", &descriptor(vec![0.1]))
            .await
            .unwrap();
        store
            .insert_profile("ben", "normal", &descriptor(vec![0.2]))
            .await
            .unwrap();

        assert_eq!(store.profiles_for_user("ana").await.unwrap().len(), 1);
        assert_eq!(store.all_profiles().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_profiles_has_no_descriptor() {
        let store = store().await;
        store
            .insert_profile("ana", "glasses", &descriptor(vec![0.1]))
            .await
            .unwrap();

        let summaries = store.list_profiles("ana").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].label, "glasses");
        assert_eq!(summaries[0].model_version.as_deref(), Some("slimface-128"));
    }

    #[tokio::test]
    async fn test_remove_profile() {
        let store = store().await;
        let saved = store
            .insert_profile("ana", "normal", &descriptor(vec![0.1]))
            .await
            .unwrap();

        assert!(store.remove_profile("ana", &saved.id).await.unwrap());
        assert!(!store.remove_profile("ana", &saved.id).await.unwrap());
        assert!(store.profiles_for_user("ana").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_profile_checks_owner() {
        let store = store().await;
        let saved = store
            .insert_profile("ana", "normal", &descriptor(vec![0.1]))
            .await
            .unwrap();
        assert!(!store.remove_profile("ben", &saved.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_checkin_is_idempotent_per_user_event() {
        let store = store().await;

        let first = store.record_checkin("ana", "ev-1", 0.91).await.unwrap();
        let CheckinInsert::Fresh(row) = first else {
            panic!("first check-in must be fresh");
        };

        let second = store.record_checkin("ana", "ev-1", 0.95).await.unwrap();
        let CheckinInsert::Duplicate(existing) = second else {
            panic!("second check-in must be a duplicate");
        };
        // The original row survives, including the original score.
        assert_eq!(existing.id, row.id);
        assert!((existing.score - 0.91).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_checkin_distinct_events_both_fresh() {
        let store = store().await;
        assert!(matches!(
            store.record_checkin("ana", "ev-1", 0.9).await.unwrap(),
            CheckinInsert::Fresh(_)
        ));
        assert!(matches!(
            store.record_checkin("ana", "ev-2", 0.9).await.unwrap(),
            CheckinInsert::Fresh(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_checkin_allows_retry() {
        let store = store().await;
        let CheckinInsert::Fresh(row) = store.record_checkin("ana", "ev-1", 0.9).await.unwrap()
        else {
            panic!("expected fresh insert");
        };

        store.delete_checkin(&row.id).await.unwrap();
        assert!(matches!(
            store.record_checkin("ana", "ev-1", 0.9).await.unwrap(),
            CheckinInsert::Fresh(_)
        ));
    }

    #[tokio::test]
    async fn test_remote_id_link() {
        let store = store().await;
        let CheckinInsert::Fresh(row) = store.record_checkin("ana", "ev-1", 0.9).await.unwrap()
        else {
            panic!("expected fresh insert");
        };

        store.set_remote_id(&row.id, "att-42").await.unwrap();
        let found = store.find_checkin("ana", "ev-1").await.unwrap().unwrap();
        assert_eq!(found.remote_id.as_deref(), Some("att-42"));
    }

    #[tokio::test]
    async fn test_attach_certificate() {
        let store = store().await;
        store.record_checkin("ana", "ev-1", 0.9).await.unwrap();

        let updated = store
            .attach_certificate("ana", "ev-1", "https://certs.example/ana.pdf")
            .await
            .unwrap();
        assert_eq!(
            updated.certificate_url.as_deref(),
            Some("https://certs.example/ana.pdf")
        );
    }

    #[tokio::test]
    async fn test_attach_certificate_without_checkin_fails() {
        let store = store().await;
        assert!(matches!(
            store.attach_certificate("ana", "ev-1", "https://x").await,
            Err(StoreError::EntryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_counts() {
        let store = store().await;
        store
            .insert_profile("ana", "normal", &descriptor(vec![0.1]))
            .await
            .unwrap();
        store.record_checkin("ana", "ev-1", 0.9).await.unwrap();
        assert_eq!(store.counts().await.unwrap(), (1, 1));
    }
}
