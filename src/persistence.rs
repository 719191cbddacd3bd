//! In-flight upload bookkeeping.
//!
//! Upload sessions are written to the local store under `upload_sessions`
//! so an interrupted batch can be offered for recovery on the next start.
//! Sessions older than 24 hours are ignored and eventually purged. This is
//! a recovery aid, not a durable queue: nothing mirrors it server-side.

use crate::constants::{UPLOAD_SESSIONS_KEY, UPLOAD_SESSION_TTL_HOURS};
use crate::error::Result;
use crate::store::LocalStore;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Error,
}

impl UploadStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, UploadStatus::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpload {
    pub id: String,
    pub file_name: String,
    pub record_id: String,
    pub field_name: String,
    pub status: UploadStatus,
    /// Local file the upload came from; absent in entries written by
    /// clients that cannot replay uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

impl PendingUpload {
    pub fn new(
        file_name: impl Into<String>,
        record_id: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            record_id: record_id.into(),
            field_name: field_name.into(),
            status: UploadStatus::Pending,
            source_path: None,
        }
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: String,
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: i64,
    pub files: Vec<PendingUpload>,
}

impl UploadSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() - self.timestamp > ttl().num_milliseconds()
    }

    pub fn has_unfinished(&self) -> bool {
        self.files.iter().any(|f| !f.status.is_finished())
    }

    pub fn unfinished(&self) -> impl Iterator<Item = &PendingUpload> {
        self.files.iter().filter(|f| !f.status.is_finished())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

fn ttl() -> Duration {
    Duration::hours(UPLOAD_SESSION_TTL_HOURS)
}

#[derive(Debug, Clone)]
pub struct UploadPersistence {
    store: LocalStore,
}

impl UploadPersistence {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Every stored session, expired ones included.
    pub fn load_sessions(&self) -> Result<Vec<UploadSession>> {
        Ok(self
            .store
            .get::<Vec<UploadSession>>(UPLOAD_SESSIONS_KEY)?
            .unwrap_or_default())
    }

    fn write_sessions(&self, sessions: &[UploadSession]) -> Result<()> {
        if sessions.is_empty() {
            self.store.remove(UPLOAD_SESSIONS_KEY)
        } else {
            self.store.set(UPLOAD_SESSIONS_KEY, &sessions)
        }
    }

    pub fn create_session(&self, files: Vec<PendingUpload>) -> Result<UploadSession> {
        self.create_session_at(files, Utc::now())
    }

    pub fn create_session_at(
        &self,
        files: Vec<PendingUpload>,
        now: DateTime<Utc>,
    ) -> Result<UploadSession> {
        let session = UploadSession {
            id: Uuid::new_v4().to_string(),
            timestamp: now.timestamp_millis(),
            files,
        };
        self.save_session(&session)?;
        debug!(session_id = %session.id, files = session.files.len(), "upload session stored");
        Ok(session)
    }

    /// Inserts the session or replaces the stored one with the same id.
    pub fn save_session(&self, session: &UploadSession) -> Result<()> {
        let mut sessions = self.load_sessions()?;
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session.clone(),
            None => sessions.push(session.clone()),
        }
        self.write_sessions(&sessions)
    }

    /// Returns `false` when the session or file is unknown.
    pub fn update_file_status(
        &self,
        session_id: &str,
        file_id: &str,
        status: UploadStatus,
    ) -> Result<bool> {
        let mut sessions = self.load_sessions()?;
        let file = sessions
            .iter_mut()
            .filter(|s| s.id == session_id)
            .flat_map(|s| s.files.iter_mut())
            .find(|f| f.id == file_id);

        match file {
            Some(file) => {
                file.status = status;
                self.write_sessions(&sessions)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.load_sessions()?;
        let before = sessions.len();
        sessions.retain(|s| s.id != session_id);
        if sessions.len() != before {
            self.write_sessions(&sessions)?;
        }
        Ok(())
    }

    pub fn pending_sessions(&self) -> Result<Vec<UploadSession>> {
        self.pending_sessions_at(Utc::now())
    }

    /// Unexpired sessions that still hold at least one unfinished file.
    pub fn pending_sessions_at(&self, now: DateTime<Utc>) -> Result<Vec<UploadSession>> {
        Ok(self
            .load_sessions()?
            .into_iter()
            .filter(|s| !s.is_expired_at(now) && s.has_unfinished())
            .collect())
    }

    pub fn has_pending_uploads(&self) -> Result<bool> {
        Ok(!self.pending_sessions()?.is_empty())
    }

    pub fn clear_expired(&self) -> Result<usize> {
        self.clear_expired_at(Utc::now())
    }

    /// Drops expired sessions; returns how many were removed.
    pub fn clear_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.load_sessions()?;
        let before = sessions.len();
        sessions.retain(|s| !s.is_expired_at(now));
        let removed = before - sessions.len();
        if removed > 0 {
            self.write_sessions(&sessions)?;
        }
        Ok(removed)
    }

    pub fn clear_all(&self) -> Result<()> {
        self.store.remove(UPLOAD_SESSIONS_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn persistence(dir: &TempDir) -> UploadPersistence {
        UploadPersistence::new(LocalStore::open(dir.path()).unwrap())
    }

    fn files() -> Vec<PendingUpload> {
        vec![
            PendingUpload::new("fachada.jpg", "12", "evidencia_fachada"),
            PendingUpload::new("cocina.jpg", "12", "evidencia_cocina"),
        ]
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&UploadStatus::Uploading).unwrap(),
            "\"uploading\""
        );
    }

    #[test]
    fn test_pending_upload_uses_camel_case_keys() {
        let value = serde_json::to_value(PendingUpload::new("a.jpg", "1", "f")).unwrap();
        assert!(value.get("fileName").is_some());
        assert!(value.get("recordId").is_some());
        assert!(value.get("fieldName").is_some());
        assert!(value.get("sourcePath").is_none());
    }

    #[test]
    fn test_create_and_list_pending() {
        let dir = TempDir::new().unwrap();
        let p = persistence(&dir);
        let session = p.create_session(files()).unwrap();

        let pending = p.pending_sessions().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, session.id);
        assert!(p.has_pending_uploads().unwrap());
    }

    #[test]
    fn test_expired_sessions_are_excluded() {
        let dir = TempDir::new().unwrap();
        let p = persistence(&dir);
        let now = Utc::now();
        p.create_session_at(files(), now - Duration::hours(25)).unwrap();
        let fresh = p.create_session_at(files(), now - Duration::hours(23)).unwrap();

        let pending = p.pending_sessions_at(now).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, fresh.id);
    }

    #[test]
    fn test_exactly_ttl_is_not_expired() {
        let now = Utc::now();
        let session = UploadSession {
            id: "s".to_string(),
            timestamp: (now - Duration::hours(24)).timestamp_millis(),
            files: vec![],
        };
        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(now + Duration::milliseconds(1)));
    }

    #[test]
    fn test_completed_sessions_are_not_pending() {
        let dir = TempDir::new().unwrap();
        let p = persistence(&dir);
        let session = p.create_session(files()).unwrap();
        for file in &session.files {
            assert!(p
                .update_file_status(&session.id, &file.id, UploadStatus::Completed)
                .unwrap());
        }
        assert!(p.pending_sessions().unwrap().is_empty());
        assert_eq!(p.load_sessions().unwrap().len(), 1);
    }

    #[test]
    fn test_update_unknown_file() {
        let dir = TempDir::new().unwrap();
        let p = persistence(&dir);
        let session = p.create_session(files()).unwrap();
        assert!(!p
            .update_file_status(&session.id, "missing", UploadStatus::Error)
            .unwrap());
        assert!(!p
            .update_file_status("missing", &session.files[0].id, UploadStatus::Error)
            .unwrap());
    }

    #[test]
    fn test_clear_expired_and_remove() {
        let dir = TempDir::new().unwrap();
        let p = persistence(&dir);
        let now = Utc::now();
        p.create_session_at(files(), now - Duration::hours(48)).unwrap();
        let keep = p.create_session_at(files(), now).unwrap();

        assert_eq!(p.clear_expired_at(now).unwrap(), 1);
        assert_eq!(p.load_sessions().unwrap().len(), 1);

        p.remove_session(&keep.id).unwrap();
        assert!(p.load_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_save_session_replaces_by_id() {
        let dir = TempDir::new().unwrap();
        let p = persistence(&dir);
        let mut session = p.create_session(files()).unwrap();
        session.files.pop();
        p.save_session(&session).unwrap();

        let stored = p.load_sessions().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].files.len(), 1);
    }
}
