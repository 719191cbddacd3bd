use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::persistence::UploadPersistence;
use crate::worker::{WorkerHandle, WorkerMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSessionSummary {
    pub session_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub unfinished: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverySummary {
    pub sessions: Vec<PendingSessionSummary>,
}

impl RecoverySummary {
    pub fn unfinished_files(&self) -> usize {
        self.sessions.iter().map(|s| s.unfinished).sum()
    }
}

/// Startup check for uploads interrupted in an earlier run.
pub struct RecoveryPrompt;

impl RecoveryPrompt {
    /// `None` when there is nothing to recover.
    pub fn check(persistence: &UploadPersistence) -> Result<Option<RecoverySummary>> {
        let sessions = persistence.pending_sessions()?;
        if sessions.is_empty() {
            return Ok(None);
        }

        Ok(Some(RecoverySummary {
            sessions: sessions
                .iter()
                .map(|s| PendingSessionSummary {
                    session_id: s.id.clone(),
                    created_at: s.created_at(),
                    unfinished: s.unfinished().count(),
                    total: s.files.len(),
                })
                .collect(),
        }))
    }

    /// Only nudges the worker; the worker does the replay.
    pub fn resume(handle: &WorkerHandle) {
        handle.post_message(WorkerMessage::ProcessQueue);
    }

    pub fn dismiss(persistence: &UploadPersistence) -> Result<()> {
        persistence.clear_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{PendingUpload, UploadStatus};
    use crate::store::LocalStore;
    use tempfile::TempDir;

    #[test]
    fn test_check_empty() {
        let dir = TempDir::new().unwrap();
        let persistence = UploadPersistence::new(LocalStore::open(dir.path()).unwrap());
        assert_eq!(RecoveryPrompt::check(&persistence).unwrap(), None);
    }

    #[test]
    fn test_check_counts_unfinished_files() {
        let dir = TempDir::new().unwrap();
        let persistence = UploadPersistence::new(LocalStore::open(dir.path()).unwrap());
        let session = persistence
            .create_session(vec![
                PendingUpload::new("a.jpg", "1", "evidencia_a"),
                PendingUpload::new("b.jpg", "1", "evidencia_b"),
                PendingUpload::new("c.jpg", "1", "evidencia_c"),
            ])
            .unwrap();
        persistence
            .update_file_status(&session.id, &session.files[0].id, UploadStatus::Completed)
            .unwrap();

        let summary = RecoveryPrompt::check(&persistence).unwrap().unwrap();
        assert_eq!(summary.sessions.len(), 1);
        assert_eq!(summary.sessions[0].total, 3);
        assert_eq!(summary.unfinished_files(), 2);
    }

    #[test]
    fn test_dismiss_clears_sessions() {
        let dir = TempDir::new().unwrap();
        let persistence = UploadPersistence::new(LocalStore::open(dir.path()).unwrap());
        persistence
            .create_session(vec![PendingUpload::new("a.jpg", "1", "evidencia_a")])
            .unwrap();

        RecoveryPrompt::dismiss(&persistence).unwrap();
        assert_eq!(RecoveryPrompt::check(&persistence).unwrap(), None);
    }
}
