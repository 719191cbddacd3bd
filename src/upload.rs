//! Sequential compress-then-upload of evidence batches.
//!
//! Files are handled one at a time so a batch never floods the CDN. A file
//! that fails is logged, marked as `error`, and the batch moves on: there is
//! no rollback of files that already landed.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compressor::{compress_file, CompressOptions};
use crate::error::{EvidenceError, Result};
use crate::hosting::{HostedImage, ImageHost, UploadTarget};
use crate::persistence::{PendingUpload, UploadPersistence, UploadSession, UploadStatus};
use crate::utils::create_batch_progress;

/// Receives the URL of every uploaded image, typically to store it on the
/// inspection record.
#[async_trait]
pub trait EvidenceRecorder: Send + Sync {
    async fn record(&self, record_id: &str, field_name: &str, url: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub source: PathBuf,
    pub target: UploadTarget,
}

impl UploadRequest {
    pub fn new(
        source: impl Into<PathBuf>,
        record_id: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: UploadTarget::new(record_id, field_name),
        }
    }

    pub fn with_custom_name(mut self, name: impl Into<String>) -> Self {
        self.target = self.target.with_custom_name(name);
        self
    }

    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileProgress {
    pub file_name: String,
    /// 0..=100
    pub progress: u8,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileProgress {
    fn pending(file_name: String) -> Self {
        Self {
            file_name,
            progress: 0,
            status: UploadStatus::Pending,
            url: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub session_id: Option<String>,
    pub files: Vec<FileProgress>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == UploadStatus::Completed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == UploadStatus::Error)
            .count()
    }

    pub fn urls(&self) -> Vec<&str> {
        self.files.iter().filter_map(|f| f.url.as_deref()).collect()
    }
}

struct Job {
    request: UploadRequest,
    file_id: Option<String>,
}

pub struct BatchUploader {
    host: Arc<dyn ImageHost>,
    options: CompressOptions,
    persistence: Option<UploadPersistence>,
    recorder: Option<Arc<dyn EvidenceRecorder>>,
}

impl BatchUploader {
    pub fn new(host: Arc<dyn ImageHost>, options: CompressOptions) -> Self {
        Self {
            host,
            options,
            persistence: None,
            recorder: None,
        }
    }

    /// Track the batch as an upload session so it can be recovered.
    pub fn with_persistence(mut self, persistence: UploadPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn EvidenceRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn provider(&self) -> &'static str {
        self.host.provider()
    }

    pub async fn upload_batch(&self, requests: &[UploadRequest]) -> BatchReport {
        let session = self.register_session(requests);
        let jobs = requests
            .iter()
            .enumerate()
            .map(|(idx, request)| Job {
                request: request.clone(),
                file_id: session.as_ref().map(|s| s.files[idx].id.clone()),
            })
            .collect();

        self.run(jobs, session.map(|s| s.id), Vec::new()).await
    }

    /// Replays the unfinished entries of a stored session. Entries whose
    /// source file is gone are marked `error` without an upload attempt.
    pub async fn resume_session(&self, session: &UploadSession) -> BatchReport {
        let mut jobs = Vec::new();
        let mut missing = Vec::new();

        for entry in session.unfinished() {
            match entry.source_path.as_ref().filter(|p| p.exists()) {
                Some(path) => jobs.push(Job {
                    request: UploadRequest {
                        source: path.clone(),
                        target: UploadTarget::new(&entry.record_id, &entry.field_name),
                    },
                    file_id: Some(entry.id.clone()),
                }),
                None => {
                    warn!(file = %entry.file_name, "source file unavailable, cannot resume");
                    self.track(Some(session.id.as_str()), Some(entry.id.as_str()), UploadStatus::Error);
                    missing.push(FileProgress {
                        error: Some("source file is no longer available".to_string()),
                        status: UploadStatus::Error,
                        ..FileProgress::pending(entry.file_name.clone())
                    });
                }
            }
        }

        info!(session_id = %session.id, replay = jobs.len(), missing = missing.len(), "resuming upload session");
        self.run(jobs, Some(session.id.clone()), missing).await
    }

    async fn run(
        &self,
        jobs: Vec<Job>,
        session_id: Option<String>,
        mut files: Vec<FileProgress>,
    ) -> BatchReport {
        let offset = files.len();
        files.extend(jobs.iter().map(|j| FileProgress::pending(j.request.file_name())));

        let progress_bar = create_batch_progress(jobs.len() as u64);

        for (idx, job) in jobs.iter().enumerate() {
            let progress = &mut files[offset + idx];
            let file_id = job.file_id.as_deref();
            progress_bar.set_message(progress.file_name.clone());

            progress.status = UploadStatus::Uploading;
            self.track(session_id.as_deref(), file_id, UploadStatus::Uploading);

            match self.upload_one(&job.request, progress).await {
                Ok(hosted) => {
                    debug!(file = %progress.file_name, url = %hosted.url, "uploaded");
                    progress.progress = 100;
                    progress.status = UploadStatus::Completed;
                    progress.url = Some(hosted.url);
                }
                Err(e) => {
                    warn!(file = %progress.file_name, error = %e, "upload failed, continuing with next file");
                    progress.status = UploadStatus::Error;
                    progress.error = Some(e.to_string());
                }
            }

            self.track(session_id.as_deref(), file_id, progress.status);
            progress_bar.inc(1);
        }

        progress_bar.finish_and_clear();
        self.retire_session(session_id.as_deref());

        BatchReport { session_id, files }
    }

    async fn upload_one(
        &self,
        request: &UploadRequest,
        progress: &mut FileProgress,
    ) -> Result<HostedImage> {
        let source = request.source.clone();
        let options = self.options.clone();
        let compressed = tokio::task::spawn_blocking(move || compress_file(&source, &options))
            .await
            .map_err(|e| EvidenceError::Encode(format!("compression task failed: {}", e)))??;
        progress.progress = 50;

        let hosted = self.host.upload(&compressed, &request.target).await?;
        progress.progress = 90;

        if let Some(recorder) = &self.recorder {
            recorder
                .record(&request.target.record_id, &request.target.field_name, &hosted.url)
                .await?;
        }

        Ok(hosted)
    }

    fn register_session(&self, requests: &[UploadRequest]) -> Option<UploadSession> {
        let persistence = self.persistence.as_ref()?;
        let files = requests
            .iter()
            .map(|r| {
                PendingUpload::new(r.file_name(), &r.target.record_id, &r.target.field_name)
                    .with_source(r.source.clone())
            })
            .collect();

        match persistence.create_session(files) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "could not persist upload session, continuing without recovery");
                None
            }
        }
    }

    fn track(&self, session_id: Option<&str>, file_id: Option<&str>, status: UploadStatus) {
        let (Some(persistence), Some(session_id), Some(file_id)) =
            (self.persistence.as_ref(), session_id, file_id)
        else {
            return;
        };
        if let Err(e) = persistence.update_file_status(session_id, file_id, status) {
            warn!(error = %e, "could not update upload session");
        }
    }

    // A session with nothing left to do is no longer worth offering.
    fn retire_session(&self, session_id: Option<&str>) {
        let (Some(persistence), Some(session_id)) = (self.persistence.as_ref(), session_id) else {
            return;
        };
        let finished = persistence
            .load_sessions()
            .map(|sessions| {
                sessions
                    .iter()
                    .find(|s| s.id == session_id)
                    .map_or(true, |s| !s.has_unfinished())
            })
            .unwrap_or(false);
        if finished {
            if let Err(e) = persistence.remove_session(session_id) {
                warn!(error = %e, "could not remove finished upload session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::CompressedImage;
    use crate::store::LocalStore;
    use image::{DynamicImage, ImageFormat};
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Host that fails for file names containing "fail" and records calls.
    #[derive(Default)]
    struct FakeHost {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageHost for FakeHost {
        fn provider(&self) -> &'static str {
            "fake"
        }

        async fn upload(
            &self,
            image: &CompressedImage,
            target: &UploadTarget,
        ) -> Result<HostedImage> {
            self.calls.lock().unwrap().push(image.file_name.clone());
            if image.file_name.contains("fail") {
                return Err(EvidenceError::Provider {
                    provider: "fake",
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(HostedImage {
                url: format!("https://cdn.test/{}/{}", target.record_id, image.file_name),
                asset_id: image.file_name.clone(),
            })
        }
    }

    #[derive(Default)]
    struct FakeRecorder {
        recorded: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl EvidenceRecorder for FakeRecorder {
        async fn record(&self, record_id: &str, field_name: &str, url: &str) -> Result<()> {
            self.recorded.lock().unwrap().push((
                record_id.to_string(),
                field_name.to_string(),
                url.to_string(),
            ));
            Ok(())
        }
    }

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        DynamicImage::new_rgb8(32, 24)
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_batch_continues_after_failure() {
        let dir = TempDir::new().unwrap();
        let requests = vec![
            UploadRequest::new(write_png(dir.path(), "fachada.png"), "12", "evidencia_fachada"),
            UploadRequest::new(write_png(dir.path(), "fail.png"), "12", "evidencia_techo"),
            UploadRequest::new(write_png(dir.path(), "cocina.png"), "12", "evidencia_cocina"),
        ];
        let host = Arc::new(FakeHost::default());
        let uploader = BatchUploader::new(host.clone(), CompressOptions::default());

        let report = uploader.upload_batch(&requests).await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.files[1].status, UploadStatus::Error);
        assert!(report.files[1].error.as_deref().unwrap().contains("boom"));
        assert_eq!(report.files[2].progress, 100);
        assert_eq!(
            *host.calls.lock().unwrap(),
            vec!["fachada.webp", "fail.webp", "cocina.webp"]
        );
    }

    #[tokio::test]
    async fn test_unreadable_file_does_not_stop_batch() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("roto.jpg");
        std::fs::write(&broken, b"not really a jpeg").unwrap();
        let requests = vec![
            UploadRequest::new(broken, "5", "evidencia_a"),
            UploadRequest::new(write_png(dir.path(), "bien.png"), "5", "evidencia_b"),
        ];
        let uploader = BatchUploader::new(Arc::new(FakeHost::default()), CompressOptions::default());

        let report = uploader.upload_batch(&requests).await;

        assert_eq!(report.files[0].status, UploadStatus::Error);
        assert_eq!(report.files[0].progress, 0);
        assert_eq!(report.files[1].status, UploadStatus::Completed);
        assert_eq!(report.urls(), vec!["https://cdn.test/5/bien.webp"]);
    }

    #[tokio::test]
    async fn test_recorder_receives_urls() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(FakeRecorder::default());
        let uploader = BatchUploader::new(Arc::new(FakeHost::default()), CompressOptions::default())
            .with_recorder(recorder.clone());

        uploader
            .upload_batch(&[UploadRequest::new(
                write_png(dir.path(), "sala.png"),
                "9",
                "evidencia_sala",
            )])
            .await;

        assert_eq!(
            *recorder.recorded.lock().unwrap(),
            vec![(
                "9".to_string(),
                "evidencia_sala".to_string(),
                "https://cdn.test/9/sala.webp".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_successful_batch_retires_session() {
        let dir = TempDir::new().unwrap();
        let persistence = UploadPersistence::new(LocalStore::open(dir.path().join("data")).unwrap());
        let uploader = BatchUploader::new(Arc::new(FakeHost::default()), CompressOptions::default())
            .with_persistence(persistence.clone());

        let report = uploader
            .upload_batch(&[UploadRequest::new(
                write_png(dir.path(), "ok.png"),
                "1",
                "evidencia_a",
            )])
            .await;

        assert!(report.session_id.is_some());
        assert!(persistence.load_sessions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_file_keeps_session_for_recovery() {
        let dir = TempDir::new().unwrap();
        let persistence = UploadPersistence::new(LocalStore::open(dir.path().join("data")).unwrap());
        let uploader = BatchUploader::new(Arc::new(FakeHost::default()), CompressOptions::default())
            .with_persistence(persistence.clone());

        uploader
            .upload_batch(&[
                UploadRequest::new(write_png(dir.path(), "ok.png"), "1", "evidencia_a"),
                UploadRequest::new(write_png(dir.path(), "fail.png"), "1", "evidencia_b"),
            ])
            .await;

        let pending = persistence.pending_sessions().unwrap();
        assert_eq!(pending.len(), 1);
        let statuses: Vec<_> = pending[0].files.iter().map(|f| f.status).collect();
        assert_eq!(statuses, vec![UploadStatus::Completed, UploadStatus::Error]);
    }

    #[tokio::test]
    async fn test_resume_replays_unfinished_entries() {
        let dir = TempDir::new().unwrap();
        let persistence = UploadPersistence::new(LocalStore::open(dir.path().join("data")).unwrap());
        let source = write_png(dir.path(), "patio.png");
        let session = persistence
            .create_session(vec![
                PendingUpload::new("patio.png", "4", "evidencia_patio").with_source(&source),
                PendingUpload::new("gone.png", "4", "evidencia_x")
                    .with_source(dir.path().join("gone.png")),
            ])
            .unwrap();

        let host = Arc::new(FakeHost::default());
        let uploader = BatchUploader::new(host.clone(), CompressOptions::default())
            .with_persistence(persistence.clone());
        let report = uploader.resume_session(&session).await;

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(*host.calls.lock().unwrap(), vec!["patio.webp"]);
        let stored = persistence.load_sessions().unwrap();
        assert_eq!(stored[0].files[0].status, UploadStatus::Completed);
        assert_eq!(stored[0].files[1].status, UploadStatus::Error);
    }
}
