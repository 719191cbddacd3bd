mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use casita_evidence::compressor::{CompressOptions, CompressedImage};
use casita_evidence::hosting::{HostedImage, ImageHost, UploadTarget};
use casita_evidence::persistence::{PendingUpload, UploadPersistence, UploadStatus};
use casita_evidence::recovery::RecoveryPrompt;
use casita_evidence::store::LocalStore;
use casita_evidence::upload::BatchUploader;
use casita_evidence::worker::{QueueWorker, WorkerMessage};
use casita_evidence::Result;
use chrono::{Duration, Utc};

use common::{create_temp_directory, write_png};

#[derive(Default)]
struct RecordingHost {
    uploads: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ImageHost for RecordingHost {
    fn provider(&self) -> &'static str {
        "recording"
    }

    async fn upload(&self, image: &CompressedImage, target: &UploadTarget) -> Result<HostedImage> {
        self.uploads
            .lock()
            .unwrap()
            .push((image.file_name.clone(), target.field_name.clone()));
        Ok(HostedImage {
            url: format!("https://cdn.test/{}", image.file_name),
            asset_id: image.file_name.clone(),
        })
    }
}

#[tokio::test]
async fn test_worker_replays_interrupted_session() {
    let temp_dir = create_temp_directory();
    let fachada = write_png(temp_dir.path(), "fachada.png", 40, 30);
    let techo = write_png(temp_dir.path(), "techo.png", 40, 30);

    let persistence = UploadPersistence::new(LocalStore::open(temp_dir.path().join("store")).unwrap());
    let session = persistence
        .create_session(vec![
            PendingUpload::new("fachada.png", "12", "evidencia_fachada").with_source(&fachada),
            PendingUpload::new("techo.png", "12", "evidencia_techo").with_source(&techo),
        ])
        .unwrap();
    // the first file made it before the crash
    persistence
        .update_file_status(&session.id, &session.files[0].id, UploadStatus::Completed)
        .unwrap();

    let summary = RecoveryPrompt::check(&persistence).unwrap().unwrap();
    assert_eq!(summary.unfinished_files(), 1);

    let host = Arc::new(RecordingHost::default());
    let uploader = BatchUploader::new(host.clone(), CompressOptions::default());
    let (handle, worker) = QueueWorker::spawn(uploader, persistence.clone());

    RecoveryPrompt::resume(&handle);
    handle.post_message(WorkerMessage::Shutdown);
    let stats = worker.await.unwrap();

    assert_eq!(stats.runs, 1);
    assert_eq!(stats.uploaded, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(
        *host.uploads.lock().unwrap(),
        vec![("techo.webp".to_string(), "evidencia_techo".to_string())]
    );
    assert!(!persistence.has_pending_uploads().unwrap());
}

#[tokio::test]
async fn test_worker_marks_missing_sources_as_error() {
    let temp_dir = create_temp_directory();
    let persistence = UploadPersistence::new(LocalStore::open(temp_dir.path()).unwrap());
    persistence
        .create_session(vec![PendingUpload::new("perdida.png", "3", "evidencia_cocina")
            .with_source(temp_dir.path().join("perdida.png"))])
        .unwrap();

    let host = Arc::new(RecordingHost::default());
    let uploader = BatchUploader::new(host.clone(), CompressOptions::default());
    let (handle, worker) = QueueWorker::spawn(uploader, persistence.clone());
    handle.post_message(WorkerMessage::ProcessQueue);
    handle.post_message(WorkerMessage::Shutdown);
    let stats = worker.await.unwrap();

    assert_eq!(stats.failed, 1);
    assert!(host.uploads.lock().unwrap().is_empty());

    let sessions = persistence.load_sessions().unwrap();
    assert_eq!(sessions[0].files[0].status, UploadStatus::Error);
}

#[tokio::test]
async fn test_worker_drops_expired_sessions() {
    let temp_dir = create_temp_directory();
    let source = write_png(temp_dir.path(), "viejo.png", 20, 20);
    let persistence = UploadPersistence::new(LocalStore::open(temp_dir.path().join("store")).unwrap());
    persistence
        .create_session_at(
            vec![PendingUpload::new("viejo.png", "1", "evidencia_fachada").with_source(&source)],
            Utc::now() - Duration::hours(25),
        )
        .unwrap();

    let host = Arc::new(RecordingHost::default());
    let (handle, worker) = QueueWorker::spawn(
        BatchUploader::new(host.clone(), CompressOptions::default()),
        persistence.clone(),
    );
    handle.post_message(WorkerMessage::ProcessQueue);
    handle.post_message(WorkerMessage::Shutdown);
    worker.await.unwrap();

    assert!(host.uploads.lock().unwrap().is_empty());
    assert!(persistence.load_sessions().unwrap().is_empty());
}

#[tokio::test]
async fn test_worker_stops_when_handles_dropped() {
    let temp_dir = create_temp_directory();
    let persistence = UploadPersistence::new(LocalStore::open(temp_dir.path()).unwrap());
    let (handle, worker) = QueueWorker::spawn(
        BatchUploader::new(Arc::new(RecordingHost::default()), CompressOptions::default()),
        persistence,
    );
    drop(handle);
    assert_eq!(worker.await.unwrap().runs, 0);
}
