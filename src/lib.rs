pub mod logger;

pub mod auth;
pub mod cli;
pub mod compressor;
pub mod config;
pub mod constants;
pub mod error;
pub mod files;
pub mod formats;
pub mod hosting;
pub mod persistence;
pub mod recovery;
pub mod server;
pub mod store;
pub mod supabase;
pub mod upload;
pub mod utils;
pub mod worker;

pub use auth::{AuthService, Session, UserDirectory};
pub use compressor::{
    compress_bytes, compress_file, compress_to_dir, compressed_file_name, fit_to_max_width,
    CompressOptions, CompressedImage,
};
pub use config::Config;
pub use error::{EvidenceError, Result};
pub use files::{collect_image_files, is_image_file};
pub use formats::OutputFormat;
pub use hosting::{
    cloudinary_thumbnail_url, get_original_cloudinary_url, optimize_cloudinary_url,
    optimize_imagekit_url, CloudinaryClient, HostedImage, ImageHost, ImageKitClient,
    ProxyUploadClient, UploadTarget,
};
pub use persistence::{PendingUpload, UploadPersistence, UploadSession, UploadStatus};
pub use recovery::{RecoveryPrompt, RecoverySummary};
pub use store::LocalStore;
pub use supabase::{Revision, SupabaseClient};
pub use upload::{BatchReport, BatchUploader, EvidenceRecorder, FileProgress, UploadRequest};
pub use worker::{QueueWorker, WorkerHandle, WorkerMessage, WorkerStats};
