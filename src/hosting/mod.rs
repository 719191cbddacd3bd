//! Image hosting backends
//!
//! Every CDN the evidence can land on implements [`ImageHost`]. The batch
//! uploader only talks to this trait, so Cloudinary, ImageKit and the
//! ImageKit proxy route are interchangeable.

pub mod cloudinary;
pub mod imagekit;
pub mod proxy;

use async_trait::async_trait;
use reqwest::Response;
use serde::{Deserialize, Serialize};

use crate::compressor::CompressedImage;
use crate::error::{EvidenceError, Result};

pub use cloudinary::{
    cloudinary_thumbnail_url, get_original_cloudinary_url, optimize_cloudinary_url,
    CloudinaryClient,
};
pub use imagekit::{optimize_imagekit_url, ImageKitClient};
pub use proxy::ProxyUploadClient;

/// Where an uploaded image belongs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub record_id: String,
    pub field_name: String,
    pub custom_name: Option<String>,
}

impl UploadTarget {
    pub fn new(record_id: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            field_name: field_name.into(),
            custom_name: None,
        }
    }

    pub fn with_custom_name(mut self, name: impl Into<String>) -> Self {
        self.custom_name = Some(name.into());
        self
    }

    /// Asset name without extension: the custom name when given, otherwise
    /// `{record}_{field}_{millis}`.
    pub fn asset_name(&self) -> String {
        match &self.custom_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => format!(
                "{}_{}_{}",
                self.record_id,
                self.field_name,
                chrono::Utc::now().timestamp_millis()
            ),
        }
    }
}

/// A stored image as reported by the CDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedImage {
    pub url: String,
    pub asset_id: String,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Short provider name used in logs and errors
    fn provider(&self) -> &'static str;

    async fn upload(&self, image: &CompressedImage, target: &UploadTarget) -> Result<HostedImage>;
}

/// Builds a `Provider` error from a non-success response, pulling the most
/// specific message the body offers.
pub(crate) async fn provider_error(provider: &'static str, response: Response) -> EvidenceError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body).unwrap_or(body);
    EvidenceError::Provider {
        provider,
        status,
        message,
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = [
        value.pointer("/error/message"),
        value.get("message"),
        value.get("details"),
        value.get("error"),
    ]
    .into_iter()
    .flatten()
    .find_map(|v| v.as_str().map(str::to_string));
    message
}
