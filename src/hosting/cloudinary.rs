use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{provider_error, HostedImage, ImageHost, UploadTarget};
use crate::compressor::CompressedImage;
use crate::config::CloudinaryConfig;
use crate::constants::{CLOUDINARY_AUTO_TOKEN, CLOUDINARY_UPLOAD_SEGMENT, DEFAULT_CLOUDINARY_API};
use crate::error::Result;

const PROVIDER: &str = "cloudinary";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

/// Unsigned uploads through an upload preset.
#[derive(Debug, Clone)]
pub struct CloudinaryClient {
    client: Client,
    api_base: String,
    cloud_name: String,
    upload_preset: String,
    folder: Option<String>,
}

impl CloudinaryClient {
    pub fn new(cloud_name: impl Into<String>, upload_preset: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: DEFAULT_CLOUDINARY_API.to_string(),
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
            folder: None,
        }
    }

    pub fn from_config(config: &CloudinaryConfig) -> Result<Self> {
        let cloud_name = config.cloud_name.clone().ok_or_else(|| {
            crate::error::EvidenceError::Config("CLOUDINARY_CLOUD_NAME must be set".to_string())
        })?;
        let preset = config.upload_preset.clone().ok_or_else(|| {
            crate::error::EvidenceError::Config("CLOUDINARY_UPLOAD_PRESET must be set".to_string())
        })?;

        Ok(Self::new(cloud_name, preset)
            .with_api_base(config.api_base.clone())
            .with_folder(config.folder.clone()))
    }

    /// Overrides the API host (used by tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        let folder = folder.into();
        self.folder = (!folder.is_empty()).then_some(folder);
        self
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/v1_1/{}/image/upload",
            self.api_base.trim_end_matches('/'),
            self.cloud_name
        )
    }
}

#[async_trait]
impl ImageHost for CloudinaryClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn upload(&self, image: &CompressedImage, target: &UploadTarget) -> Result<HostedImage> {
        let file = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(image.mime_type)?;

        let mut form = Form::new()
            .part("file", file)
            .text("upload_preset", self.upload_preset.clone())
            .text("public_id", target.asset_name());
        if let Some(folder) = &self.folder {
            form = form.text("folder", folder.clone());
        }

        debug!(file = %image.file_name, bytes = image.bytes.len(), "posting to cloudinary");
        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }

        let body: UploadResponse = response.json().await?;
        Ok(HostedImage {
            url: body.secure_url,
            asset_id: body.public_id,
        })
    }
}

/// Asks Cloudinary for automatic format and quality. URLs that are not
/// Cloudinary delivery URLs, or already carry the token, come back unchanged.
pub fn optimize_cloudinary_url(url: &str) -> String {
    if !is_cloudinary_url(url) || url.contains(CLOUDINARY_AUTO_TOKEN) {
        return url.to_string();
    }
    url.replacen(
        CLOUDINARY_UPLOAD_SEGMENT,
        &format!("{}{}/", CLOUDINARY_UPLOAD_SEGMENT, CLOUDINARY_AUTO_TOKEN),
        1,
    )
}

/// Strips the automatic format/quality segment added by
/// [`optimize_cloudinary_url`].
pub fn get_original_cloudinary_url(url: &str) -> String {
    let optimized = format!("{}{}/", CLOUDINARY_UPLOAD_SEGMENT, CLOUDINARY_AUTO_TOKEN);
    url.replacen(&optimized, CLOUDINARY_UPLOAD_SEGMENT, 1)
}

/// Cropped thumbnail of `width`x`height` with automatic format/quality.
pub fn cloudinary_thumbnail_url(url: &str, width: u32, height: u32) -> String {
    if !is_cloudinary_url(url) || url.contains("/upload/c_fill,") {
        return url.to_string();
    }
    let original = get_original_cloudinary_url(url);
    original.replacen(
        CLOUDINARY_UPLOAD_SEGMENT,
        &format!(
            "{}c_fill,w_{},h_{},{}/",
            CLOUDINARY_UPLOAD_SEGMENT, width, height, CLOUDINARY_AUTO_TOKEN
        ),
        1,
    )
}

fn is_cloudinary_url(url: &str) -> bool {
    url.contains("cloudinary.com") && url.contains(CLOUDINARY_UPLOAD_SEGMENT)
}
