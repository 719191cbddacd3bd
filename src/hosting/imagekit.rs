use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{provider_error, HostedImage, ImageHost, UploadTarget};
use crate::compressor::CompressedImage;
use crate::config::ImageKitConfig;
use crate::constants::{DEFAULT_IMAGEKIT_UPLOAD_API, IMAGEKIT_TRANSFORM_PREFIX};
use crate::error::{EvidenceError, Result};

const PROVIDER: &str = "imagekit";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_id: String,
    url: String,
}

/// Server-side ImageKit client. Authenticates with the private key, so it
/// must never be handed to untrusted callers; browsers go through the
/// `/api/upload-imagekit` route instead.
#[derive(Debug, Clone)]
pub struct ImageKitClient {
    client: Client,
    upload_base: String,
    private_key: String,
    folder: Option<String>,
}

impl ImageKitClient {
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            upload_base: DEFAULT_IMAGEKIT_UPLOAD_API.to_string(),
            private_key: private_key.into(),
            folder: None,
        }
    }

    pub fn from_config(config: &ImageKitConfig) -> Result<Self> {
        let key = config
            .private_key
            .clone()
            .ok_or_else(|| EvidenceError::Config("IMAGEKIT_PRIVATE_KEY must be set".to_string()))?;
        Ok(Self::new(key)
            .with_upload_base(config.upload_base.clone())
            .with_folder(config.folder.clone()))
    }

    pub fn with_upload_base(mut self, base: impl Into<String>) -> Self {
        self.upload_base = base.into();
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        let folder = folder.into();
        self.folder = (!folder.is_empty()).then_some(folder);
        self
    }

    /// Uploads raw bytes under `file_name`. ImageKit appends a unique suffix
    /// so repeated names never overwrite each other.
    pub async fn upload_bytes(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<HostedImage> {
        let file = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;

        let mut form = Form::new()
            .part("file", file)
            .text("fileName", file_name.to_string())
            .text("useUniqueFileName", "true");
        if let Some(folder) = &self.folder {
            form = form.text("folder", folder.clone());
        }

        let url = format!(
            "{}/api/v1/files/upload",
            self.upload_base.trim_end_matches('/')
        );
        debug!(file_name, "posting to imagekit");
        let response = self
            .client
            .post(url)
            .basic_auth(&self.private_key, Some(""))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }

        let body: UploadResponse = response.json().await?;
        Ok(HostedImage {
            url: body.url,
            asset_id: body.file_id,
        })
    }
}

#[async_trait]
impl ImageHost for ImageKitClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn upload(&self, image: &CompressedImage, target: &UploadTarget) -> Result<HostedImage> {
        let extension = image.file_name.rsplit_once('.').map(|(_, ext)| ext);
        let file_name = match extension {
            Some(ext) => format!("{}.{}", target.asset_name(), ext),
            None => target.asset_name(),
        };
        self.upload_bytes(image.bytes.clone(), &file_name, image.mime_type)
            .await
    }
}

/// Inserts a `tr:w-{width},h-{height}` resize segment right after the URL
/// endpoint. URLs that already carry a transformation, or that do not live
/// under `url_endpoint`, are returned unchanged.
pub fn optimize_imagekit_url(url: &str, url_endpoint: &str, width: u32, height: u32) -> String {
    if url.contains(&format!("/{}", IMAGEKIT_TRANSFORM_PREFIX)) {
        return url.to_string();
    }

    let endpoint = url_endpoint.trim_end_matches('/');
    match url.strip_prefix(endpoint) {
        Some(rest) if !endpoint.is_empty() && rest.starts_with('/') => format!(
            "{}/{}w-{},h-{}{}",
            endpoint, IMAGEKIT_TRANSFORM_PREFIX, width, height, rest
        ),
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "https://ik.imagekit.io/casitas";

    #[test]
    fn test_optimize_imagekit_url() {
        let url = "https://ik.imagekit.io/casitas/evidencias/12_fachada.webp";
        assert_eq!(
            optimize_imagekit_url(url, ENDPOINT, 400, 300),
            "https://ik.imagekit.io/casitas/tr:w-400,h-300/evidencias/12_fachada.webp"
        );
    }

    #[test]
    fn test_optimize_imagekit_url_idempotent() {
        let url = "https://ik.imagekit.io/casitas/evidencias/12_fachada.webp";
        let once = optimize_imagekit_url(url, ENDPOINT, 400, 300);
        assert_eq!(optimize_imagekit_url(&once, ENDPOINT, 400, 300), once);
        assert_eq!(optimize_imagekit_url(&once, ENDPOINT, 100, 100), once);
    }

    #[test]
    fn test_optimize_imagekit_url_trailing_slash_endpoint() {
        let url = "https://ik.imagekit.io/casitas/a.webp";
        assert_eq!(
            optimize_imagekit_url(url, "https://ik.imagekit.io/casitas/", 10, 20),
            "https://ik.imagekit.io/casitas/tr:w-10,h-20/a.webp"
        );
    }

    #[test]
    fn test_optimize_imagekit_url_foreign_host() {
        let url = "https://res.cloudinary.com/demo/image/upload/a.webp";
        assert_eq!(optimize_imagekit_url(url, ENDPOINT, 10, 20), url);
        let sibling = "https://ik.imagekit.io/casitas-other/a.webp";
        assert_eq!(optimize_imagekit_url(sibling, ENDPOINT, 10, 20), sibling);
    }
}
