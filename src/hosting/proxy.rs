use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use super::{provider_error, HostedImage, ImageHost, UploadTarget};
use crate::compressor::CompressedImage;
use crate::constants::UPLOAD_IMAGEKIT_ROUTE;
use crate::error::{EvidenceError, Result};

const PROVIDER: &str = "imagekit-proxy";

/// Body of `POST /api/upload-imagekit`, success or failure.
#[derive(Debug, Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    success: bool,
    url: Option<String>,
    error: Option<String>,
    details: Option<String>,
}

/// Uploads through a running `casita-evidence serve` instance, so the
/// ImageKit private key stays on the server.
#[derive(Debug, Clone)]
pub struct ProxyUploadClient {
    client: Client,
    base_url: String,
}

impl ProxyUploadClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ImageHost for ProxyUploadClient {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn upload(&self, image: &CompressedImage, target: &UploadTarget) -> Result<HostedImage> {
        let file = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(image.mime_type)?;

        let mut form = Form::new()
            .part("file", file)
            .text("type", target.field_name.clone());
        if let Some(name) = &target.custom_name {
            form = form.text("customName", name.clone());
        }

        let url = format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            UPLOAD_IMAGEKIT_ROUTE
        );
        let response = self.client.post(url).multipart(form).send().await?;
        // Errors from a gateway in front of the proxy are not JSON
        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }
        let status = response.status().as_u16();
        let body: ProxyResponse = response.json().await?;

        match body {
            ProxyResponse {
                success: true,
                url: Some(url),
                ..
            } => Ok(HostedImage {
                asset_id: url.clone(),
                url,
            }),
            ProxyResponse { error, details, .. } => Err(EvidenceError::Provider {
                provider: PROVIDER,
                status,
                message: details
                    .or(error)
                    .unwrap_or_else(|| "upload failed".to_string()),
            }),
        }
    }
}
