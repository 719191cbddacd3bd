/// Output formats for compressed evidence images
use crate::error::{EvidenceError, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// WebP, the format evidence is stored in
    #[default]
    WebP,
    /// JPEG with the configured quality
    Jpeg,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::WebP => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::WebP => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::WebP => "WebP",
            OutputFormat::Jpeg => "JPEG",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for OutputFormat {
    type Err = EvidenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "webp" => Ok(OutputFormat::WebP),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            _ => Err(EvidenceError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Guesses a MIME type from a file name, for uploads that skip compression.
pub fn mime_from_file_name(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "webp" => "image/webp",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
