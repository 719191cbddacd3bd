//! Configuration loaded from the environment (and `.env` when present)

use crate::constants::{
    DEFAULT_BUCKET, DEFAULT_CLOUDINARY_API, DEFAULT_CLOUDINARY_FOLDER, DEFAULT_DATA_DIR,
    DEFAULT_IMAGEKIT_FOLDER, DEFAULT_IMAGEKIT_UPLOAD_API, DEFAULT_MAX_WIDTH, DEFAULT_QUALITY,
    DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT,
};
use crate::error::{EvidenceError, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub supabase: SupabaseConfig,
    pub cloudinary: CloudinaryConfig,
    pub imagekit: ImageKitConfig,
    pub compression: CompressionConfig,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct SupabaseConfig {
    pub url: Option<String>,
    pub key: Option<String>,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub api_base: String,
    pub cloud_name: Option<String>,
    pub upload_preset: Option<String>,
    pub folder: String,
}

#[derive(Debug, Clone)]
pub struct ImageKitConfig {
    pub upload_base: String,
    pub public_key: Option<String>,
    pub private_key: Option<String>,
    pub url_endpoint: Option<String>,
    pub folder: String,
}

#[derive(Debug, Clone)]
pub struct CompressionConfig {
    pub max_width: u32,
    pub quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
            },
            supabase: SupabaseConfig {
                url: None,
                key: None,
                bucket: DEFAULT_BUCKET.to_string(),
            },
            cloudinary: CloudinaryConfig {
                api_base: DEFAULT_CLOUDINARY_API.to_string(),
                cloud_name: None,
                upload_preset: None,
                folder: DEFAULT_CLOUDINARY_FOLDER.to_string(),
            },
            imagekit: ImageKitConfig {
                upload_base: DEFAULT_IMAGEKIT_UPLOAD_API.to_string(),
                public_key: None,
                private_key: None,
                url_endpoint: None,
                folder: DEFAULT_IMAGEKIT_FOLDER.to_string(),
            },
            compression: CompressionConfig {
                max_width: DEFAULT_MAX_WIDTH,
                quality: DEFAULT_QUALITY,
            },
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl Config {
    /// Reads `.env` (if any) and the process environment. Every variable is
    /// optional here; credentials are checked by the `require_*` accessors.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT")?.unwrap_or(defaults.server.port),
            },
            supabase: SupabaseConfig {
                url: non_empty_var("SUPABASE_URL"),
                key: non_empty_var("SUPABASE_KEY"),
                bucket: env::var("CASITA_BUCKET").unwrap_or(defaults.supabase.bucket),
            },
            cloudinary: CloudinaryConfig {
                api_base: env::var("CLOUDINARY_API_BASE").unwrap_or(defaults.cloudinary.api_base),
                cloud_name: non_empty_var("CLOUDINARY_CLOUD_NAME"),
                upload_preset: non_empty_var("CLOUDINARY_UPLOAD_PRESET"),
                folder: env::var("CLOUDINARY_FOLDER").unwrap_or(defaults.cloudinary.folder),
            },
            imagekit: ImageKitConfig {
                upload_base: env::var("IMAGEKIT_UPLOAD_BASE")
                    .unwrap_or(defaults.imagekit.upload_base),
                public_key: non_empty_var("IMAGEKIT_PUBLIC_KEY"),
                private_key: non_empty_var("IMAGEKIT_PRIVATE_KEY"),
                url_endpoint: non_empty_var("IMAGEKIT_URL_ENDPOINT"),
                folder: env::var("IMAGEKIT_FOLDER").unwrap_or(defaults.imagekit.folder),
            },
            compression: CompressionConfig {
                max_width: parse_var("CASITA_MAX_WIDTH")?
                    .unwrap_or(defaults.compression.max_width),
                quality: parse_var("CASITA_QUALITY")?.unwrap_or(defaults.compression.quality),
            },
            data_dir: env::var("CASITA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
        })
    }

    pub fn require_supabase(&self) -> Result<(&str, &str)> {
        match (&self.supabase.url, &self.supabase.key) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => Err(EvidenceError::Config(
                "SUPABASE_URL and SUPABASE_KEY must be set".to_string(),
            )),
        }
    }

    pub fn require_cloudinary(&self) -> Result<(&str, &str)> {
        match (&self.cloudinary.cloud_name, &self.cloudinary.upload_preset) {
            (Some(cloud), Some(preset)) => Ok((cloud, preset)),
            _ => Err(EvidenceError::Config(
                "CLOUDINARY_CLOUD_NAME and CLOUDINARY_UPLOAD_PRESET must be set".to_string(),
            )),
        }
    }

    pub fn require_imagekit(&self) -> Result<&str> {
        self.imagekit
            .private_key
            .as_deref()
            .ok_or_else(|| EvidenceError::Config("IMAGEKIT_PRIVATE_KEY must be set".to_string()))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| EvidenceError::Config(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(None),
    }
}
