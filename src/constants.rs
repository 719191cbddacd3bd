pub const DEFAULT_QUALITY: u8 = 80;
pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

pub const DEFAULT_MAX_WIDTH: u32 = 1200;

/// Upper bound on the size of a single evidence file (25MB)
pub const MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;

pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif", "gif",
];

// localStorage-compatible keys
pub const USER_SESSION_KEY: &str = "userSession";
pub const UPLOAD_SESSIONS_KEY: &str = "upload_sessions";
pub const STORE_FILE_NAME: &str = "store.json";

pub const UPLOAD_SESSION_TTL_HOURS: i64 = 24;

pub const REVISIONS_TABLE: &str = "revisiones_casitas";
pub const USERS_TABLE: &str = "usuarios";
pub const EVIDENCE_FIELD_PREFIX: &str = "evidencia";
pub const DEFAULT_BUCKET: &str = "evidencias";

pub const DEFAULT_CLOUDINARY_API: &str = "https://api.cloudinary.com";
pub const DEFAULT_IMAGEKIT_UPLOAD_API: &str = "https://upload.imagekit.io";
pub const DEFAULT_CLOUDINARY_FOLDER: &str = "casitas";
pub const DEFAULT_IMAGEKIT_FOLDER: &str = "/casitas";

pub const CLOUDINARY_AUTO_TOKEN: &str = "f_auto,q_auto";
pub const CLOUDINARY_UPLOAD_SEGMENT: &str = "/upload/";
pub const IMAGEKIT_TRANSFORM_PREFIX: &str = "tr:";

pub const UPLOAD_IMAGEKIT_ROUTE: &str = "/api/upload-imagekit";

pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const DEFAULT_DATA_DIR: &str = ".casita";

pub const PROGRESS_BAR_TEMPLATE: &str =
    "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";
