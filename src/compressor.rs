use crate::constants::{DEFAULT_MAX_WIDTH, DEFAULT_QUALITY, MAX_FILE_SIZE, MAX_QUALITY, MIN_QUALITY};
use crate::error::{EvidenceError, Result};
use crate::formats::OutputFormat;
use crate::utils::{calculate_compression_ratio, format_file_size, validate_file_exists};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CompressOptions {
    pub max_width: u32,
    pub quality: u8,
    pub format: OutputFormat,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            quality: DEFAULT_QUALITY,
            format: OutputFormat::WebP,
        }
    }
}

impl CompressOptions {
    pub fn new(max_width: Option<u32>, quality: Option<u8>, format: Option<&str>) -> Result<Self> {
        let quality = quality.unwrap_or(DEFAULT_QUALITY);
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
            return Err(EvidenceError::InvalidQuality(quality));
        }

        let max_width = max_width.unwrap_or(DEFAULT_MAX_WIDTH);
        if max_width == 0 {
            return Err(EvidenceError::InvalidWidth(max_width));
        }

        let format = match format {
            Some(f) => f.parse()?,
            None => OutputFormat::WebP,
        };

        Ok(Self {
            max_width,
            quality,
            format,
        })
    }
}

/// A compressed image held in memory, ready to be uploaded.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub original_size: u64,
}

impl CompressedImage {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Decodes, shrinks and re-encodes an image.
///
/// The image is scaled down to `options.max_width` (aspect ratio preserved)
/// only when it is wider than that; narrower images keep their size. The
/// returned file name carries the output format's extension.
///
/// # Errors
/// * `EvidenceError::FileTooLarge` if the input exceeds `MAX_FILE_SIZE`
/// * `EvidenceError::Decode` if the bytes are not a decodable image
/// * `EvidenceError::Encode` if the encoder rejects the image
pub fn compress_bytes(
    bytes: &[u8],
    file_name: &str,
    options: &CompressOptions,
) -> Result<CompressedImage> {
    let original_size = bytes.len() as u64;
    if original_size > MAX_FILE_SIZE {
        return Err(EvidenceError::FileTooLarge(original_size, MAX_FILE_SIZE));
    }

    let mut img = image::load_from_memory(bytes)
        .map_err(|e| EvidenceError::Decode(format!("{}: {}", file_name, e)))?;

    if fit_to_max_width(&mut img, options.max_width) {
        debug!(file_name, width = img.width(), height = img.height(), "resized");
    }

    let encoded = encode_image(&img, options)?;
    let (width, height) = img.dimensions();

    Ok(CompressedImage {
        bytes: encoded,
        file_name: compressed_file_name(file_name, options.format),
        mime_type: options.format.mime_type(),
        width,
        height,
        original_size,
    })
}

pub fn compress_file(path: &Path, options: &CompressOptions) -> Result<CompressedImage> {
    validate_file_exists(path)?;

    let file_size = fs::metadata(path)?.len();
    if file_size > MAX_FILE_SIZE {
        return Err(EvidenceError::FileTooLarge(file_size, MAX_FILE_SIZE));
    }

    let bytes = fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "evidencia".to_string());

    compress_bytes(&bytes, &file_name, options)
}

/// Scales `img` down to `max_width` when it is wider. Returns whether it
/// was resized.
pub fn fit_to_max_width(img: &mut DynamicImage, max_width: u32) -> bool {
    let (width, height) = img.dimensions();
    if max_width == 0 || width <= max_width {
        return false;
    }

    let scaled_height =
        ((height as u64 * max_width as u64 + width as u64 / 2) / width as u64).max(1) as u32;
    *img = img.resize_exact(max_width, scaled_height, FilterType::Lanczos3);
    true
}

/// `photo.jpg` -> `photo.webp`; only the last extension is replaced.
pub fn compressed_file_name(file_name: &str, format: OutputFormat) -> String {
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    format!("{}.{}", stem, format.extension())
}

fn encode_image(img: &DynamicImage, options: &CompressOptions) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());

    match options.format {
        OutputFormat::WebP => {
            let rgba = img.to_rgba8();
            let encoded = webp::Encoder::from_rgba(&rgba, rgba.width(), rgba.height())
                .encode_simple(false, f32::from(options.quality))
                .map_err(|e| EvidenceError::Encode(format!("WebP encoding failed: {:?}", e)))?;
            out.write_all(&encoded)?;
        }
        OutputFormat::Jpeg => {
            let rgb = img.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, options.quality);
            encoder
                .encode_image(&rgb)
                .map_err(|e| EvidenceError::Encode(e.to_string()))?;
        }
    }

    Ok(out.into_inner())
}

/// Compresses one file into `output_dir`, printing a size summary.
pub fn compress_to_dir(
    input: &Path,
    output_dir: &Path,
    options: &CompressOptions,
) -> Result<PathBuf> {
    crate::status!("🗜️  Compressing image: {:?}", input);

    let compressed = compress_file(input, options)?;
    fs::create_dir_all(output_dir)?;
    let output_path = output_dir.join(&compressed.file_name);
    fs::write(&output_path, &compressed.bytes)?;

    let ratio = calculate_compression_ratio(compressed.original_size, compressed.size());
    crate::status!(
        "📊 Original size: {}",
        format_file_size(compressed.original_size)
    );
    crate::status!(
        "📈 Compressed size: {} ({}x{})",
        format_file_size(compressed.size()),
        compressed.width,
        compressed.height
    );
    if ratio > 0.0 {
        crate::status!("✅ Reduced file size by {:.1}%", ratio);
    } else {
        crate::status!("⚠️  File size increased by {:.1}%", ratio.abs());
    }
    crate::status!("📁 Output: {:?}", output_path);

    Ok(output_path)
}
