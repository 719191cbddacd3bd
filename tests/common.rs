#![allow(dead_code)]

use image::{ImageFormat, Rgb, RgbImage};
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn create_temp_directory() -> TempDir {
    TempDir::new().unwrap()
}

/// Encodes a gradient so the encoders have something non-trivial to chew on.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, png_bytes(width, height)).unwrap();
    path
}

pub fn write_text(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    File::create(&path)
        .unwrap()
        .write_all(b"not an image")
        .unwrap();
    path
}

/// Two photos plus a note at the top level, one photo in `subdir/`.
pub fn create_evidence_folder(dir: &Path) -> Vec<PathBuf> {
    let mut files = vec![
        write_png(dir, "fachada.png", 64, 48),
        write_png(dir, "techo.png", 48, 64),
        write_text(dir, "notas.txt"),
    ];
    let subdir = dir.join("subdir");
    std::fs::create_dir(&subdir).unwrap();
    files.push(write_png(&subdir, "bano.png", 32, 32));
    files
}
