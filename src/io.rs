//! File I/O — asset import dialogs, image decoding, and PNG encoding for
//! the wire and the export archive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, RgbaImage};
use rfd::FileDialog;
use uuid::Uuid;

use crate::store::{Asset, MediaType};

/// Image formats the importer will decode.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

/// Video containers accepted as (undecoded) reference assets.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "avi"];

pub fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

/// Open-file dialog for asset import (multi-select, images + video).
pub fn pick_asset_files() -> Vec<PathBuf> {
    FileDialog::new()
        .add_filter("Media", &[IMAGE_EXTENSIONS, VIDEO_EXTENSIONS].concat())
        .add_filter("Images", IMAGE_EXTENSIONS)
        .add_filter("Video", VIDEO_EXTENSIONS)
        .pick_files()
        .unwrap_or_default()
}

/// Open-file dialog for the collage tool (images only).
pub fn pick_collage_files() -> Vec<PathBuf> {
    FileDialog::new()
        .add_filter("Images", IMAGE_EXTENSIONS)
        .pick_files()
        .unwrap_or_default()
}

/// Save-file dialog for the batch export archive.
pub fn pick_archive_path(default_name: &str) -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("ZIP archive", &["zip"])
        .set_file_name(default_name)
        .save_file()
}

/// Import a single file as an asset. Video files are listed without
/// decoding; an undecodable image aborts the import with no side effects.
pub fn load_asset(path: &Path) -> Result<Asset, String> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if is_video_extension(&ext) {
        return Ok(Asset {
            id: Uuid::new_v4(),
            path: path.to_path_buf(),
            pixels: None,
            media: MediaType::Video,
        });
    }

    let img = image::open(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?
        .into_rgba8();
    Ok(Asset {
        id: Uuid::new_v4(),
        path: path.to_path_buf(),
        pixels: Some(Arc::new(img)),
        media: MediaType::Image,
    })
}

/// Decode an image file for the collage tool.
pub fn load_image(path: &Path) -> Result<RgbaImage, String> {
    image::open(path)
        .map(|img| img.into_rgba8())
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))
}

/// Encode RGBA pixels to an in-memory PNG.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), img.width(), img.height(), ColorType::Rgba8)
        .map_err(|e| format!("PNG encode failed: {}", e))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn video_extension_detection_is_case_insensitive() {
        assert!(is_video_extension("MP4"));
        assert!(is_video_extension("webm"));
        assert!(!is_video_extension("png"));
        assert!(!is_video_extension(""));
    }

    #[test]
    fn png_encode_round_trips_through_decoder() {
        let img = RgbaImage::from_pixel(6, 4, Rgba([10, 200, 30, 255]));
        let bytes = encode_png(&img).unwrap();
        let back = image::load_from_memory(&bytes).unwrap().into_rgba8();
        assert_eq!(back.dimensions(), (6, 4));
        assert_eq!(back.get_pixel(3, 2), &Rgba([10, 200, 30, 255]));
    }
}
