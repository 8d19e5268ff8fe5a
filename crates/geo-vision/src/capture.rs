//! Image validation and transport encoding.

use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};

use crate::types::{VisionError, VisionResult};

/// Extensions accepted for analysis.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff", "webp"];

/// Default JPEG quality for the transport encoding.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// An image ready to attach to a model request.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Base64 of the JPEG bytes.
    pub base64: String,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
}

/// Lowercased extension of `path`, without the dot.
pub fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Check if a file path points to a supported image format.
pub fn is_supported_format(path: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// Check that `path` exists and has a supported extension.
pub fn validate_image_path(path: &str) -> VisionResult<()> {
    if !Path::new(path).exists() {
        tracing::warn!("Image file does not exist: {path}");
        return Err(VisionError::ImageNotFound(path.to_string()));
    }

    if !is_supported_format(path) {
        let ext = extension_of(path);
        tracing::warn!("Unsupported image format: .{ext}");
        return Err(VisionError::UnsupportedFormat(ext));
    }

    Ok(())
}

/// Load an image, normalize it to RGB, shrink it to fit `max_width` × `max_height`
/// (aspect ratio preserved, never enlarged), and encode it as base64 JPEG.
pub fn load_for_transport(
    path: &str,
    max_width: u32,
    max_height: u32,
    quality: u8,
) -> VisionResult<EncodedImage> {
    let img = image::open(path)?;
    encode_for_transport(&img, max_width, max_height, quality)
}

/// Encode an in-memory image the same way as [`load_for_transport`].
pub fn encode_for_transport(
    img: &DynamicImage,
    max_width: u32,
    max_height: u32,
    quality: u8,
) -> VisionResult<EncodedImage> {
    let (orig_w, orig_h) = img.dimensions();

    let fitted = if orig_w > max_width || orig_h > max_height {
        let resized = img.resize(max_width, max_height, image::imageops::FilterType::Lanczos3);
        tracing::info!(
            "Image resized from {orig_w}x{orig_h} to {}x{}",
            resized.width(),
            resized.height()
        );
        resized
    } else {
        img.clone()
    };

    let rgb = fitted.to_rgb8();
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| VisionError::ImageLoad(format!("JPEG encoding failed: {e}")))?;

    Ok(EncodedImage {
        base64: base64::engine::general_purpose::STANDARD.encode(&buf),
        width: rgb.width(),
        height: rgb.height(),
        original_width: orig_w,
        original_height: orig_h,
    })
}
