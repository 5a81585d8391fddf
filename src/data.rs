use anyhow::{Context, Result, anyhow};
use image::GenericImageView;
use std::path::{Path, PathBuf};

pub const PNG_MIME: &str = "image/png";
pub const JPEG_MIME: &str = "image/jpeg";
pub const WEBP_MIME: &str = "image/webp";
pub const GIF_MIME: &str = "image/gif";
pub const BMP_MIME: &str = "image/bmp";
pub const TIFF_MIME: &str = "image/tiff";

#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub name: Option<String>,
}

impl ImageAttachment {
    /// Natural pixel size of the encoded image.
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        let image = image::load_from_memory(&self.bytes)
            .with_context(|| "failed to decode image for layout")?;
        Ok(image.dimensions())
    }
}

pub fn load_image(path: &Path, mime_hint: Option<&str>) -> Result<ImageAttachment> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image file: {}", path.display()))?;
    let mime = resolve_mime(mime_hint.unwrap_or("auto"), &bytes, Some(path))?;
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .map(|value| value.to_string());
    Ok(ImageAttachment { bytes, mime, name })
}

pub fn load_image_from_bytes(
    bytes: Vec<u8>,
    mime_hint: Option<&str>,
    name: Option<&str>,
) -> Result<ImageAttachment> {
    if bytes.is_empty() {
        return Err(anyhow!("image data is empty"));
    }
    let path = name.map(PathBuf::from);
    let mime = resolve_mime(mime_hint.unwrap_or("auto"), &bytes, path.as_deref())?;
    Ok(ImageAttachment {
        bytes,
        mime,
        name: name.map(|value| value.to_string()),
    })
}

fn resolve_mime(input: &str, bytes: &[u8], path: Option<&Path>) -> Result<String> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(anyhow!("image mime is empty"));
    }
    let lower = raw.to_lowercase();
    match lower.as_str() {
        "auto" | "image" | "image/*" => return detect_mime(bytes, path),
        "jpg" => return Ok(JPEG_MIME.to_string()),
        "image/jpg" => return Ok(JPEG_MIME.to_string()),
        "tif" => return Ok(TIFF_MIME.to_string()),
        _ => {}
    }
    if let Some(mime) = mime_from_extension(&lower) {
        return Ok(mime.to_string());
    }
    if lower.starts_with("image/") {
        return Ok(lower);
    }
    Err(anyhow!(
        "unsupported image mime '{}' (expected auto, png, jpeg, webp, gif, bmp, tiff or image/*)",
        raw
    ))
}

fn detect_mime(bytes: &[u8], path: Option<&Path>) -> Result<String> {
    if let Some(kind) = infer::get(bytes) {
        let detected = kind.mime_type();
        if !detected.starts_with("image/") {
            return Err(anyhow!("expected image data (detected '{}')", detected));
        }
        return Ok(detected.to_string());
    }

    if let Some(ext) = extension_lower(path)
        && let Some(mime) = mime_from_extension(&ext)
    {
        return Ok(mime.to_string());
    }

    Err(anyhow!(
        "unable to detect image type for '{}'",
        path.map(|value| value.display().to_string())
            .unwrap_or_else(|| "stdin".to_string())
    ))
}

fn extension_lower(path: Option<&Path>) -> Option<String> {
    path.and_then(|path| path.extension())
        .and_then(|value| value.to_str())
        .map(|value| value.to_lowercase())
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some(PNG_MIME),
        "jpg" | "jpeg" => Some(JPEG_MIME),
        "webp" => Some(WEBP_MIME),
        "gif" => Some(GIF_MIME),
        "bmp" => Some(BMP_MIME),
        "tiff" | "tif" => Some(TIFF_MIME),
        _ => None,
    }
}

/// Output mime for a rendered image path; unknown extensions render PNG.
pub fn mime_for_output(path: &Path) -> &'static str {
    extension_lower(Some(path))
        .and_then(|ext| mime_from_extension(&ext))
        .unwrap_or(PNG_MIME)
}
