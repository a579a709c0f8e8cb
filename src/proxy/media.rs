use std::path::Path;

use image::ImageFormat;

const FALLBACK_MIME: &str = "application/octet-stream";

pub struct ImageProcessor;

impl ImageProcessor {
    /// MIME type to declare for an uploaded image: a declared `image/*` type,
    /// else sniffed from the bytes, else from the extension.
    pub fn resolve_mime_type(filename: &str, declared: Option<&str>, data: &[u8]) -> String {
        if let Some(declared) = declared.map(str::trim) {
            if declared.starts_with("image/") {
                return declared.to_string();
            }
        }

        if let Ok(format) = image::guess_format(data) {
            return format.to_mime_type().to_string();
        }

        Self::detect_mime_type(filename).unwrap_or_else(|_| FALLBACK_MIME.to_string())
    }

    /// MIME type from the file extension
    pub fn detect_mime_type(filename: &str) -> Result<String, String> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|s| s.to_str())
            .ok_or("missing file extension")?;

        ImageFormat::from_extension(ext)
            .map(|format| format.to_mime_type().to_string())
            .ok_or_else(|| format!("unsupported image format: {}", ext))
    }
}
