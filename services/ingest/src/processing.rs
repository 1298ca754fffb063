use crate::error::PipelineError;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, instrument};

/// Output of format normalization. All downstream components operate on the
/// (possibly transcoded) `bytes`.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Resolved format name, e.g. "jpeg" or "png"
    pub format: String,
}

/// Resolve the image format from the MIME type, falling back to the file
/// extension. Browsers commonly mislabel HEIC/HEIF uploads, so the extension
/// wins for those.
pub fn resolve_format(mime_type: &str, original_name: &str) -> String {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if ext == "heic" || ext == "heif" {
        return ext;
    }

    match mime_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpeg".to_string(),
        "image/png" => "png".to_string(),
        "image/heic" => "heic".to_string(),
        "image/heif" => "heif".to_string(),
        _ if !ext.is_empty() => ext,
        _ => "unknown".to_string(),
    }
}

/// Normalize an upload: resolve its format and transcode HEIC/HEIF to
/// baseline JPEG at the configured quality. Any decode error is fatal for
/// the upload.
#[instrument(skip(bytes), fields(file = %original_name, size_bytes = bytes.len()))]
pub fn normalize(
    bytes: &[u8],
    original_name: &str,
    mime_type: &str,
    transcode_quality: u8,
) -> Result<NormalizedImage, PipelineError> {
    let resolved = resolve_format(mime_type, original_name);

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| PipelineError::Processing(anyhow::Error::new(e)))?;
    let (width, height) = decoded.dimensions();

    if resolved == "heic" || resolved == "heif" {
        let jpeg = transcode_to_jpeg(&decoded, transcode_quality)
            .map_err(PipelineError::Processing)?;

        debug!(width, height, "Transcoded HEIC upload to JPEG");

        return Ok(NormalizedImage {
            bytes: jpeg,
            width,
            height,
            format: "jpeg".to_string(),
        });
    }

    Ok(NormalizedImage {
        bytes: bytes.to_vec(),
        width,
        height,
        format: resolved,
    })
}

/// Re-encode a decoded image as baseline JPEG
fn transcode_to_jpeg(image: &DynamicImage, quality: u8) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut out), quality);
    rgb.write_with_encoder(encoder)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([((x * 7) % 256) as u8, ((y * 13) % 256) as u8, 128u8])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_resolve_format_from_mime() {
        assert_eq!(resolve_format("image/jpeg", "photo.jpg"), "jpeg");
        assert_eq!(resolve_format("image/png", "photo.png"), "png");
    }

    #[test]
    fn test_resolve_format_extension_overrides_mislabel() {
        // Browsers often submit HEIC as jpeg or octet-stream
        assert_eq!(resolve_format("image/jpeg", "IMG_0001.HEIC"), "heic");
        assert_eq!(resolve_format("application/octet-stream", "a.heif"), "heif");
    }

    #[test]
    fn test_normalize_reports_dimensions() {
        let bytes = png_bytes(320, 240);
        let normalized = normalize(&bytes, "photo.png", "image/png", 90).unwrap();
        assert_eq!(normalized.width, 320);
        assert_eq!(normalized.height, 240);
        assert_eq!(normalized.format, "png");
        assert_eq!(normalized.bytes, bytes);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        let err = normalize(b"not an image", "x.png", "image/png", 90);
        assert!(matches!(err, Err(PipelineError::Processing(_))));
    }

    #[test]
    fn test_transcode_produces_jpeg() {
        let decoded = image::load_from_memory(&png_bytes(64, 64)).unwrap();
        let jpeg = transcode_to_jpeg(&decoded, 90).unwrap();
        let reloaded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(reloaded.dimensions(), (64, 64));
        assert_eq!(
            image::guess_format(&jpeg).unwrap(),
            image::ImageFormat::Jpeg
        );
    }
}
