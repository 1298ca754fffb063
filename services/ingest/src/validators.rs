use crate::config::ValidationConfig;
use crate::error::PipelineError;
use crate::image_metrics::hash_similarity;
use crate::record_store::RecordStore;
use std::path::Path;
use tracing::debug;

/// Outcome of an acceptance check
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Fail { reason: String },
}

impl Verdict {
    pub fn fail(reason: impl Into<String>) -> Self {
        Verdict::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Pass => None,
            Verdict::Fail { reason } => Some(reason),
        }
    }
}

/// Validate the upload's format. The MIME type is checked against the allowed
/// set first; unrecognized MIME types fall back to the file extension for
/// HEIC/HEIF, which browsers routinely mislabel.
pub fn validate_format(mime_type: &str, original_name: &str, config: &ValidationConfig) -> Verdict {
    let allowed = config
        .allowed_types
        .iter()
        .any(|t| t.eq_ignore_ascii_case(mime_type));

    if allowed {
        return Verdict::Pass;
    }

    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if ext == "heic" || ext == "heif" {
        return Verdict::Pass;
    }

    Verdict::fail("Unsupported file format. Allowed types: JPG, PNG, HEIC")
}

/// Validate post-normalization dimensions against configured bounds.
/// A zero maximum disables the upper bound.
pub fn validate_dimensions(width: u32, height: u32, config: &ValidationConfig) -> Verdict {
    if width < config.min_width || height < config.min_height {
        return Verdict::fail(format!(
            "Image dimensions too small. Minimum: {}x{}px, Actual: {}x{}px",
            config.min_width, config.min_height, width, height
        ));
    }

    if config.max_width > 0 && config.max_height > 0 {
        if width > config.max_width || height > config.max_height {
            return Verdict::fail(format!(
                "Image dimensions too large. Maximum: {}x{}px, Actual: {}x{}px",
                config.max_width, config.max_height, width, height
            ));
        }
    }

    Verdict::Pass
}

/// Validate the blur score against the sharpness threshold. Score and
/// threshold share the normalized Laplacian scale.
pub fn validate_sharpness(blur_score: f64, config: &ValidationConfig) -> Verdict {
    if blur_score >= config.blur_threshold {
        Verdict::Pass
    } else {
        Verdict::fail(format!(
            "Image is too blurry (score: {:.2}, minimum: {})",
            blur_score, config.blur_threshold
        ))
    }
}

/// Compare the new image's hash against every ACCEPTED hash of the same user.
/// Any positional match at or above the threshold rejects. No existing
/// accepted images trivially passes.
pub async fn validate_similarity(
    record_store: &dyn RecordStore,
    user_id: &str,
    new_hash: &str,
    config: &ValidationConfig,
) -> Result<Verdict, PipelineError> {
    let existing = record_store
        .accepted_hashes(user_id)
        .await
        .map_err(PipelineError::RecordStore)?;

    for image in &existing {
        let Some(ref existing_hash) = image.similarity_hash else {
            continue;
        };

        let similarity = hash_similarity(new_hash, existing_hash);
        debug!(image_id = %image.id, similarity = format!("{similarity:.1}"), "Hash comparison");

        if similarity >= config.similarity_threshold {
            return Ok(Verdict::fail(format!(
                "Image too similar to an existing one ({similarity:.1}% match)"
            )));
        }
    }

    Ok(Verdict::Pass)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ValidationConfig {
        ValidationConfig::default()
    }

    #[test]
    fn test_format_allowed_mime() {
        assert!(validate_format("image/jpeg", "a.jpg", &config()).is_pass());
        assert!(validate_format("IMAGE/PNG", "a.png", &config()).is_pass());
    }

    #[test]
    fn test_format_heic_extension_fallback() {
        // Mislabeled HEIC passes via extension
        assert!(validate_format("application/octet-stream", "a.HEIC", &config()).is_pass());
        assert!(validate_format("application/octet-stream", "a.heif", &config()).is_pass());
    }

    #[test]
    fn test_format_rejects_unknown() {
        let verdict = validate_format("image/gif", "a.gif", &config());
        assert_eq!(
            verdict.reason(),
            Some("Unsupported file format. Allowed types: JPG, PNG, HEIC")
        );
    }

    #[test]
    fn test_dimensions_below_minimum() {
        let verdict = validate_dimensions(200, 200, &config());
        let reason = verdict.reason().unwrap();
        assert!(reason.contains("300x300"));
        assert!(reason.contains("200x200"));
    }

    #[test]
    fn test_dimensions_above_maximum() {
        let verdict = validate_dimensions(6000, 4000, &config());
        assert!(verdict.reason().unwrap().contains("5000x5000"));
    }

    #[test]
    fn test_dimensions_in_range() {
        assert!(validate_dimensions(300, 300, &config()).is_pass());
        assert!(validate_dimensions(5000, 5000, &config()).is_pass());
    }

    #[test]
    fn test_dimensions_max_disabled() {
        let cfg = ValidationConfig {
            max_width: 0,
            max_height: 0,
            ..config()
        };
        assert!(validate_dimensions(100_000, 100_000, &cfg).is_pass());
    }

    #[test]
    fn test_sharpness_threshold() {
        assert!(validate_sharpness(5.0, &config()).is_pass());
        let verdict = validate_sharpness(1.5, &config());
        let reason = verdict.reason().unwrap();
        assert!(reason.contains("score: 1.50"));
        assert!(reason.contains("minimum: 5"));
    }
}
