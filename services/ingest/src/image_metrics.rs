use image::imageops::FilterType;
use image::GrayImage;
use rand::RngCore;
use tracing::{debug, warn};

/// Downsample grid for the perceptual hash (grid * grid bits)
pub const HASH_GRID: u32 = 32;

/// Width of the border excluded from the Laplacian pass
const BLUR_BORDER: u32 = 2;

/// Compute the similarity hash for an image.
///
/// The image is downsampled to a 32x32 grayscale grid; each pixel becomes a
/// '1' bit if its intensity is at or above the mean, '0' otherwise, and the
/// resulting bitstring is digested. A decode failure falls back to a random
/// digest so a processing failure never blocks upload completion, at the
/// cost of that hash never matching anything.
pub fn similarity_hash(bytes: &[u8]) -> String {
    match image::load_from_memory(bytes) {
        Ok(decoded) => {
            let gray = decoded
                .resize_exact(HASH_GRID, HASH_GRID, FilterType::Triangle)
                .to_luma8();
            hash_from_gray(&gray)
        }
        Err(e) => {
            warn!(error = %e, "Similarity hash failed, using random fallback");
            random_hash()
        }
    }
}

/// Digest a grayscale grid into the stored hash
fn hash_from_gray(gray: &GrayImage) -> String {
    let pixels = gray.as_raw();
    let mean = pixels.iter().map(|&p| p as u64).sum::<u64>() as f64 / pixels.len() as f64;

    let bitstring: String = pixels
        .iter()
        .map(|&p| if p as f64 >= mean { '1' } else { '0' })
        .collect();

    blake3::hash(bitstring.as_bytes()).to_hex().to_string()
}

/// Random fallback hash, same length as a real one
fn random_hash() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    blake3::hash(&bytes).to_hex().to_string()
}

/// Positional character-match similarity between two hashes, as a percentage.
/// Hashes of different lengths never match.
pub fn hash_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let matching = a
        .chars()
        .zip(b.chars())
        .filter(|(x, y)| x == y)
        .count();

    matching as f64 / a.len() as f64 * 100.0
}

/// Estimate image sharpness (higher = sharper).
///
/// A decode failure returns `failure_score` so detection failures never cause
/// a false rejection.
pub fn blur_score(bytes: &[u8], failure_score: f64) -> f64 {
    match image::load_from_memory(bytes) {
        Ok(decoded) => {
            let gray = decoded.to_luma8();
            let score = blur_score_from_gray(&gray);
            debug!(
                score = format!("{score:.2}"),
                width = gray.width(),
                height = gray.height(),
                "Blur estimation completed"
            );
            score
        }
        Err(e) => {
            warn!(error = %e, "Blur estimation failed, using fail-open score");
            failure_score
        }
    }
}

/// Mean absolute discrete Laplacian over interior pixels, normalized so the
/// score is comparable across resolutions.
pub fn blur_score_from_gray(gray: &GrayImage) -> f64 {
    let width = gray.width();
    let height = gray.height();
    let pixels = gray.as_raw();

    let mut laplacian_sum = 0.0f64;
    let mut interior_pixels = 0u64;

    // Skip a 2-pixel border to avoid boundary artifacts
    for y in BLUR_BORDER..height.saturating_sub(BLUR_BORDER) {
        for x in BLUR_BORDER..width.saturating_sub(BLUR_BORDER) {
            let idx = (y * width + x) as usize;

            let center = pixels[idx] as i32;
            let top = pixels[idx - width as usize] as i32;
            let bottom = pixels[idx + width as usize] as i32;
            let left = pixels[idx - 1] as i32;
            let right = pixels[idx + 1] as i32;

            laplacian_sum += (4 * center - top - bottom - left - right).abs() as f64;
            interior_pixels += 1;
        }
    }

    let mean = if interior_pixels > 0 {
        laplacian_sum / interior_pixels as f64
    } else {
        0.0
    };

    let normalization = (width as f64 * height as f64).sqrt() / 500.0;
    mean * normalization.max(0.5)
}
