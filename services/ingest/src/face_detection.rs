use crate::config::RekognitionConfig;
use crate::validators::Verdict;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{Attribute, Image};
use aws_sdk_rekognition::Client as RekognitionClient;
use tracing::{debug, info, instrument};

/// A detected face with a normalized bounding box (fractional extents in [0,1])
#[derive(Debug, Clone, Copy)]
pub struct DetectedFace {
    pub confidence: f32,
    pub width_frac: f32,
    pub height_frac: f32,
}

impl DetectedFace {
    /// Face size as a percentage of the image area
    pub fn size_percentage(&self) -> f64 {
        self.width_frac as f64 * self.height_frac as f64 * 100.0
    }
}

/// External face detection capability.
///
/// A detector failure is fatal for the upload; an empty result is a normal
/// detection outcome handled by the gate.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, bytes: &[u8]) -> Result<Vec<DetectedFace>>;
}

/// Rekognition-backed face detector
pub struct RekognitionFaceDetector {
    client: RekognitionClient,
}

impl RekognitionFaceDetector {
    pub async fn new(config: &RekognitionConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let client = RekognitionClient::new(&aws_config);

        info!(region = %config.region, "Rekognition face detector initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl FaceDetector for RekognitionFaceDetector {
    #[instrument(skip(self, bytes), fields(size_bytes = bytes.len()))]
    async fn detect(&self, bytes: &[u8]) -> Result<Vec<DetectedFace>> {
        let response = self
            .client
            .detect_faces()
            .image(Image::builder().bytes(Blob::new(bytes.to_vec())).build())
            .attributes(Attribute::Default)
            .send()
            .await
            .context("Rekognition DetectFaces call failed")?;

        let faces: Vec<DetectedFace> = response
            .face_details()
            .iter()
            .map(|detail| {
                let bbox = detail.bounding_box();
                DetectedFace {
                    confidence: detail.confidence().unwrap_or(0.0),
                    width_frac: bbox.and_then(|b| b.width()).unwrap_or(0.0),
                    height_frac: bbox.and_then(|b| b.height()).unwrap_or(0.0),
                }
            })
            .collect();

        debug!(face_count = faces.len(), "Face detection completed");

        Ok(faces)
    }
}

/// Evaluate the face gate.
///
/// Rules, in order: no faces rejects, more than one face rejects, a single
/// face smaller than `min_face_size` percent of the frame rejects. This gate
/// runs before all other validators and short-circuits the pipeline when it
/// fails.
pub fn validate_faces(faces: &[DetectedFace], min_face_size: f64) -> Verdict {
    if faces.is_empty() {
        return Verdict::fail("No faces detected in the image");
    }

    if faces.len() > 1 {
        return Verdict::fail(format!(
            "Multiple faces detected ({}). Only one face allowed",
            faces.len()
        ));
    }

    let size = faces[0].size_percentage();
    if size < min_face_size {
        return Verdict::fail(format!(
            "Face is too small ({size:.2}% of image). Minimum required: {min_face_size}%"
        ));
    }

    Verdict::Pass
}
