//! Pairwise face verification.
//!
//! [`FaceVerifier`] is the seam between batch orchestration and the face
//! engine. [`OnnxVerifier`] is the real implementation: decode, detect,
//! align, embed, compare.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Embedding, Verification};
use image::{ImageError, ImageReader, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Decides whether two images show the same person.
pub trait FaceVerifier {
    type Error: std::error::Error;

    fn verify(&mut self, reference: &Path, candidate: &Path) -> Result<Verification, Self::Error>;
}

impl<V: FaceVerifier + ?Sized> FaceVerifier for &mut V {
    type Error = V::Error;

    fn verify(&mut self, reference: &Path, candidate: &Path) -> Result<Verification, Self::Error> {
        (**self).verify(reference, candidate)
    }
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("face could not be detected in {0}")]
    NoFaceDetected(String),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

/// Locations of the two ONNX models.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl ModelPaths {
    /// Standard insightface file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join(DETECTOR_MODEL_FILE),
            recognizer: dir.join(RECOGNIZER_MODEL_FILE),
        }
    }
}

struct Models {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

struct CachedFace {
    path: PathBuf,
    embedding: Embedding,
    confidence: f32,
}

/// SCRFD + ArcFace verifier.
///
/// Models are loaded on first use. A load failure is returned to that caller
/// and attempted again on the next call. The reference embedding is cached
/// by path once it has been extracted successfully.
pub struct OnnxVerifier {
    paths: ModelPaths,
    threshold: f32,
    models: Option<Models>,
    reference: Option<CachedFace>,
}

impl OnnxVerifier {
    pub fn new(paths: ModelPaths, threshold: f32) -> Self {
        Self {
            paths,
            threshold,
            models: None,
            reference: None,
        }
    }
}

impl FaceVerifier for OnnxVerifier {
    type Error = VerifyError;

    fn verify(&mut self, reference: &Path, candidate: &Path) -> Result<Verification, VerifyError> {
        let models = loaded_models(&mut self.models, &self.paths)?;

        let cached = match self.reference.take() {
            Some(face) if face.path == reference => face,
            _ => {
                let (embedding, confidence) = embed(models, reference)?;
                tracing::debug!(path = %reference.display(), confidence, "reference face embedded");
                CachedFace {
                    path: reference.to_path_buf(),
                    embedding,
                    confidence,
                }
            }
        };
        let cached = self.reference.insert(cached);

        let (embedding, confidence) = embed(models, candidate)?;

        Ok(Verification::from_embeddings(
            &cached.embedding,
            &embedding,
            self.threshold,
            cached.confidence,
            confidence,
        ))
    }
}

fn loaded_models<'a>(
    slot: &'a mut Option<Models>,
    paths: &ModelPaths,
) -> Result<&'a mut Models, VerifyError> {
    let models = match slot.take() {
        Some(models) => models,
        None => {
            let detector = FaceDetector::load(&paths.detector)?;
            let recognizer = FaceRecognizer::load(&paths.recognizer)?;
            Models { detector, recognizer }
        }
    };
    Ok(slot.insert(models))
}

/// Decode the image at `path`, choosing the decoder from the file contents.
///
/// The extension is only a fallback when the contents are not recognized.
fn decode_image(path: &Path) -> Result<RgbImage, VerifyError> {
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(ImageError::IoError)
        .and_then(|reader| reader.decode())
        .map(|image| image.to_rgb8())
        .map_err(|source| VerifyError::Image {
            path: path.display().to_string(),
            source,
        })
}

/// Embed the most confident face in the image at `path`.
fn embed(models: &mut Models, path: &Path) -> Result<(Embedding, f32), VerifyError> {
    let image = decode_image(path)?;

    let face = models
        .detector
        .detect(&image)?
        .into_iter()
        .next()
        .ok_or_else(|| VerifyError::NoFaceDetected(path.display().to_string()))?;

    let embedding = models.recognizer.extract(&image, &face)?;
    Ok((embedding, face.confidence))
}
