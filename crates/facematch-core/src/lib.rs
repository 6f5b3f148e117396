//! facematch-core: Face detection, recognition and pairwise verification.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition,
//! both running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod detector;
pub mod recognizer;
pub mod types;
pub mod verifier;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Embedding, Verification};
pub use verifier::{FaceVerifier, ModelPaths, OnnxVerifier, VerifyError};

/// Default location of the ONNX model files.
///
/// `$XDG_DATA_HOME/facematch/models`, else `$HOME/.local/share/facematch/models`.
pub fn default_model_dir() -> PathBuf {
    data_dir(
        std::env::var("XDG_DATA_HOME").ok(),
        std::env::var("HOME").ok(),
    )
    .join("models")
}

fn data_dir(xdg_data_home: Option<String>, home: Option<String>) -> PathBuf {
    xdg_data_home
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(home.unwrap_or_else(|| "/tmp".to_string())).join(".local/share")
        })
        .join("facematch")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_prefers_xdg() {
        let dir = data_dir(Some("/xdg".into()), Some("/home/u".into()));
        assert_eq!(dir, PathBuf::from("/xdg/facematch"));
    }

    #[test]
    fn test_data_dir_falls_back_to_home() {
        let dir = data_dir(Some(String::new()), Some("/home/u".into()));
        assert_eq!(dir, PathBuf::from("/home/u/.local/share/facematch"));
    }
}
