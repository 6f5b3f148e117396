use serde::Serialize;

/// Bounding box for a detected face, with optional facial landmarks.
///
/// Coordinates are in pixels of the original (un-letterboxed) image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, in [0, 1].
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine similarity between two embeddings, in [-1, 1]. Higher = more similar.
    ///
    /// A zero-norm vector on either side yields 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let (dot, norm_a, norm_b) = self.values.iter().zip(other.values.iter()).fold(
            (0.0f32, 0.0f32, 0.0f32),
            |(dot, na, nb), (a, b)| (dot + a * b, na + a * a, nb + b * b),
        );

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Euclidean (L2) distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Verdict for one reference/candidate pair.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    /// Whether both images show the same person.
    pub verified: bool,
    /// Cosine similarity of the two face embeddings [-1, 1].
    pub similarity: f32,
    /// Cosine distance (`1 - similarity`).
    pub distance: f32,
    /// Minimum similarity required for `verified`.
    pub threshold: f32,
    /// Recognition model that produced the embeddings.
    pub model: String,
    /// Detector confidence of the face used from the reference image.
    pub reference_confidence: f32,
    /// Detector confidence of the face used from the candidate image.
    pub candidate_confidence: f32,
}

impl Verification {
    /// Compare two embeddings against `threshold`.
    pub fn from_embeddings(
        reference: &Embedding,
        candidate: &Embedding,
        threshold: f32,
        reference_confidence: f32,
        candidate_confidence: f32,
    ) -> Self {
        let similarity = reference.similarity(candidate);
        let model = candidate
            .model_version
            .clone()
            .or_else(|| reference.model_version.clone())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            verified: similarity >= threshold,
            similarity,
            distance: 1.0 - similarity,
            threshold,
            model,
            reference_confidence,
            candidate_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding { values: values.to_vec(), model_version: None }
    }

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 1.0, landmarks: None }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = emb(&[1.0, 0.0, 0.0]);
        assert!((a.similarity(&a.clone()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(emb(&[1.0, 0.0]).similarity(&emb(&[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let s = emb(&[1.0, 0.0]).similarity(&emb(&[-1.0, 0.0]));
        assert!((s + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(emb(&[0.0, 0.0]).similarity(&emb(&[1.0, 0.0])), 0.0);
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = emb(&[0.3, -0.2, 0.9]);
        assert!(a.euclidean_distance(&a.clone()).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_orthogonal_unit() {
        let d = emb(&[1.0, 0.0]).euclidean_distance(&emb(&[0.0, 1.0]));
        assert!((d - std::f32::consts::SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_iou_identical() {
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(20.0, 20.0, 10.0, 10.0);
        assert!(a.iou(&b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(5.0, 0.0, 10.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_verification_threshold_inclusive() {
        let a = emb(&[1.0, 0.0]);
        let v = Verification::from_embeddings(&a, &a.clone(), 1.0, 0.9, 0.8);
        assert!(v.verified);
        assert!(v.distance.abs() < 1e-6);
        assert_eq!(v.model, "unknown");
    }

    #[test]
    fn test_verification_below_threshold() {
        let a = Embedding { values: vec![1.0, 0.0], model_version: Some("w600k_r50".into()) };
        let b = emb(&[0.0, 1.0]);
        let v = Verification::from_embeddings(&a, &b, 0.4, 0.9, 0.8);
        assert!(!v.verified);
        assert_eq!(v.model, "w600k_r50");
        assert!((v.distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_verification_serializes_verdict_fields() {
        let a = emb(&[1.0, 0.0]);
        let v = Verification::from_embeddings(&a, &a.clone(), 0.4, 0.9, 0.8);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["verified"], true);
        assert!(json.get("similarity").is_some());
        assert!(json.get("threshold").is_some());
    }
}
