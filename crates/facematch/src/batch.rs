//! Batch verification of a candidate directory against one reference photo.
//!
//! Enumeration failures are fatal. Verification failures are per-candidate:
//! they become [`Outcome::Failed`], get reported, and the batch moves on.

use crate::report::Reporter;
use facematch_core::FaceVerifier;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("failed to list candidate directory {path}: {source}")]
    ListDir {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write outcome: {0}")]
    Output(#[from] io::Error),
}

/// Inputs of one batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub reference: PathBuf,
    pub candidates_dir: PathBuf,
    /// Case-sensitive filename suffix, e.g. `.png`.
    pub extension: String,
}

/// A directory entry selected for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Entry name, lossily decoded for display.
    pub name: String,
    pub path: PathBuf,
}

/// Result for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Matched,
    NotMatched,
    Failed(String),
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Matched => "matched",
            Outcome::NotMatched => "not_matched",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// List entries of `dir` whose name ends with `extension`, in directory order.
pub fn list_candidates(dir: &Path, extension: &str) -> Result<Vec<Candidate>, BatchError> {
    let list_err = |source| BatchError::ListDir {
        path: dir.display().to_string(),
        source,
    };

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_err)? {
        let entry = entry.map_err(list_err)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(extension) {
            continue;
        }
        candidates.push(Candidate {
            name,
            path: entry.path(),
        });
    }

    Ok(candidates)
}

/// Runs a [`FaceVerifier`] over every candidate of a directory.
pub struct BatchVerifier<V> {
    verifier: V,
    config: BatchConfig,
}

impl<V: FaceVerifier> BatchVerifier<V> {
    pub fn new(verifier: V, config: BatchConfig) -> Self {
        Self { verifier, config }
    }

    /// Verify one candidate. Never fails: errors are folded into the outcome.
    pub fn verify_candidate(&mut self, candidate: &Candidate) -> Outcome {
        match self.verifier.verify(&self.config.reference, &candidate.path) {
            Ok(verification) => {
                tracing::debug!(
                    file = %candidate.name,
                    similarity = verification.similarity,
                    threshold = verification.threshold,
                    verified = verification.verified,
                    "candidate verified"
                );
                if verification.verified {
                    Outcome::Matched
                } else {
                    Outcome::NotMatched
                }
            }
            Err(err) => {
                tracing::warn!(
                    file = %candidate.name,
                    error = %err,
                    "candidate verification failed"
                );
                Outcome::Failed(err.to_string())
            }
        }
    }

    /// Verify every candidate in listing order, reporting each as soon as it is known.
    pub fn run<W: Write>(&mut self, reporter: &mut Reporter<W>) -> Result<(), BatchError> {
        let candidates = list_candidates(&self.config.candidates_dir, &self.config.extension)?;

        tracing::info!(
            reference = %self.config.reference.display(),
            dir = %self.config.candidates_dir.display(),
            extension = %self.config.extension,
            candidates = candidates.len(),
            "starting batch verification"
        );

        for candidate in &candidates {
            let outcome = self.verify_candidate(candidate);
            reporter.report(candidate, &outcome)?;
        }

        Ok(())
    }

    pub fn into_inner(self) -> V {
        self.verifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::Verification;

    fn scratch_dir(name: &str, files: &[&str]) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("facematch-unit-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        for file in files {
            fs::write(dir.join(file), b"").unwrap();
        }
        dir
    }

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct StubError(String);

    /// Verdict by file name; names starting with "bad" fail.
    struct ByName;

    impl FaceVerifier for ByName {
        type Error = StubError;

        fn verify(&mut self, _: &Path, candidate: &Path) -> Result<Verification, StubError> {
            let name = candidate.file_name().unwrap().to_string_lossy().into_owned();
            if name.starts_with("bad") {
                return Err(StubError(format!("cannot read {name}")));
            }
            Ok(Verification {
                verified: name.starts_with("same"),
                similarity: 0.5,
                distance: 0.5,
                threshold: 0.4,
                model: "stub".into(),
                reference_confidence: 1.0,
                candidate_confidence: 1.0,
            })
        }
    }

    fn batch(dir: &Path) -> BatchVerifier<ByName> {
        BatchVerifier::new(
            ByName,
            BatchConfig {
                reference: PathBuf::from("person.jpg"),
                candidates_dir: dir.to_path_buf(),
                extension: ".png".into(),
            },
        )
    }

    #[test]
    fn test_list_candidates_filters_extension() {
        let dir = scratch_dir("filter", &["a.png", "b.PNG", "notes.txt", "c.png.bak", "d.png"]);
        let mut names: Vec<String> = list_candidates(&dir, ".png")
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.png", "d.png"]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_list_candidates_builds_paths_in_dir() {
        let dir = scratch_dir("paths", &["a.png"]);
        let candidates = list_candidates(&dir, ".png").unwrap();
        assert_eq!(candidates[0].path, dir.join("a.png"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_list_candidates_missing_dir() {
        let dir = std::env::temp_dir().join("facematch-unit-does-not-exist");
        let err = list_candidates(&dir, ".png").unwrap_err();
        assert!(matches!(err, BatchError::ListDir { .. }));
        assert!(err.to_string().contains("facematch-unit-does-not-exist"));
    }

    #[test]
    fn test_verify_candidate_maps_verdicts() {
        let mut b = batch(Path::new("/faces"));
        let c = |name: &str| Candidate {
            name: name.into(),
            path: PathBuf::from("/faces").join(name),
        };

        assert_eq!(b.verify_candidate(&c("same1.png")), Outcome::Matched);
        assert_eq!(b.verify_candidate(&c("other.png")), Outcome::NotMatched);
        assert_eq!(
            b.verify_candidate(&c("bad.png")),
            Outcome::Failed("cannot read bad.png".into())
        );
    }

    #[test]
    fn test_run_reports_every_candidate() {
        let dir = scratch_dir("run", &["same.png", "bad.png", "other.png", "skip.jpg"]);
        let mut reporter = Reporter::new(Vec::new(), crate::report::OutputFormat::Text);
        batch(&dir).run(&mut reporter).unwrap();

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let mut lines: Vec<&str> = out.lines().collect();
        lines.sort();
        assert_eq!(
            lines,
            vec!["cannot read bad.png", "filename match! same.png", "no match for other.png"]
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_run_missing_dir_reports_nothing() {
        let dir = std::env::temp_dir().join("facematch-unit-run-missing");
        let mut reporter = Reporter::new(Vec::new(), crate::report::OutputFormat::Text);
        assert!(batch(&dir).run(&mut reporter).is_err());
        assert!(reporter.into_inner().is_empty());
    }

    #[test]
    fn test_outcome_kind() {
        assert_eq!(Outcome::Matched.kind(), "matched");
        assert_eq!(Outcome::NotMatched.kind(), "not_matched");
        assert_eq!(Outcome::Failed(String::new()).kind(), "failed");
    }
}
