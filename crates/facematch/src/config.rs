use crate::batch::BatchConfig;
use crate::report::OutputFormat;
use clap::ValueEnum;
use facematch_core::ModelPaths;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_REFERENCE: &str = "target_person.jpeg";
pub const DEFAULT_CANDIDATES_DIR: &str = "output/cropped";
pub const DEFAULT_EXTENSION: &str = ".png";
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.40;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("extension filter must not be empty")]
    EmptyExtension,
    #[error("similarity threshold must be within [-1, 1], got {0}")]
    InvalidThreshold(f32),
}

/// Run configuration.
///
/// Resolved from, lowest precedence first: built-in defaults, an optional
/// TOML file, `FACEMATCH_*` environment variables, command-line flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Photo of the person being searched for.
    pub reference: PathBuf,
    /// Directory holding the candidate face crops.
    pub candidates_dir: PathBuf,
    /// Case-sensitive filename suffix selecting candidates.
    pub extension: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    pub format: OutputFormat,
}

/// Keys accepted in the TOML config file. All optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    reference: Option<PathBuf>,
    candidates_dir: Option<PathBuf>,
    extension: Option<String>,
    model_dir: Option<PathBuf>,
    similarity_threshold: Option<f32>,
    format: Option<OutputFormat>,
}

/// Command-line values; `None` keeps the lower layer.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub reference: Option<PathBuf>,
    pub candidates_dir: Option<PathBuf>,
    pub extension: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub similarity_threshold: Option<f32>,
    pub format: Option<OutputFormat>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference: PathBuf::from(DEFAULT_REFERENCE),
            candidates_dir: PathBuf::from(DEFAULT_CANDIDATES_DIR),
            extension: DEFAULT_EXTENSION.to_string(),
            model_dir: facematch_core::default_model_dir(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            format: OutputFormat::default(),
        }
    }
}

impl Config {
    /// Defaults, then `file` if given, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = file {
            let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            config.merge_toml(&src).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        }
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn merge_toml(&mut self, src: &str) -> Result<(), toml::de::Error> {
        let file: FileConfig = toml::from_str(src)?;
        self.apply(Overrides {
            reference: file.reference,
            candidates_dir: file.candidates_dir,
            extension: file.extension,
            model_dir: file.model_dir,
            similarity_threshold: file.similarity_threshold,
            format: file.format,
        });
        Ok(())
    }

    /// Apply `FACEMATCH_*` variables looked up through `var`.
    ///
    /// Values that fail to parse leave the current setting in place.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("FACEMATCH_REFERENCE") {
            self.reference = PathBuf::from(v);
        }
        if let Some(v) = var("FACEMATCH_CANDIDATES_DIR") {
            self.candidates_dir = PathBuf::from(v);
        }
        if let Some(v) = var("FACEMATCH_EXTENSION") {
            self.extension = v;
        }
        if let Some(v) = var("FACEMATCH_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        self.similarity_threshold =
            env_f32(&var, "FACEMATCH_SIMILARITY_THRESHOLD", self.similarity_threshold);
        if let Some(format) =
            var("FACEMATCH_FORMAT").and_then(|v| OutputFormat::from_str(&v, true).ok())
        {
            self.format = format;
        }
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(v) = overrides.reference {
            self.reference = v;
        }
        if let Some(v) = overrides.candidates_dir {
            self.candidates_dir = v;
        }
        if let Some(v) = overrides.extension {
            self.extension = v;
        }
        if let Some(v) = overrides.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = overrides.similarity_threshold {
            self.similarity_threshold = v;
        }
        if let Some(v) = overrides.format {
            self.format = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extension.is_empty() {
            return Err(ConfigError::EmptyExtension);
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::InvalidThreshold(self.similarity_threshold));
        }
        Ok(())
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }

    pub fn batch(&self) -> BatchConfig {
        BatchConfig {
            reference: self.reference.clone(),
            candidates_dir: self.candidates_dir.clone(),
            extension: self.extension.clone(),
        }
    }
}

fn env_f32<F>(var: &F, key: &str, default: f32) -> f32
where
    F: Fn(&str) -> Option<String>,
{
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
