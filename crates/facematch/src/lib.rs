//! facematch: batch face verification.
//!
//! Compares one reference photo against every candidate image in a
//! directory and reports a verdict line per candidate.

pub mod batch;
pub mod config;
pub mod report;

pub use batch::{list_candidates, BatchConfig, BatchError, BatchVerifier, Candidate, Outcome};
pub use config::{Config, ConfigError, Overrides};
pub use report::{OutputFormat, Reporter};
