//! Outcome lines written to stdout as each candidate finishes.

use crate::batch::{Candidate, Outcome};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Output line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `filename match! <name>` / `no match for <name>` / error text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Serialize)]
struct Record<'a> {
    file: &'a str,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// Writes one line per outcome, flushing after each.
pub struct Reporter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn report(&mut self, candidate: &Candidate, outcome: &Outcome) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(self.out, "{}", text_line(&candidate.name, outcome))?,
            OutputFormat::Json => {
                let record = Record {
                    file: &candidate.name,
                    outcome: outcome.kind(),
                    reason: match outcome {
                        Outcome::Failed(reason) => Some(reason.as_str()),
                        _ => None,
                    },
                };
                serde_json::to_writer(&mut self.out, &record)?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn text_line(name: &str, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Matched => format!("filename match! {name}"),
        Outcome::NotMatched => format!("no match for {name}"),
        Outcome::Failed(reason) => single_line(reason),
    }
}

/// Join the non-blank lines of `text` with spaces.
fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
