use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facematch::{BatchVerifier, Config, Overrides, OutputFormat, Reporter};
use facematch_core::{FaceVerifier, OnnxVerifier};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "facematch",
    about = "Verify a directory of face images against a reference photo"
)]
struct Cli {
    /// TOML config file (default: $FACEMATCH_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EngineArgs {
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long)]
    model_dir: Option<PathBuf>,
    /// Cosine similarity required for a match, in [-1, 1]
    #[arg(long)]
    threshold: Option<f32>,
    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify every candidate image against the reference photo
    Run {
        /// Photo of the person to look for
        #[arg(long)]
        reference: Option<PathBuf>,
        /// Directory of candidate images
        #[arg(long)]
        candidates: Option<PathBuf>,
        /// Filename suffix selecting candidates (e.g. ".png")
        #[arg(long)]
        extension: Option<String>,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Verify a single pair of images
    Compare {
        reference: PathBuf,
        candidate: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_file = cli
        .config
        .or_else(|| std::env::var_os("FACEMATCH_CONFIG").map(PathBuf::from));
    let mut config = Config::load(config_file.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Run {
            reference,
            candidates,
            extension,
            engine,
        } => {
            config.apply(Overrides {
                reference,
                candidates_dir: candidates,
                extension,
                ..engine.into()
            });
            config.validate()?;
            run(&config)
        }
        Commands::Compare {
            reference,
            candidate,
            engine,
        } => {
            config.apply(engine.into());
            config.validate()?;
            compare(&config, reference, candidate)
        }
    }
}

impl From<EngineArgs> for Overrides {
    fn from(args: EngineArgs) -> Self {
        Overrides {
            model_dir: args.model_dir,
            similarity_threshold: args.threshold,
            format: args.format,
            ..Default::default()
        }
    }
}

fn run(config: &Config) -> Result<()> {
    let verifier = OnnxVerifier::new(config.model_paths(), config.similarity_threshold);
    let mut batch = BatchVerifier::new(verifier, config.batch());
    let mut reporter = Reporter::new(std::io::stdout().lock(), config.format);

    batch.run(&mut reporter)?;
    Ok(())
}

fn compare(config: &Config, reference: PathBuf, candidate: PathBuf) -> Result<()> {
    let mut verifier = OnnxVerifier::new(config.model_paths(), config.similarity_threshold);
    let verification = verifier
        .verify(&reference, &candidate)
        .with_context(|| {
            format!("comparing {} with {}", reference.display(), candidate.display())
        })?;

    match config.format {
        OutputFormat::Text => {
            println!("verified:   {}", verification.verified);
            println!(
                "similarity: {:.4} (threshold {:.2})",
                verification.similarity, verification.threshold
            );
            println!("model:      {}", verification.model);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&verification)?),
    }

    Ok(())
}
