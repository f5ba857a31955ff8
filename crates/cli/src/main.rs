//! IKU Predictor CLI
//!
//! A command-line tool for training the hybrid air quality model,
//! augmenting datasets, running offline predictions and evaluations,
//! and querying a running prediction agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use commands::{augment, evaluate, inspect, predict, remote, train};
use iku_lib::{AugmentParams, FeatureVector};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// IKU Predictor CLI
#[derive(Parser)]
#[command(name = "iku")]
#[command(author, version, about = "CLI for the IKU Air Quality Predictor", long_about = None)]
pub struct Cli {
    /// Agent endpoint URL (can also be set via IKU_API_URL env var)
    #[arg(long, env = "IKU_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a hybrid model and write the artifact
    Train(TrainArgs),

    /// Write an augmented copy of a training dataset
    Augment(AugmentArgs),

    /// Predict the IKU for one province with a local artifact
    Predict(PredictArgs),

    /// Evaluate a local artifact against a hot-test dataset
    Evaluate(EvaluateArgs),

    /// Show the contents of a model artifact
    Inspect {
        /// Model artifact (falls back to artifact_path in the config file)
        #[arg(long, short)]
        artifact: Option<PathBuf>,
    },

    /// Talk to a running prediction agent
    #[command(subcommand)]
    Remote(RemoteCommands),
}

#[derive(Args)]
pub struct TrainArgs {
    /// Training dataset (CSV)
    #[arg(long, short)]
    pub data: PathBuf,

    /// Hot-test dataset evaluated after training (CSV)
    #[arg(long)]
    pub hot: Option<PathBuf>,

    /// Where to write the model artifact
    #[arg(long, short)]
    pub output: PathBuf,

    /// Number of trees in the ensemble
    #[arg(long, default_value_t = 100)]
    pub trees: usize,

    /// Maximum tree depth (unlimited if not specified)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Seed for the forest and the train/test split
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Fraction of rows held out for testing
    #[arg(long, default_value_t = 0.2)]
    pub test_fraction: f64,

    /// Train the final forest on the original rows only
    #[arg(long)]
    pub no_augment: bool,

    /// Skip the linear fallback model
    #[arg(long)]
    pub no_linear: bool,

    /// Model version recorded in the artifact (timestamp if not specified)
    #[arg(long)]
    pub model_version: Option<String>,

    #[command(flatten)]
    pub augmentation: AugmentOpts,
}

#[derive(Args)]
pub struct AugmentArgs {
    /// Source dataset (CSV)
    #[arg(long, short)]
    pub data: PathBuf,

    /// Where to write the augmented dataset (CSV)
    #[arg(long, short)]
    pub output: PathBuf,

    /// Label synthetic rows with a forest fitted on the source rows
    #[arg(long)]
    pub relabel: bool,

    /// Trees in the relabeling forest
    #[arg(long, default_value_t = 100)]
    pub trees: usize,

    #[command(flatten)]
    pub augmentation: AugmentOpts,
}

/// Augmentation parameters shared by `train` and `augment`
#[derive(Args)]
pub struct AugmentOpts {
    /// Relative noise amplitude of the noise pass
    #[arg(long, default_value_t = 0.05)]
    pub noise_level: f64,

    /// Range fraction of the moderate extrapolation pass
    #[arg(long, default_value_t = 0.15)]
    pub extrapol_frac: f64,

    /// Range fraction of the extreme extrapolation pass
    #[arg(long, default_value_t = 0.3)]
    pub extreme_frac: f64,

    /// Rows kept after augmentation
    #[arg(long, default_value_t = 500)]
    pub n_samples: usize,

    /// Augmentation RNG seed
    #[arg(long, default_value_t = 42)]
    pub augment_seed: u64,
}

impl AugmentOpts {
    pub fn params(&self) -> AugmentParams {
        AugmentParams {
            noise_level: self.noise_level,
            extrapol_frac: self.extrapol_frac,
            extreme_frac: self.extreme_frac,
            n_samples: self.n_samples,
            random_seed: self.augment_seed,
        }
    }
}

/// The four model inputs
#[derive(Args)]
pub struct FeatureArgs {
    /// Land cover quality index, IKTL (%)
    #[arg(long, allow_negative_numbers = true)]
    pub land_cover: f64,

    /// Burned forest and land area, Karhutla (ha)
    #[arg(long, allow_negative_numbers = true)]
    pub burned_area: f64,

    /// Registered motor vehicles
    #[arg(long, allow_negative_numbers = true)]
    pub vehicles: f64,

    /// Households on PLN electricity (%)
    #[arg(long, allow_negative_numbers = true)]
    pub electricity: f64,
}

impl FeatureArgs {
    pub fn features(&self) -> FeatureVector {
        FeatureVector::new(
            self.land_cover,
            self.burned_area,
            self.vehicles,
            self.electricity,
        )
    }
}

/// Blending options for local predictions
#[derive(Args)]
pub struct BlendArgs {
    /// Extremity below which only the ensemble is used
    #[arg(long, default_value_t = 0.1)]
    pub threshold_minor: f64,

    /// Extremity from which only the linear model is used
    #[arg(long, default_value_t = 0.3)]
    pub threshold_major: f64,

    /// Never consult the linear fallback
    #[arg(long)]
    pub ensemble_only: bool,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Model artifact (falls back to artifact_path in the config file)
    #[arg(long, short)]
    pub artifact: Option<PathBuf>,

    #[command(flatten)]
    pub features: FeatureArgs,

    #[command(flatten)]
    pub blend: BlendArgs,
}

#[derive(Args)]
pub struct EvaluateArgs {
    /// Model artifact (falls back to artifact_path in the config file)
    #[arg(long, short)]
    pub artifact: Option<PathBuf>,

    /// Hot-test dataset (CSV)
    #[arg(long)]
    pub hot: PathBuf,

    /// Number of provinces in the top and bottom rankings
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    #[command(flatten)]
    pub blend: BlendArgs,
}

#[derive(Subcommand)]
pub enum RemoteCommands {
    /// Request a prediction from the agent
    Predict {
        #[command(flatten)]
        features: FeatureArgs,
    },

    /// Show agent health and readiness
    Status,

    /// Show the model loaded by the agent
    Model,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = config::Config::load()?;
    let format = match cli.format {
        Some(format) => format,
        None => config.default_format()?,
    };
    debug!(format = ?format, api_url = ?config.api_url, "CLI configured");

    match cli.command {
        Commands::Train(args) => train::run(&args, format)?,
        Commands::Augment(args) => augment::run(&args, format)?,
        Commands::Predict(args) => {
            let artifact = config.resolve_artifact(args.artifact.as_deref())?;
            predict::run(&artifact, &args, format)?;
        }
        Commands::Evaluate(args) => {
            let artifact = config.resolve_artifact(args.artifact.as_deref())?;
            evaluate::run(&artifact, &args, format)?;
        }
        Commands::Inspect { artifact } => {
            let artifact = config.resolve_artifact(artifact.as_deref())?;
            inspect::run(&artifact, format)?;
        }
        Commands::Remote(remote_cmd) => {
            let api_url = cli
                .api_url
                .or(config.api_url)
                .unwrap_or_else(|| "http://localhost:8080".to_string());
            let client = client::ApiClient::new(&api_url)
                .with_context(|| format!("Cannot use agent at {}", api_url))?;

            match remote_cmd {
                RemoteCommands::Predict { features } => {
                    remote::predict(&client, &features, format).await?;
                }
                RemoteCommands::Status => remote::status(&client, format).await?,
                RemoteCommands::Model => remote::model(&client, format).await?,
            }
        }
    }

    Ok(())
}
