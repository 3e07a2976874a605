//! Command-line interface definitions and argument parsing

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{default_artifact_dir, default_dataset_path, ModelConfig, OutlierPolicy, TrainConfig};
use crate::model::ModelKind;
use crate::target::TargetTransform;

/// House price estimation: train a regression pipeline and query it
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Clean the dataset, fit and evaluate a pipeline, and save the artifacts
    Train(TrainArgs),
    /// Estimate the price of one house from the saved artifacts
    Predict(PredictArgs),
    /// List the locations the saved model knows
    Locations(ArtifactArgs),
}

/// Price outlier filter selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutlierMode {
    /// Inter-quartile range fence (see --iqr-factor)
    Iqr,
    /// Drop prices at or above an upper quantile (see --upper-quantile)
    Quantile,
    /// Keep every row
    #[value(name = "none")]
    Disabled,
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Path to the input CSV file [default: dataset/house_data.csv in the crate]
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory the artifacts are written to [default: model/ in the crate]
    #[arg(short, long)]
    pub artifacts: Option<PathBuf>,

    /// Pipeline layout to train
    #[arg(short, long, value_enum, default_value = "ensemble")]
    pub model: ModelKind,

    /// Target transform applied to prices before fitting
    #[arg(long, value_enum, default_value = "log")]
    pub target: TargetTransform,

    /// Price outlier filter
    #[arg(long, value_enum, default_value = "iqr")]
    pub outliers: OutlierMode,

    /// Fence width in inter-quartile ranges
    #[arg(long, default_value = "1.5")]
    pub iqr_factor: f64,

    /// Quantile used by `--outliers quantile`
    #[arg(long, default_value = "0.99")]
    pub upper_quantile: f64,

    /// Fraction of rows held out for evaluation
    #[arg(long, default_value = "0.2")]
    pub test_size: f64,

    /// Seed for the split and the tree ensembles
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of cross-validation folds
    #[arg(long, default_value = "5")]
    pub cv_folds: usize,

    /// Worker threads for tree construction (0 = all cores)
    #[arg(long, default_value = "0")]
    pub n_jobs: usize,
}

impl TrainArgs {
    pub fn outlier_policy(&self) -> OutlierPolicy {
        match self.outliers {
            OutlierMode::Iqr => OutlierPolicy::Iqr {
                factor: self.iqr_factor,
            },
            OutlierMode::Quantile => OutlierPolicy::UpperQuantile {
                quantile: self.upper_quantile,
            },
            OutlierMode::Disabled => OutlierPolicy::Disabled,
        }
    }
}

impl From<TrainArgs> for TrainConfig {
    fn from(args: TrainArgs) -> Self {
        let outliers = args.outlier_policy();
        let model = ModelConfig {
            kind: args.model,
            target: args.target,
            ..ModelConfig::default()
        }
        .with_forest_runtime(args.n_jobs, args.seed);

        TrainConfig {
            dataset: args.input.unwrap_or_else(default_dataset_path),
            artifact_dir: args.artifacts.unwrap_or_else(default_artifact_dir),
            outliers,
            model,
            test_fraction: args.test_size,
            split_seed: args.seed,
            cv_folds: args.cv_folds,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ArtifactArgs {
    /// Directory holding the artifacts [default: model/ in the crate]
    #[arg(short, long)]
    pub artifacts: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Location, exactly as listed by the `locations` command
    #[arg(short, long)]
    pub location: String,

    /// Built-up area in square feet
    #[arg(long, default_value = "1200")]
    pub area: f64,

    /// Number of bedrooms, hall and kitchen (1-5)
    #[arg(long, default_value = "2")]
    pub bhk: u32,

    /// Number of bathrooms (1-5)
    #[arg(long, default_value = "2")]
    pub bathroom: u32,

    #[command(flatten)]
    pub artifacts: ArtifactArgs,
}
