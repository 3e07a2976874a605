//! PriceForge: house price estimation from a small real-estate dataset
//!
//! This library cleans the training CSV, encodes locations, fits a linear or
//! ensemble regression pipeline, evaluates it, and persists it so a separate
//! inference step can produce formatted price estimates.

pub mod artifact;
pub mod cli;
pub mod config;
pub mod data;
pub mod encoder;
pub mod evaluate;
pub mod model;
pub mod predictor;
pub mod scaler;
pub mod target;
pub mod train;
pub mod trees;

// Re-export public items for easier access
pub use artifact::{load_artifacts, save_artifacts, ArtifactError, ArtifactPaths};
pub use config::{ModelConfig, OutlierPolicy, TrainConfig};
pub use data::{load_and_clean, CleaningReport, HouseData};
pub use encoder::{EncoderError, LocationEncoder};
pub use evaluate::{EvaluationReport, RegressionScores};
pub use model::{FeatureVector, ModelKind, PricePipeline};
pub use predictor::{format_currency, Estimate, LoadState, PredictError, PriceQuery, PriceTier, Predictor, SharedPredictor};
pub use target::TargetTransform;
pub use train::{prepare_features, run_training, train_and_save, TrainingOutcome};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
