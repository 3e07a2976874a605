//! Training configuration shared by the CLI and the library

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::ModelKind;
use crate::target::TargetTransform;

/// Directory holding the sample dataset and the default artifact directory,
/// resolved at compile time so it does not depend on the working directory.
pub const CRATE_DIR: &str = env!("CARGO_MANIFEST_DIR");

/// Default location of the training CSV
pub fn default_dataset_path() -> PathBuf {
    PathBuf::from(CRATE_DIR).join("dataset").join("house_data.csv")
}

/// Default directory for the two model artifacts
pub fn default_artifact_dir() -> PathBuf {
    PathBuf::from(CRATE_DIR).join("model")
}

/// How price outliers are removed during cleaning.
///
/// Only one policy is active per training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OutlierPolicy {
    /// Keep rows with `Q1 - factor*IQR <= price <= Q3 + factor*IQR`
    Iqr { factor: f64 },
    /// Keep rows with `price < quantile(price)`
    UpperQuantile { quantile: f64 },
    /// No outlier filtering
    Disabled,
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        OutlierPolicy::Iqr { factor: 1.5 }
    }
}

/// Hyper-parameters of a tree ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth (None = grow until pure or too small)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples in each child of a split
    pub min_samples_leaf: usize,
    /// Draw a bootstrap sample per tree
    pub bootstrap: bool,
    /// Worker threads used to build trees (0 = all cores)
    pub n_jobs: usize,
    /// Base seed; tree `i` uses `seed + i`
    pub seed: u64,
}

impl ForestParams {
    pub fn random_forest() -> Self {
        Self {
            n_estimators: 200,
            max_depth: Some(15),
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
            n_jobs: 0,
            seed: 42,
        }
    }

    pub fn extra_trees() -> Self {
        Self {
            n_estimators: 300,
            max_depth: Some(20),
            bootstrap: false,
            ..Self::random_forest()
        }
    }
}

/// Everything needed to fit one pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub target: TargetTransform,
    /// Vote weights for linear, random forest and extra trees
    pub weights: [f64; 3],
    pub random_forest: ForestParams,
    pub extra_trees: ForestParams,
}

impl ModelConfig {
    /// Apply one worker-count hint and seed to both forests
    pub fn with_forest_runtime(mut self, n_jobs: usize, seed: u64) -> Self {
        for params in [&mut self.random_forest, &mut self.extra_trees] {
            params.n_jobs = n_jobs;
            params.seed = seed;
        }
        self
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Ensemble,
            target: TargetTransform::Log1p,
            weights: [1.0, 2.0, 3.0],
            random_forest: ForestParams::random_forest(),
            extra_trees: ForestParams::extra_trees(),
        }
    }
}

/// Configuration of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub dataset: PathBuf,
    pub artifact_dir: PathBuf,
    pub outliers: OutlierPolicy,
    pub model: ModelConfig,
    /// Fraction of rows held out for evaluation
    pub test_fraction: f64,
    pub split_seed: u64,
    pub cv_folds: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset_path(),
            artifact_dir: default_artifact_dir(),
            outliers: OutlierPolicy::default(),
            model: ModelConfig::default(),
            test_fraction: 0.2,
            split_seed: 42,
            cv_folds: 5,
        }
    }
}

impl TrainConfig {
    /// Reject settings that cannot produce a meaningful run
    pub fn validate(&self) -> crate::Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            anyhow::bail!(
                "test fraction must be strictly between 0 and 1, got {}",
                self.test_fraction
            );
        }
        if self.cv_folds < 2 {
            anyhow::bail!("cross-validation needs at least 2 folds, got {}", self.cv_folds);
        }
        match self.outliers {
            OutlierPolicy::Iqr { factor } if !(factor >= 0.0) => {
                anyhow::bail!("IQR factor must be non-negative, got {}", factor)
            }
            OutlierPolicy::UpperQuantile { quantile } if !(quantile > 0.0 && quantile <= 1.0) => {
                anyhow::bail!("upper quantile must be in (0, 1], got {}", quantile)
            }
            _ => {}
        }
        if self.model.weights.iter().any(|w| !(*w >= 0.0)) || self.model.weights.iter().sum::<f64>() <= 0.0 {
            anyhow::bail!("ensemble weights must be non-negative and not all zero");
        }
        for params in [&self.model.random_forest, &self.model.extra_trees] {
            if params.n_estimators == 0 {
                anyhow::bail!("a forest needs at least one tree");
            }
        }
        Ok(())
    }
}
