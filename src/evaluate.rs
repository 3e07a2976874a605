//! Hold-out and cross-validated evaluation of a pipeline

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt;

use crate::config::ModelConfig;
use crate::model::PricePipeline;

/// Row indices of one train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Seeded shuffle split. The test part takes `ceil(n * test_fraction)` rows
/// from the front of the permutation.
pub fn train_test_split(n_samples: usize, test_fraction: f64, seed: u64) -> crate::Result<Split> {
    let n_test = (n_samples as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        anyhow::bail!(
            "cannot split {} rows with test fraction {}: both parts must be non-empty",
            n_samples,
            test_fraction
        );
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(Split {
        train,
        test: indices,
    })
}

/// Contiguous, unshuffled folds; the first `n % k` folds get one extra row
pub fn k_fold(n_samples: usize, n_folds: usize) -> crate::Result<Vec<Split>> {
    if n_folds < 2 {
        anyhow::bail!("k-fold needs at least 2 folds, got {}", n_folds);
    }
    if n_samples < n_folds {
        anyhow::bail!("cannot make {} folds from {} rows", n_folds, n_samples);
    }

    let base = n_samples / n_folds;
    let extra = n_samples % n_folds;
    let mut start = 0;
    let mut splits = Vec::with_capacity(n_folds);

    for fold in 0..n_folds {
        let size = base + usize::from(fold < extra);
        let end = start + size;
        splits.push(Split {
            train: (0..start).chain(end..n_samples).collect(),
            test: (start..end).collect(),
        });
        start = end;
    }

    Ok(splits)
}

/// Coefficient of determination.
///
/// A constant ground truth scores 1.0 when predicted exactly and 0.0
/// otherwise, so the result is always finite.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    (y_true - y_pred).mapv(f64::abs).mean().unwrap_or(0.0)
}

pub fn root_mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    (y_true - y_pred).mapv(|e| e * e).mean().unwrap_or(0.0).sqrt()
}

/// Scores on held-out rows, in currency units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionScores {
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
    pub n_samples: usize,
}

impl RegressionScores {
    pub fn calculate(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        Self {
            r2: r2_score(y_true, y_pred),
            mae: mean_absolute_error(y_true, y_pred),
            rmse: root_mean_squared_error(y_true, y_pred),
            n_samples: y_true.len(),
        }
    }
}

/// Score a fitted pipeline on rows it was not trained on
pub fn evaluate_holdout(
    pipeline: &PricePipeline,
    features: &Array2<f64>,
    prices: &Array1<f64>,
) -> crate::Result<RegressionScores> {
    let predictions = pipeline.predict(features)?;
    Ok(RegressionScores::calculate(prices, &predictions))
}

/// Per-fold R² measured in the pipeline's target space
#[derive(Debug, Clone, PartialEq)]
pub struct CrossValidation {
    pub fold_scores: Vec<f64>,
}

impl CrossValidation {
    pub fn mean(&self) -> f64 {
        self.fold_scores.iter().sum::<f64>() / self.fold_scores.len() as f64
    }

    pub fn std(&self) -> f64 {
        let mean = self.mean();
        let var = self
            .fold_scores
            .iter()
            .map(|s| (s - mean).powi(2))
            .sum::<f64>()
            / self.fold_scores.len() as f64;
        var.sqrt()
    }
}

/// Refit the whole pipeline on each training fold and score the held-out
/// fold. The scaler is refitted per fold, so no test statistics leak in.
pub fn cross_validate(
    features: &Array2<f64>,
    prices: &Array1<f64>,
    config: &ModelConfig,
    n_folds: usize,
) -> crate::Result<CrossValidation> {
    let mut fold_scores = Vec::with_capacity(n_folds);

    for (fold, split) in k_fold(features.nrows(), n_folds)?.into_iter().enumerate() {
        let x_train = features.select(Axis(0), &split.train);
        let y_train = prices.select(Axis(0), &split.train);
        let x_test = features.select(Axis(0), &split.test);
        let y_test = prices.select(Axis(0), &split.test);

        let pipeline = PricePipeline::fit(&x_train, &y_train, config)?;
        let predicted = pipeline.predict_target(&x_test)?;
        let score = r2_score(&config.target.forward_all(&y_test), &predicted);
        tracing::debug!(fold, score, "cross-validation fold scored");
        fold_scores.push(score);
    }

    Ok(CrossValidation { fold_scores })
}

/// Everything the training job reports after fitting
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub holdout: RegressionScores,
    pub cross_validation: CrossValidation,
}

impl EvaluationReport {
    pub fn log(&self) {
        tracing::info!(
            r2 = self.holdout.r2,
            mae = self.holdout.mae,
            rmse = self.holdout.rmse,
            cv_r2 = self.cross_validation.mean(),
            "evaluation finished"
        );
        if self.holdout.r2 < 0.0 {
            tracing::warn!("hold-out R² is negative; the model is worse than predicting the mean");
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Model Evaluation ===")?;
        writeln!(f, "Hold-out rows:            {}", self.holdout.n_samples)?;
        writeln!(f, "R² score:                 {:.4}", self.holdout.r2)?;
        writeln!(f, "Mean absolute error:      {:.2}", self.holdout.mae)?;
        writeln!(f, "Root mean squared error:  {:.2}", self.holdout.rmse)?;
        let folds: Vec<String> = self
            .cross_validation
            .fold_scores
            .iter()
            .map(|s| format!("{:.3}", s))
            .collect();
        writeln!(f, "Cross-validated R² folds: [{}]", folds.join(", "))?;
        write!(
            f,
            "Cross-validated R² mean:  {:.4} (± {:.4})",
            self.cross_validation.mean(),
            self.cross_validation.std()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_split_sizes_and_coverage() {
        let split = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.train.len(), 8);
        let mut all: Vec<usize> = split.train.iter().chain(split.test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_rounds_test_size_up() {
        let split = train_test_split(8, 0.2, 42).unwrap();
        assert_eq!(split.test.len(), 2);
    }

    #[test]
    fn test_split_is_seeded() {
        assert_eq!(train_test_split(50, 0.2, 7).unwrap(), train_test_split(50, 0.2, 7).unwrap());
        assert_ne!(train_test_split(50, 0.2, 7).unwrap(), train_test_split(50, 0.2, 8).unwrap());
    }

    #[test]
    fn test_split_too_small() {
        assert!(train_test_split(1, 0.2, 42).is_err());
        assert!(train_test_split(0, 0.2, 42).is_err());
    }

    #[test]
    fn test_k_fold_layout() {
        let folds = k_fold(8, 3).unwrap();
        let sizes: Vec<usize> = folds.iter().map(|s| s.test.len()).collect();
        assert_eq!(sizes, vec![3, 3, 2]);
        assert_eq!(folds[0].test, vec![0, 1, 2]);
        assert_eq!(folds[2].train, vec![0, 1, 2, 3, 4, 5]);
        assert!(k_fold(2, 3).is_err());
        assert!(k_fold(10, 1).is_err());
    }

    #[test]
    fn test_metrics() {
        let truth = array![3.0, -0.5, 2.0, 7.0];
        let pred = array![2.5, 0.0, 2.0, 8.0];
        assert_relative_eq!(mean_absolute_error(&truth, &pred), 0.5);
        assert_relative_eq!(root_mean_squared_error(&truth, &pred), 0.375f64.sqrt());
        assert_relative_eq!(r2_score(&truth, &pred), 0.948_608_137_044_967_9, max_relative = 1e-12);
    }

    #[test]
    fn test_r2_constant_truth() {
        let truth = array![5.0];
        assert_eq!(r2_score(&truth, &array![5.0]), 1.0);
        assert_eq!(r2_score(&truth, &array![4.0]), 0.0);
    }

    #[test]
    fn test_report_display() {
        let report = EvaluationReport {
            holdout: RegressionScores {
                r2: 0.8,
                mae: 1000.0,
                rmse: 1500.0,
                n_samples: 4,
            },
            cross_validation: CrossValidation {
                fold_scores: vec![0.7, 0.9],
            },
        };
        let text = report.to_string();
        assert!(text.contains("R² score:                 0.8000"));
        assert!(text.contains("[0.700, 0.900]"));
        assert_relative_eq!(report.cross_validation.mean(), 0.8);
    }
}
