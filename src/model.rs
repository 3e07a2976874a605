//! Regression pipeline: optional scaler, one or several regressors, and
//! the target transform the pipeline was trained with

use clap::ValueEnum;
use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::scaler::StandardScaler;
use crate::target::TargetTransform;
use crate::trees::{Forest, SplitStrategy};

/// Names of the feature columns, in the order the pipeline expects them
pub const FEATURE_NAMES: [&str; 4] = ["Area", "BHK", "Bathroom", "Location"];

/// Which pipeline layout to train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ModelKind {
    /// Plain linear regression on raw features
    Linear,
    /// Standard scaler followed by linear regression
    ScaledLinear,
    /// Standard scaler followed by a weighted vote of linear regression,
    /// random forest and extra trees
    Ensemble,
}

/// One house in model input form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub area: f64,
    pub bhk: f64,
    pub bathroom: f64,
    pub location_code: usize,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; 4] {
        [self.area, self.bhk, self.bathroom, self.location_code as f64]
    }

    pub fn to_matrix(&self) -> Array2<f64> {
        let values = self.to_array();
        Array2::from_shape_fn((1, 4), |(_, j)| values[j])
    }
}

/// Ordinary least squares coefficients, fitted with linfa
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearTerm {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LinearTerm {
    pub fn fit(features: &Array2<f64>, targets: &Array1<f64>) -> crate::Result<Self> {
        let dataset = Dataset::new(features.clone(), targets.clone());
        let fitted = LinearRegression::new()
            .fit(&dataset)
            .map_err(|e| anyhow::anyhow!("linear regression fit failed: {}", e))?;
        Ok(Self {
            coefficients: fitted.params().clone(),
            intercept: fitted.intercept(),
        })
    }

    pub fn predict(&self, features: &Array2<f64>) -> Array1<f64> {
        features.dot(&self.coefficients) + self.intercept
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

/// The fixed set of estimators a pipeline can hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Estimator {
    Linear(LinearTerm),
    RandomForest(Forest),
    ExtraTrees(Forest),
}

impl Estimator {
    pub fn predict(&self, features: &Array2<f64>) -> Array1<f64> {
        match self {
            Estimator::Linear(term) => term.predict(features),
            Estimator::RandomForest(forest) | Estimator::ExtraTrees(forest) => {
                forest.predict(features.view())
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Estimator::Linear(_) => "linear",
            Estimator::RandomForest(_) => "random_forest",
            Estimator::ExtraTrees(_) => "extra_trees",
        }
    }
}

/// Estimator with its vote weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedMember {
    pub weight: f64,
    pub estimator: Estimator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Regressor {
    Single(Estimator),
    /// Weighted average `sum(w_i * p_i) / sum(w_i)`
    Vote(Vec<WeightedMember>),
}

impl Regressor {
    fn predict(&self, features: &Array2<f64>) -> Array1<f64> {
        match self {
            Regressor::Single(estimator) => estimator.predict(features),
            Regressor::Vote(members) => {
                let total: f64 = members.iter().map(|m| m.weight).sum();
                let mut combined: Array1<f64> = Array1::zeros(features.nrows());
                for member in members.iter().filter(|m| m.weight > 0.0) {
                    combined.scaled_add(member.weight, &member.estimator.predict(features));
                }
                combined / total
            }
        }
    }
}

/// A fitted pipeline, immutable after [`PricePipeline::fit`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePipeline {
    kind: ModelKind,
    scaler: Option<StandardScaler>,
    regressor: Regressor,
    target: TargetTransform,
}

impl PricePipeline {
    /// Fit on training rows. `prices` are in currency units; the configured
    /// target transform is applied here.
    pub fn fit(features: &Array2<f64>, prices: &Array1<f64>, config: &ModelConfig) -> crate::Result<Self> {
        if features.nrows() != prices.len() {
            anyhow::bail!(
                "feature rows ({}) and targets ({}) differ",
                features.nrows(),
                prices.len()
            );
        }
        if features.ncols() != FEATURE_NAMES.len() {
            anyhow::bail!("expected {} feature columns, got {}", FEATURE_NAMES.len(), features.ncols());
        }
        if features.nrows() < 2 {
            anyhow::bail!("need at least 2 training rows, got {}", features.nrows());
        }

        let targets = config.target.forward_all(prices);
        if targets.iter().any(|t| !t.is_finite()) {
            anyhow::bail!("target transform produced non-finite values; prices must be > -1");
        }

        let scaler = match config.kind {
            ModelKind::Linear => None,
            ModelKind::ScaledLinear | ModelKind::Ensemble => Some(StandardScaler::fit(features)?),
        };
        let inputs = match &scaler {
            Some(scaler) => scaler.transform(features)?,
            None => features.clone(),
        };

        let regressor = match config.kind {
            ModelKind::Linear | ModelKind::ScaledLinear => {
                Regressor::Single(Estimator::Linear(LinearTerm::fit(&inputs, &targets)?))
            }
            ModelKind::Ensemble => {
                let [w_linear, w_forest, w_extra] = config.weights;
                let linear = LinearTerm::fit(&inputs, &targets)?;
                let forest = Forest::fit(inputs.view(), targets.view(), &config.random_forest, SplitStrategy::Best)?;
                let extra = Forest::fit(inputs.view(), targets.view(), &config.extra_trees, SplitStrategy::Random)?;
                Regressor::Vote(vec![
                    WeightedMember {
                        weight: w_linear,
                        estimator: Estimator::Linear(linear),
                    },
                    WeightedMember {
                        weight: w_forest,
                        estimator: Estimator::RandomForest(forest),
                    },
                    WeightedMember {
                        weight: w_extra,
                        estimator: Estimator::ExtraTrees(extra),
                    },
                ])
            }
        };

        tracing::debug!(kind = ?config.kind, rows = features.nrows(), "pipeline fitted");

        Ok(Self {
            kind: config.kind,
            scaler,
            regressor,
            target: config.target,
        })
    }

    /// Predictions in model space (log space for a log target)
    pub fn predict_target(&self, features: &Array2<f64>) -> crate::Result<Array1<f64>> {
        if features.ncols() != FEATURE_NAMES.len() {
            anyhow::bail!("expected {} feature columns, got {}", FEATURE_NAMES.len(), features.ncols());
        }
        let predictions = match &self.scaler {
            Some(scaler) => self.regressor.predict(&scaler.transform(features)?),
            None => self.regressor.predict(features),
        };
        Ok(predictions)
    }

    /// Predictions in currency units
    pub fn predict(&self, features: &Array2<f64>) -> crate::Result<Array1<f64>> {
        Ok(self.target.inverse_all(&self.predict_target(features)?))
    }

    pub fn predict_one(&self, features: &FeatureVector) -> crate::Result<f64> {
        let prediction = self.predict(&features.to_matrix())?;
        Ok(prediction[0])
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn target(&self) -> TargetTransform {
        self.target
    }

    pub fn regressor(&self) -> &Regressor {
        &self.regressor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForestParams;
    use approx::assert_relative_eq;

    /// price = 3000*area + 150000*bhk + 90000*bath + 400000*loc + 500000, no noise
    fn linear_data() -> (Array2<f64>, Array1<f64>) {
        let rows: Vec<[f64; 4]> = (0..30)
            .map(|i| {
                let area = 600.0 + 57.0 * i as f64 + 13.0 * ((i * i) % 7) as f64;
                let bhk = (1 + i % 4) as f64;
                let bath = (1 + (i / 2) % 3) as f64;
                let loc = ((i / 3) % 4) as f64;
                [area, bhk, bath, loc]
            })
            .collect();
        let x = Array2::from_shape_fn((rows.len(), 4), |(i, j)| rows[i][j]);
        let y = x
            .rows()
            .into_iter()
            .map(|r| 3000.0 * r[0] + 150_000.0 * r[1] + 90_000.0 * r[2] + 400_000.0 * r[3] + 500_000.0)
            .collect();
        (x, y)
    }

    fn quick_config(kind: ModelKind, target: TargetTransform) -> ModelConfig {
        let small = ForestParams {
            n_estimators: 10,
            max_depth: Some(6),
            ..ForestParams::random_forest()
        };
        ModelConfig {
            kind,
            target,
            weights: [1.0, 2.0, 3.0],
            random_forest: small.clone(),
            extra_trees: ForestParams {
                bootstrap: false,
                ..small
            },
        }
    }

    #[test]
    fn test_linear_recovers_coefficients() {
        let (x, y) = linear_data();
        let pipeline = PricePipeline::fit(&x, &y, &quick_config(ModelKind::Linear, TargetTransform::Identity)).unwrap();
        let Regressor::Single(Estimator::Linear(term)) = pipeline.regressor() else {
            panic!("linear pipeline should hold a single linear term");
        };
        assert_relative_eq!(term.coefficients()[0], 3000.0, max_relative = 1e-6);
        assert_relative_eq!(term.intercept(), 500_000.0, max_relative = 1e-6);
    }

    #[test]
    fn test_scaled_linear_matches_unscaled_predictions() {
        let (x, y) = linear_data();
        let plain = PricePipeline::fit(&x, &y, &quick_config(ModelKind::Linear, TargetTransform::Identity)).unwrap();
        let scaled =
            PricePipeline::fit(&x, &y, &quick_config(ModelKind::ScaledLinear, TargetTransform::Identity)).unwrap();
        let a = plain.predict(&x).unwrap();
        let b = scaled.predict(&x).unwrap();
        for (p, q) in a.iter().zip(b.iter()) {
            assert_relative_eq!(*p, *q, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_ensemble_has_fixed_members() {
        let (x, y) = linear_data();
        let pipeline = PricePipeline::fit(&x, &y, &quick_config(ModelKind::Ensemble, TargetTransform::Log1p)).unwrap();
        let Regressor::Vote(members) = pipeline.regressor() else {
            panic!("ensemble pipeline should vote");
        };
        let names: Vec<&str> = members.iter().map(|m| m.estimator.name()).collect();
        assert_eq!(names, vec!["linear", "random_forest", "extra_trees"]);
        let weights: Vec<f64> = members.iter().map(|m| m.weight).collect();
        assert_eq!(weights, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_log_target_predicts_in_currency() {
        let (x, y) = linear_data();
        let pipeline = PricePipeline::fit(&x, &y, &quick_config(ModelKind::Ensemble, TargetTransform::Log1p)).unwrap();
        let in_log = pipeline.predict_target(&x).unwrap();
        let in_currency = pipeline.predict(&x).unwrap();
        assert!(in_log.iter().all(|v| *v < 20.0));
        for (log_value, price) in in_log.iter().zip(in_currency.iter()) {
            assert_relative_eq!(log_value.exp_m1(), *price, max_relative = 1e-12);
        }
        let one = FeatureVector {
            area: 1200.0,
            bhk: 2.0,
            bathroom: 2.0,
            location_code: 1,
        };
        let price = pipeline.predict_one(&one).unwrap();
        assert!(price.is_finite() && price > 0.0);
    }

    #[test]
    fn test_rejects_wrong_width() {
        let (x, y) = linear_data();
        let pipeline = PricePipeline::fit(&x, &y, &quick_config(ModelKind::Linear, TargetTransform::Identity)).unwrap();
        assert!(pipeline.predict(&Array2::zeros((1, 3))).is_err());
        assert!(PricePipeline::fit(&Array2::zeros((3, 2)), &Array1::zeros(3), &ModelConfig::default()).is_err());
    }
}
