//! Optional log transform of the price target

use clap::ValueEnum;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Transform applied to the price before fitting.
///
/// Prices are right-skewed, so fitting on `ln(1 + price)` stabilises the
/// variance. Anything compared against a currency amount must go through
/// [`TargetTransform::inverse`] first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum TargetTransform {
    /// Fit on the raw price
    Identity,
    /// Fit on `ln(1 + price)`
    #[default]
    #[value(name = "log")]
    Log1p,
}

impl TargetTransform {
    pub fn forward(self, price: f64) -> f64 {
        match self {
            TargetTransform::Identity => price,
            TargetTransform::Log1p => price.ln_1p(),
        }
    }

    pub fn inverse(self, value: f64) -> f64 {
        match self {
            TargetTransform::Identity => value,
            TargetTransform::Log1p => value.exp_m1(),
        }
    }

    pub fn forward_all(self, prices: &Array1<f64>) -> Array1<f64> {
        prices.mapv(|p| self.forward(p))
    }

    pub fn inverse_all(self, values: &Array1<f64>) -> Array1<f64> {
        values.mapv(|v| self.inverse(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_log_round_trip() {
        for &price in &[0.5, 1.0, 1_250.0, 4_500_000.0, 92_000_000.0] {
            let t = TargetTransform::Log1p;
            assert_relative_eq!(t.inverse(t.forward(price)), price, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_identity_is_noop() {
        let prices = Array1::from(vec![1.0, 2.0, 3.0]);
        assert_eq!(TargetTransform::Identity.forward_all(&prices), prices);
        assert_eq!(TargetTransform::Identity.inverse_all(&prices), prices);
    }

    #[test]
    fn test_log_compresses_scale() {
        let t = TargetTransform::Log1p;
        assert_relative_eq!(t.forward(0.0), 0.0);
        assert!(t.forward(10_000_000.0) < 20.0);
    }
}
