//! Column-wise standardisation of the feature matrix

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Fitted mean/scale per feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fit on the training rows only.
    ///
    /// Uses the population standard deviation; constant columns get a
    /// scale of 1 so they map to zero instead of NaN.
    pub fn fit(features: &Array2<f64>) -> crate::Result<Self> {
        if features.nrows() == 0 {
            anyhow::bail!("cannot fit a scaler on zero rows");
        }
        let mean = features
            .mean_axis(Axis(0))
            .ok_or_else(|| anyhow::anyhow!("cannot compute column means"))?;
        let scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, features: &Array2<f64>) -> crate::Result<Array2<f64>> {
        if features.ncols() != self.mean.len() {
            anyhow::bail!(
                "scaler was fitted on {} features, got {}",
                self.mean.len(),
                features.ncols()
            );
        }
        Ok((features - &self.mean) / &self.scale)
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_standardises_columns() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let scaled = scaler.transform(&x).unwrap();

        for column in scaled.columns() {
            assert_abs_diff_eq!(column.mean().unwrap(), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(column.std(0.0), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_constant_column() {
        let x = array![[5.0, 1.0], [5.0, 2.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        assert_eq!(scaler.scale()[0], 1.0);
        let scaled = scaler.transform(&x).unwrap();
        assert!(scaled.column(0).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_uses_training_statistics() {
        let train = array![[0.0], [2.0]];
        let test = array![[4.0]];
        let scaler = StandardScaler::fit(&train).unwrap();
        // mean 1, std 1 from the training rows only
        assert_abs_diff_eq!(scaler.transform(&test).unwrap()[[0, 0]], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = StandardScaler::fit(&array![[1.0, 2.0]]).unwrap();
        assert!(scaler.transform(&array![[1.0]]).is_err());
    }
}
