//! Dataset loading and cleaning using Polars

use polars::prelude::*;
use std::path::Path;

use crate::config::OutlierPolicy;

pub const AREA: &str = "Area";
pub const BHK: &str = "BHK";
pub const BATHROOM: &str = "Bathroom";
pub const LOCATION: &str = "Location";
pub const PRICE: &str = "Price";

/// Columns the dataset must provide, in any order
pub const REQUIRED_COLUMNS: [&str; 5] = [AREA, BHK, BATHROOM, LOCATION, PRICE];

/// Cleaned dataset as typed columns; every row is complete
#[derive(Debug, Clone, PartialEq)]
pub struct HouseData {
    pub area: Vec<f64>,
    pub bhk: Vec<f64>,
    pub bathroom: Vec<f64>,
    pub location: Vec<String>,
    pub price: Vec<f64>,
}

impl HouseData {
    pub fn len(&self) -> usize {
        self.price.len()
    }

    pub fn is_empty(&self) -> bool {
        self.price.is_empty()
    }

    fn from_frame(df: &DataFrame) -> crate::Result<Self> {
        let numeric = |name: &str| -> crate::Result<Vec<f64>> {
            Ok(df.column(name)?.f64()?.into_no_null_iter().collect())
        };

        Ok(Self {
            area: numeric(AREA)?,
            bhk: numeric(BHK)?,
            bathroom: numeric(BATHROOM)?,
            location: df
                .column(LOCATION)?
                .utf8()?
                .into_no_null_iter()
                .map(str::to_owned)
                .collect(),
            price: numeric(PRICE)?,
        })
    }
}

/// Price interval a row must fall in to survive outlier removal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceFence {
    pub lower: f64,
    pub upper: f64,
    /// Whether a price equal to `upper` is kept
    pub upper_inclusive: bool,
}

impl PriceFence {
    pub fn contains(&self, price: f64) -> bool {
        let below_upper = if self.upper_inclusive {
            price <= self.upper
        } else {
            price < self.upper
        };
        price >= self.lower && below_upper
    }
}

/// Row counts after each cleaning step
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningReport {
    pub raw_rows: usize,
    pub after_missing: usize,
    pub after_duplicates: usize,
    pub after_outliers: usize,
    pub fence: Option<PriceFence>,
}

/// Quantile with linear interpolation between order statistics.
///
/// `sorted` must be ascending and non-empty.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    let fraction = position - below as f64;
    sorted[below] + (sorted[above] - sorted[below]) * fraction
}

/// Compute the fence for the given policy, or `None` when filtering is off
pub fn price_fence(prices: &[f64], policy: &OutlierPolicy) -> Option<PriceFence> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_by(f64::total_cmp);

    match *policy {
        OutlierPolicy::Iqr { factor } => {
            let q1 = quantile(&sorted, 0.25);
            let q3 = quantile(&sorted, 0.75);
            let iqr = q3 - q1;
            Some(PriceFence {
                lower: q1 - factor * iqr,
                upper: q3 + factor * iqr,
                upper_inclusive: true,
            })
        }
        OutlierPolicy::UpperQuantile { quantile: q } => Some(PriceFence {
            lower: f64::NEG_INFINITY,
            upper: quantile(&sorted, q),
            upper_inclusive: false,
        }),
        OutlierPolicy::Disabled => None,
    }
}

/// Load the CSV and keep the required columns with numeric columns cast to
/// `f64`. Missing columns or unparsable numbers are fatal.
pub fn load_csv<P: AsRef<Path>>(path: P) -> crate::Result<DataFrame> {
    let path = path.as_ref();
    let raw = CsvReader::from_path(path)
        .map_err(|e| anyhow::anyhow!("cannot open dataset {}: {}", path.display(), e))?
        .has_header(true)
        .finish()
        .map_err(|e| anyhow::anyhow!("cannot parse dataset {}: {}", path.display(), e))?;

    let present = raw.get_column_names();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !present.contains(c))
        .collect();
    if !missing.is_empty() {
        anyhow::bail!(
            "dataset {} is missing required column(s): {}",
            path.display(),
            missing.join(", ")
        );
    }

    let mut columns = Vec::with_capacity(REQUIRED_COLUMNS.len());
    for name in REQUIRED_COLUMNS {
        let column = raw.column(name)?;
        let dtype = if name == LOCATION {
            DataType::Utf8
        } else {
            DataType::Float64
        };
        let cast = column
            .strict_cast(&dtype)
            .map_err(|e| anyhow::anyhow!("column {} has values that are not {}: {}", name, dtype, e))?;
        columns.push(cast);
    }

    let df = DataFrame::new(columns)?;
    tracing::info!(rows = df.height(), path = %path.display(), "dataset loaded");
    Ok(df)
}

/// Drop incomplete rows, then exact duplicates (first occurrence kept, order
/// preserved), then price outliers according to `policy`.
pub fn clean(df: DataFrame, policy: &OutlierPolicy) -> crate::Result<(HouseData, CleaningReport)> {
    let raw_rows = df.height();

    let df = df.drop_nulls::<String>(None)?;
    let after_missing = df.height();

    let df = df.unique_stable(None, UniqueKeepStrategy::First, None)?;
    let after_duplicates = df.height();

    let prices: Vec<f64> = df.column(PRICE)?.f64()?.into_no_null_iter().collect();
    let fence = price_fence(&prices, policy);
    let df = match fence {
        Some(fence) => {
            let mask: BooleanChunked = prices.iter().map(|&p| fence.contains(p)).collect();
            df.filter(&mask)?
        }
        None => df,
    };
    let after_outliers = df.height();

    if after_outliers == 0 {
        anyhow::bail!("no rows left after cleaning ({} raw rows)", raw_rows);
    }

    let report = CleaningReport {
        raw_rows,
        after_missing,
        after_duplicates,
        after_outliers,
        fence,
    };
    tracing::info!(
        raw = raw_rows,
        complete = after_missing,
        unique = after_duplicates,
        kept = after_outliers,
        "dataset cleaned"
    );

    Ok((HouseData::from_frame(&df)?, report))
}

/// Load and clean in one step
pub fn load_and_clean<P: AsRef<Path>>(
    path: P,
    policy: &OutlierPolicy,
) -> crate::Result<(HouseData, CleaningReport)> {
    clean(load_csv(path)?, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(quantile(&sorted, 0.0), 1.0);
        assert_relative_eq!(quantile(&sorted, 0.25), 1.75);
        assert_relative_eq!(quantile(&sorted, 0.5), 2.5);
        assert_relative_eq!(quantile(&sorted, 1.0), 4.0);
        assert_relative_eq!(quantile(&[5.0], 0.99), 5.0);
    }

    #[test]
    fn test_iqr_fence_is_inclusive() {
        // q1 = 2, q3 = 4, iqr = 2 -> fence [-1, 7]
        let prices = [1.0, 2.0, 3.0, 4.0, 5.0];
        let fence = price_fence(&prices, &OutlierPolicy::Iqr { factor: 1.5 }).unwrap();
        assert_relative_eq!(fence.lower, -1.0);
        assert_relative_eq!(fence.upper, 7.0);
        assert!(fence.contains(7.0));
        assert!(fence.contains(-1.0));
        assert!(!fence.contains(7.000001));
    }

    #[test]
    fn test_upper_quantile_fence_is_exclusive() {
        let prices = [10.0, 20.0, 30.0, 40.0, 50.0];
        let fence = price_fence(&prices, &OutlierPolicy::UpperQuantile { quantile: 1.0 }).unwrap();
        assert_relative_eq!(fence.upper, 50.0);
        assert!(!fence.contains(50.0));
        assert!(fence.contains(49.9));
        assert!(price_fence(&prices, &OutlierPolicy::Disabled).is_none());
    }

    #[test]
    fn test_load_requires_columns() {
        let file = create_test_csv(&["Area,BHK,Location,Price", "1000,2,Pune,5000000"]);
        let err = load_csv(file.path()).unwrap_err();
        assert!(err.to_string().contains("Bathroom"));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_csv("/definitely/not/here.csv").is_err());
    }

    #[test]
    fn test_column_order_is_irrelevant() {
        let file = create_test_csv(&[
            "Price,Location,Bathroom,BHK,Area,Extra",
            "5000000,Pune,2,2,1000,x",
            "7000000,Mumbai,2,3,1400,y",
        ]);
        let (data, _) = load_and_clean(file.path(), &OutlierPolicy::Disabled).unwrap();
        assert_eq!(data.area, vec![1000.0, 1400.0]);
        assert_eq!(data.location, vec!["Pune".to_string(), "Mumbai".to_string()]);
        assert_eq!(data.price, vec![5_000_000.0, 7_000_000.0]);
    }

    #[test]
    fn test_clean_drops_missing_and_duplicates() {
        let file = create_test_csv(&[
            "Area,BHK,Bathroom,Location,Price",
            "1000,2,2,Pune,5000000",
            "1000,2,2,Pune,5000000",
            ",3,2,Mumbai,9000000",
            "1500,3,3,Mumbai,9500000",
            "800,1,1,Chennai,3000000",
        ]);
        let (data, report) = load_and_clean(file.path(), &OutlierPolicy::Disabled).unwrap();
        assert_eq!(report.raw_rows, 5);
        assert_eq!(report.after_missing, 4);
        assert_eq!(report.after_duplicates, 3);
        assert_eq!(report.after_outliers, 3);
        assert_eq!(data.len(), 3);
        // First occurrence order is preserved
        assert_eq!(data.location, vec!["Pune", "Mumbai", "Chennai"]);
    }

    #[test]
    fn test_clean_removes_price_outlier() {
        let mut lines = vec!["Area,BHK,Bathroom,Location,Price".to_string()];
        for i in 0..9 {
            lines.push(format!("{},2,2,Pune,{}", 900 + i * 10, 5_000_000 + i * 10_000));
        }
        lines.push("5000,5,5,Pune,900000000".to_string());
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let file = create_test_csv(&refs);

        let (data, report) = load_and_clean(file.path(), &OutlierPolicy::default()).unwrap();
        assert_eq!(report.after_duplicates, 10);
        assert_eq!(report.after_outliers, 9);
        assert!(data.price.iter().all(|p| *p < 10_000_000.0));
        assert!(report.fence.is_some());
    }

    #[test]
    fn test_non_numeric_value_is_fatal() {
        let file = create_test_csv(&[
            "Area,BHK,Bathroom,Location,Price",
            "big,2,2,Pune,5000000",
            "1000,2,2,Pune,5000000",
        ]);
        assert!(load_csv(file.path()).is_err());
    }
}
