//! Inference: turn one form submission into a formatted price estimate

use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

use crate::artifact::{load_artifacts, ArtifactPaths};
use crate::encoder::{EncoderError, LocationEncoder};
use crate::model::{FeatureVector, PricePipeline};

/// Accepted range for BHK and bathroom counts
pub const ROOM_RANGE: std::ops::RangeInclusive<u32> = 1..=5;

/// Half-width of the expected range around a point estimate
pub const RANGE_SPREAD: f64 = 0.10;

pub const LAKH: f64 = 100_000.0;
pub const CRORE: f64 = 10_000_000.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictError {
    #[error("unknown location '{0}'; pick one of the locations the model was trained on")]
    UnknownLocation(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("model files not found or corrupted: {0}")]
    Unavailable(String),
    #[error("the model produced a non-finite estimate")]
    NonFinite,
}

/// One form submission
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuery {
    pub location: String,
    /// Built-up area in square feet
    pub area: f64,
    pub bhk: u32,
    pub bathroom: u32,
}

impl PriceQuery {
    pub fn new<S: Into<String>>(location: S, area: f64, bhk: u32, bathroom: u32) -> Self {
        Self {
            location: location.into(),
            area,
            bhk,
            bathroom,
        }
    }

    pub fn validate(&self) -> Result<(), PredictError> {
        if !self.area.is_finite() || self.area <= 0.0 {
            return Err(PredictError::InvalidInput(format!(
                "area must be a positive number of square feet, got {}",
                self.area
            )));
        }
        if !ROOM_RANGE.contains(&self.bhk) {
            return Err(PredictError::InvalidInput(format!(
                "BHK must be between {} and {}, got {}",
                ROOM_RANGE.start(),
                ROOM_RANGE.end(),
                self.bhk
            )));
        }
        if !ROOM_RANGE.contains(&self.bathroom) {
            return Err(PredictError::InvalidInput(format!(
                "bathrooms must be between {} and {}, got {}",
                ROOM_RANGE.start(),
                ROOM_RANGE.end(),
                self.bathroom
            )));
        }
        Ok(())
    }
}

/// Coarse price band shown next to an estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PriceTier {
    /// Below ₹40 lakh
    Budget,
    /// Below ₹1 crore
    MidRange,
    /// Below ₹2.5 crore
    Premium,
    Luxury,
}

impl PriceTier {
    pub fn from_price(price: f64) -> Self {
        if price < 40.0 * LAKH {
            PriceTier::Budget
        } else if price < CRORE {
            PriceTier::MidRange
        } else if price < 2.5 * CRORE {
            PriceTier::Premium
        } else {
            PriceTier::Luxury
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PriceTier::Budget => "Budget",
            PriceTier::MidRange => "Mid-range",
            PriceTier::Premium => "Premium",
            PriceTier::Luxury => "Luxury",
        }
    }
}

impl fmt::Display for PriceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rupee amount with two decimals and comma-separated thousands,
/// e.g. `₹ 1,234,567.89`
pub fn format_currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    format!("{}₹ {}.{}", sign, grouped, cents)
}

/// Point estimate with its derived commentary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub price: f64,
    pub low: f64,
    pub high: f64,
    pub tier: PriceTier,
}

impl Estimate {
    pub fn from_price(price: f64) -> Self {
        Self {
            price,
            low: price * (1.0 - RANGE_SPREAD),
            high: price * (1.0 + RANGE_SPREAD),
            tier: PriceTier::from_price(price),
        }
    }
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Estimated price: {}", format_currency(self.price))?;
        writeln!(f, "Price tier:      {}", self.tier)?;
        write!(
            f,
            "Expected range:  {} to {}",
            format_currency(self.low),
            format_currency(self.high)
        )
    }
}

/// A loaded pipeline and the encoder it was trained with
#[derive(Debug, Clone)]
pub struct Predictor {
    pipeline: PricePipeline,
    encoder: LocationEncoder,
}

impl Predictor {
    pub fn new(pipeline: PricePipeline, encoder: LocationEncoder) -> Self {
        Self { pipeline, encoder }
    }

    pub fn load(paths: &ArtifactPaths) -> Result<Self, PredictError> {
        let (pipeline, encoder) = load_artifacts(paths).map_err(|e| PredictError::Unavailable(e.to_string()))?;
        Ok(Self::new(pipeline, encoder))
    }

    /// Locations a query may use, sorted
    pub fn locations(&self) -> &[String] {
        self.encoder.classes()
    }

    pub fn pipeline(&self) -> &PricePipeline {
        &self.pipeline
    }

    pub fn estimate(&self, query: &PriceQuery) -> Result<Estimate, PredictError> {
        query.validate()?;

        let location_code = self.encoder.transform(&query.location).map_err(|e| match e {
            EncoderError::UnknownCategory(location) => PredictError::UnknownLocation(location),
            other => PredictError::InvalidInput(other.to_string()),
        })?;
        let features = FeatureVector {
            area: query.area,
            bhk: f64::from(query.bhk),
            bathroom: f64::from(query.bathroom),
            location_code,
        };

        let price = self
            .pipeline
            .predict_one(&features)
            .map_err(|e| PredictError::Unavailable(e.to_string()))?;
        if !price.is_finite() {
            return Err(PredictError::NonFinite);
        }

        tracing::debug!(location = %query.location, area = query.area, price, "estimate computed");
        Ok(Estimate::from_price(price))
    }
}

/// What a [`SharedPredictor`] currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState<'a> {
    NotLoaded,
    Ready,
    Failed(&'a str),
}

/// Read-only predictor loaded on first use.
///
/// Loading runs at most once; a failed load is remembered and every later
/// call reports it as [`PredictError::Unavailable`].
#[derive(Debug)]
pub struct SharedPredictor {
    paths: ArtifactPaths,
    cell: OnceLock<Result<Predictor, String>>,
}

static GLOBAL: OnceLock<SharedPredictor> = OnceLock::new();

impl SharedPredictor {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self {
            paths,
            cell: OnceLock::new(),
        }
    }

    /// Process-wide instance reading the default artifact directory
    pub fn global() -> &'static SharedPredictor {
        GLOBAL.get_or_init(|| SharedPredictor::new(ArtifactPaths::default()))
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Current state without triggering a load
    pub fn state(&self) -> LoadState<'_> {
        match self.cell.get() {
            None => LoadState::NotLoaded,
            Some(Ok(_)) => LoadState::Ready,
            Some(Err(reason)) => LoadState::Failed(reason),
        }
    }

    /// Load on first call, then hand out the same predictor
    pub fn get(&self) -> Result<&Predictor, PredictError> {
        let loaded = self.cell.get_or_init(|| {
            let result = Predictor::load(&self.paths).map_err(|e| match e {
                PredictError::Unavailable(reason) => reason,
                other => other.to_string(),
            });
            match &result {
                Ok(p) => tracing::info!(
                    dir = %self.paths.dir().display(),
                    locations = p.locations().len(),
                    "predictor ready"
                ),
                Err(reason) => tracing::error!(dir = %self.paths.dir().display(), %reason, "predictor unavailable"),
            }
            result
        });
        loaded.as_ref().map_err(|reason| PredictError::Unavailable(reason.clone()))
    }

    pub fn locations(&self) -> Result<&[String], PredictError> {
        Ok(self.get()?.locations())
    }

    pub fn estimate(&self, query: &PriceQuery) -> Result<Estimate, PredictError> {
        self.get()?.estimate(query)
    }
}
