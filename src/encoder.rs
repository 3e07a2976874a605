//! Location label encoding

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncoderError {
    #[error("unknown location '{0}': it was not present in the training data")]
    UnknownCategory(String),
    #[error("location code {code} is out of range (encoder knows {known} locations)")]
    UnknownCode { code: usize, known: usize },
    #[error("cannot fit a location encoder on an empty column")]
    Empty,
}

/// Bijective mapping between the training locations and `0..K`.
///
/// Codes follow the sorted order of the distinct strings, so refitting on the
/// same data reproduces the same codes. The class list is kept sorted, which
/// lets lookups use binary search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEncoder {
    classes: Vec<String>,
}

impl LocationEncoder {
    /// Build the mapping from every observed location
    pub fn fit<S: AsRef<str>>(locations: &[S]) -> Result<Self, EncoderError> {
        if locations.is_empty() {
            return Err(EncoderError::Empty);
        }
        let classes: BTreeSet<&str> = locations.iter().map(AsRef::as_ref).collect();
        Ok(Self {
            classes: classes.into_iter().map(str::to_owned).collect(),
        })
    }

    /// Fit and encode the same column
    pub fn fit_transform<S: AsRef<str>>(locations: &[S]) -> Result<(Self, Vec<usize>), EncoderError> {
        let encoder = Self::fit(locations)?;
        let codes = encoder.transform_all(locations)?;
        Ok((encoder, codes))
    }

    pub fn transform(&self, location: &str) -> Result<usize, EncoderError> {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(location))
            .map_err(|_| EncoderError::UnknownCategory(location.to_string()))
    }

    pub fn transform_all<S: AsRef<str>>(&self, locations: &[S]) -> Result<Vec<usize>, EncoderError> {
        locations.iter().map(|l| self.transform(l.as_ref())).collect()
    }

    pub fn inverse_transform(&self, code: usize) -> Result<&str, EncoderError> {
        self.classes
            .get(code)
            .map(String::as_str)
            .ok_or(EncoderError::UnknownCode {
                code,
                known: self.classes.len(),
            })
    }

    /// Known locations in code order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
