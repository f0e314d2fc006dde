//! Economic sectors, sector masks and the location of economic activity.
use crate::error::EioError;
use anyhow::{Result, ensure};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumIter, EnumString};

/// Where impacts occur, or where demanded commodities come from
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
pub enum Location {
    /// Impacts that occur locally, or demand for domestic commodities
    Domestic,
    /// Impacts that occur internationally, or demand for imported commodities
    Imported,
    /// Domestic and imported combined
    Total,
}

/// An ordered list of sector names.
///
/// Matrices and vectors are indexed by the position of a sector in its list.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorList {
    kind: &'static str,
    names: Vec<String>,
    indices: HashMap<String, usize>,
}

impl SectorList {
    /// Create a list of sectors. `kind` (e.g. "industry") is used in error messages.
    pub fn new(kind: &'static str, names: Vec<String>) -> Self {
        let indices = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            kind,
            names,
            indices,
        }
    }

    /// The sector names, in order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The number of sectors
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether there are no sectors
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The position of the named sector
    pub fn index(&self, name: &str) -> Result<usize, EioError> {
        self.indices
            .get(name)
            .copied()
            .ok_or_else(|| EioError::not_found(self.kind, name))
    }

    /// A mask selecting only the named sector
    pub fn mask(&self, name: &str) -> Result<Mask, EioError> {
        let index = self.index(name)?;
        Ok(Mask::from_indices(self.len(), [index]))
    }

    /// Check that `names` matches this list exactly, in order
    pub fn check_matches(&self, names: &[String]) -> Result<()> {
        ensure!(
            names.len() == self.len(),
            EioError::DataIntegrity(format!(
                "incorrect number of {} sectors: {} != {}",
                self.kind,
                names.len(),
                self.len()
            ))
        );
        for (have, want) in names.iter().zip(&self.names) {
            ensure!(
                have == want,
                EioError::DataIntegrity(format!(
                    "{} sectors don't match: {have} != {want}",
                    self.kind
                ))
            );
        }
        Ok(())
    }
}

/// A vector of ones and zeros used to select a subset of sectors
#[derive(Debug, Clone, PartialEq)]
pub struct Mask(Array1<f64>);

impl Mask {
    /// A mask of length `len` with ones at `indices`
    pub fn from_indices<I: IntoIterator<Item = usize>>(len: usize, indices: I) -> Self {
        let mut values = Array1::zeros(len);
        for i in indices {
            values[i] = 1.0;
        }
        Self(values)
    }

    /// A mask with ones wherever `selected` is true
    pub fn from_bools<I: IntoIterator<Item = bool>>(selected: I) -> Self {
        Self(
            selected
                .into_iter()
                .map(|s| if s { 1.0 } else { 0.0 })
                .collect(),
        )
    }

    /// Multiply `values` by the mask, element-wise
    pub fn apply(&self, values: &mut Array1<f64>) {
        *values *= &self.0;
    }

    /// The number of sectors the mask covers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the mask covers no sectors
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The mask values
    pub fn values(&self) -> &Array1<f64> {
        &self.0
    }
}
