//! Code for working with years.
use anyhow::{Context, Result};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A year for which economic data is available.
///
/// Sheets within the requirements and demand workbooks are named after the year they describe.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    From,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Year(pub u32);

impl Year {
    /// The name of the workbook sheet holding data for this year
    pub fn sheet_name(self) -> String {
        self.0.to_string()
    }
}

impl FromStr for Year {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let year = s
            .trim()
            .parse()
            .with_context(|| format!("Invalid year: {s}"))?;
        Ok(Self(year))
    }
}
