//! Emitted species and the pollutant concentrations they cause.
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// An emitted species
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
pub enum Emission {
    /// Primary fine particulate matter
    PM25,
    /// Ammonia
    NH3,
    /// Oxides of nitrogen
    NOx,
    /// Oxides of sulfur
    SOx,
    /// Volatile organic compounds
    VOC,
}

/// A pollutant concentration: fine particulate matter or one of its components
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
pub enum Pollutant {
    /// Particulate ammonium
    PNH4,
    /// Particulate nitrate
    PNO3,
    /// Particulate sulfate
    PSO4,
    /// Secondary organic aerosol
    SOA,
    /// Primary fine particulate matter
    PrimaryPM25,
    /// The sum of all the other components
    TotalPM25,
}

impl Pollutant {
    /// The name health impact surrogates use for this pollutant
    pub fn health_key(self) -> &'static str {
        match self {
            Self::PNH4 => "pNH4",
            Self::PNO3 => "pNO3",
            Self::PSO4 => "pSO4",
            Self::SOA => "SOA",
            Self::PrimaryPM25 => "PrimaryPM25",
            Self::TotalPM25 => "TotalPM2_5",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case(Pollutant::PNH4, "pNH4")]
    #[case(Pollutant::TotalPM25, "TotalPM2_5")]
    fn test_health_key(#[case] pollutant: Pollutant, #[case] expected: &str) {
        assert_eq!(pollutant.health_key(), expected);
    }

    #[test]
    fn test_parse_round_trip() {
        for emission in Emission::iter() {
            assert_eq!(emission.to_string().parse::<Emission>().unwrap(), emission);
        }
        assert_eq!("TotalPM25".parse::<Pollutant>().unwrap(), Pollutant::TotalPM25);
    }
}
