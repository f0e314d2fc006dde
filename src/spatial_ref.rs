//! Linking economic industries to emission source classification codes (SCCs).
//!
//! Emissions inventories are organised by SCC rather than by economic sector. Each industry is
//! mapped to the SCCs its emissions fall under. Where several industries share an SCC, emissions
//! from that SCC are split between them in proportion to their domestic production.
use crate::eio::Eio;
use crate::error::EioError;
use crate::id::define_id_type;
use crate::input::layout::SccMapLayout;
use crate::table::TableLoader;
use crate::year::Year;
use anyhow::{Context, Result, ensure};
use log::{info, warn};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use strum::Display;

define_id_type! {Scc}

/// The length of a normalised SCC
const SCC_LENGTH: usize = 10;

/// The kind of emissions source a [`SpatialRef`] describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum SourceType {
    /// Point and area sources which don't move
    Stationary,
}

/// Where one industry's emissions occur, expressed as shares of emissions inventory SCCs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialRef {
    /// The SCCs the industry emits under
    pub sccs: Vec<Scc>,
    /// The share of each SCC's emissions attributed to the industry, parallel to `sccs`
    pub scc_fractions: Vec<f64>,
    /// The year of emissions to use
    pub emis_year: Year,
    /// The kind of emissions source
    pub source_type: SourceType,
    /// Whether the surrogate provider should skip normalising the spatial surrogate
    pub no_normalization: bool,
}

/// Convert an SCC to its 10-digit form.
///
/// Codes with 9 digits have lost a trailing zero and codes with 8 digits have lost two leading
/// zeros.
pub fn normalize_scc(code: &str) -> Result<Scc, EioError> {
    let normalized = match code.len() {
        9 => format!("{code}0"),
        8 => format!("00{code}"),
        _ => code.to_string(),
    };
    if normalized.len() != SCC_LENGTH {
        return Err(EioError::Parse {
            value: code.to_string(),
            reason: format!("SCC codes must have 8, 9 or {SCC_LENGTH} digits"),
        });
    }
    Ok(normalized.into())
}

/// Share out each SCC between the industries which use it, in proportion to their production.
///
/// `sccs` holds the SCCs of each industry and `production` the production of each industry. The
/// result holds, for each industry, the fraction of each of its SCCs attributed to it. SCCs and
/// industries are visited in sorted order so the floating-point results are reproducible.
///
/// If none of the industries using an SCC have any production, the SCC is split equally between
/// them.
pub fn allocate_sccs(sccs: &[Vec<Scc>], production: &Array1<f64>) -> Vec<Vec<f64>> {
    let mut weights: BTreeMap<&Scc, BTreeMap<usize, f64>> = BTreeMap::new();
    for (industry, industry_sccs) in sccs.iter().enumerate() {
        for scc in industry_sccs {
            weights
                .entry(scc)
                .or_default()
                .insert(industry, production[industry]);
        }
    }

    for (scc, industries) in &mut weights {
        let total: f64 = industries.values().sum();
        if total == 0.0 {
            warn!("No production in any industry using SCC {scc}; splitting it equally");
            let share = 1.0 / industries.len() as f64;
            industries.values_mut().for_each(|w| *w = share);
        } else {
            industries.values_mut().for_each(|w| *w /= total);
        }
    }

    sccs.iter()
        .enumerate()
        .map(|(industry, industry_sccs)| {
            industry_sccs
                .iter()
                .map(|scc| weights[scc][&industry])
                .collect()
        })
        .collect()
}

/// Read the SCCs for each industry from an SCC map workbook.
///
/// The industry in each row must match the model's industry in the same position.
pub fn read_scc_map(
    loader: &TableLoader,
    file: &Path,
    layout: &SccMapLayout,
    eio: &Eio,
) -> Result<Vec<Vec<Scc>>> {
    let workbook = loader.workbook(file)?;
    let sheet = workbook
        .sheet(&layout.sheet)
        .with_context(|| format!("Reading SCC map from {}", file.display()))?;
    let rows = layout.header_rows..sheet.height();

    let industries: Vec<String> = rows
        .clone()
        .map(|row| sheet.cell(row, layout.industry_col).to_string())
        .collect();
    eio.industries()
        .check_matches(&industries)
        .with_context(|| format!("Reading SCC map from {}", file.display()))?;

    rows.map(|row| {
        sheet
            .row(row)
            .iter()
            .skip(layout.first_scc_col)
            .filter(|code| !code.is_empty())
            .map(|code| {
                normalize_scc(code)
                    .with_context(|| format!("Reading row {row} of {}", file.display()))
            })
            .collect()
    })
    .collect()
}

/// Build a spatial reference for each industry, in industry order, from an SCC map workbook.
///
/// Shared SCCs are allocated according to domestic production in `year`.
pub fn nei_spatial_refs(
    loader: &TableLoader,
    file: &Path,
    layout: &SccMapLayout,
    year: Year,
    eio: &Eio,
) -> Result<Vec<SpatialRef>> {
    let sccs = read_scc_map(loader, file, layout, eio)?;
    let production = eio.domestic_production(year)?;
    ensure!(
        production.len() == sccs.len(),
        EioError::DataIntegrity(format!(
            "{} industries have production but {} have SCCs",
            production.len(),
            sccs.len()
        ))
    );
    let fractions = allocate_sccs(&sccs, &production);
    info!(
        "Built spatial references for {} industries for {year}",
        sccs.len()
    );

    Ok(sccs
        .into_iter()
        .zip(fractions)
        .map(|(sccs, scc_fractions)| SpatialRef {
            sccs,
            scc_fractions,
            emis_year: year,
            source_type: SourceType::Stationary,
            no_normalization: true,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use ndarray::array;
    use rstest::rstest;

    fn sccs(codes: &[&[&str]]) -> Vec<Vec<Scc>> {
        codes
            .iter()
            .map(|row| row.iter().map(|&c| c.into()).collect())
            .collect()
    }

    #[rstest]
    #[case("2801000003", "2801000003")]
    #[case("280170009", "2801700090")]
    #[case("30202601", "0030202601")]
    fn test_normalize_scc(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(normalize_scc(code).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("2801")]
    #[case("28010000031")]
    fn test_normalize_scc_invalid(#[case] code: &str) {
        assert!(matches!(normalize_scc(code), Err(EioError::Parse { .. })));
    }

    #[test]
    fn test_allocate_sccs() {
        let sccs = sccs(&[&["a", "b"], &["a"], &["b", "c"], &[]]);
        let fractions = allocate_sccs(&sccs, &array![1.0, 3.0, 2.0, 5.0]);
        assert_eq!(fractions.len(), 4);
        assert_approx_eq!(f64, fractions[0][0], 0.25);
        assert_approx_eq!(f64, fractions[0][1], 1.0 / 3.0);
        assert_approx_eq!(f64, fractions[1][0], 0.75);
        assert_approx_eq!(f64, fractions[2][0], 2.0 / 3.0);
        assert_eq!(fractions[2][1], 1.0);
        assert!(fractions[3].is_empty());
    }

    #[test]
    fn test_allocate_sccs_no_production() {
        let sccs = sccs(&[&["a"], &["a"]]);
        let fractions = allocate_sccs(&sccs, &array![0.0, 0.0]);
        assert_eq!(fractions, [[0.5], [0.5]]);
    }

    #[test]
    fn test_allocate_sccs_reproducible() {
        let sccs = sccs(&[&["a", "b"], &["b", "a"], &["a"]]);
        let production = array![0.1, 0.2, 0.3];
        let first = allocate_sccs(&sccs, &production);
        for _ in 0..10 {
            assert_eq!(allocate_sccs(&sccs, &production), first);
        }
    }
}
