//! Leontief requirements matrices for each year.
//!
//! Detail-level requirements tables only exist for one year. Matrices for other years are made by
//! scaling the detail-year matrix by how much the corresponding summary-level entries changed
//! between the detail year and the year of interest.
use crate::crosswalk::{build_crosswalk, expand_matrix};
use crate::input::layout::{Layout, RequirementsLayout};
use crate::table::TableLoader;
use crate::year::Year;
use anyhow::{Context, Result};
use log::debug;
use ndarray::{Array2, Zip};
use std::path::Path;

/// The pair of workbooks holding one kind of requirements table
#[derive(Debug, Clone, Copy)]
pub struct RequirementsFiles<'a> {
    /// The detail-level workbook
    pub detail: &'a Path,
    /// The summary-level workbook, which also holds the sector code crosswalk
    pub summary: &'a Path,
}

/// Sector codes and descriptions read from a requirements table
#[derive(Debug, Clone, PartialEq)]
pub struct SectorLabels {
    /// Sector codes
    pub codes: Vec<String>,
    /// Human-readable sector descriptions
    pub descriptions: Vec<String>,
}

/// Read the requirements matrix for `year` from a workbook
pub fn requirements_table(
    loader: &TableLoader,
    file: &Path,
    year: Year,
    layout: &RequirementsLayout,
) -> Result<Array2<f64>> {
    loader.matrix(file, &year.sheet_name(), layout.rows, layout.cols)
}

/// Read the industry labels (one per row) of a requirements table
pub fn industries(
    loader: &TableLoader,
    file: &Path,
    sheet: &str,
    layout: &RequirementsLayout,
) -> Result<SectorLabels> {
    Ok(SectorLabels {
        codes: loader.text_column(file, sheet, layout.industry_code_col, layout.rows)?,
        descriptions: loader.text_column(file, sheet, layout.industry_description_col, layout.rows)?,
    })
}

/// Read the commodity labels (one per column) of a requirements table
pub fn commodities(
    loader: &TableLoader,
    file: &Path,
    sheet: &str,
    layout: &RequirementsLayout,
) -> Result<SectorLabels> {
    Ok(SectorLabels {
        codes: loader.text_row(file, sheet, layout.commodity_code_row, layout.cols)?,
        descriptions: loader.text_row(file, sheet, layout.commodity_description_row, layout.cols)?,
    })
}

/// Element-wise ratio of `numerator` to `denominator`.
///
/// Where the denominator is exactly zero the ratio is zero. This treats a sector with no activity
/// in the base year as having no activity in any other year. It is a modelling assumption: real
/// activity which only appears after the base year is dropped.
pub fn ratio(numerator: &Array2<f64>, denominator: &Array2<f64>) -> Array2<f64> {
    Zip::from(numerator)
        .and(denominator)
        .map_collect(|&n, &d| if d == 0.0 { 0.0 } else { n / d })
}

/// The detail-level requirements matrix for `year`.
///
/// For the detail year this is the table as read. For other years, each entry of the detail-year
/// table is multiplied by the ratio of the summary-level entry for `year` to the summary-level
/// entry for the detail year.
pub fn adjusted_requirements(
    loader: &TableLoader,
    files: RequirementsFiles<'_>,
    layout: &Layout,
    year: Year,
    detail_year: Year,
) -> Result<Array2<f64>> {
    let detail = requirements_table(loader, files.detail, detail_year, &layout.detail_requirements)
        .with_context(|| format!("Reading detail requirements from {}", files.detail.display()))?;
    if year == detail_year {
        return Ok(detail);
    }

    let summary_layout = &layout.summary_requirements;
    let read_summary = |y: Year| {
        requirements_table(loader, files.summary, y, summary_layout).with_context(|| {
            format!(
                "Reading {y} summary requirements from {}",
                files.summary.display()
            )
        })
    };
    let summary_ratio = ratio(&read_summary(year)?, &read_summary(detail_year)?);

    let base_sheet = detail_year.sheet_name();
    let summary_industries = industries(loader, files.summary, &base_sheet, summary_layout)?;
    let summary_commodities = commodities(loader, files.summary, &base_sheet, summary_layout)?;
    let detail_layout = &layout.detail_requirements;
    let detail_industries = industries(loader, files.detail, &base_sheet, detail_layout)?;
    let detail_commodities = commodities(loader, files.detail, &base_sheet, detail_layout)?;
    let crosswalk = build_crosswalk(loader, files.summary, &layout.crosswalk)?;

    debug!(
        "Adjusting {} from {detail_year} to {year}",
        files.detail.display()
    );
    let expanded = expand_matrix(
        &summary_ratio,
        &summary_industries.codes,
        &summary_commodities.codes,
        &detail_industries.codes,
        &detail_commodities.codes,
        &crosswalk,
    );

    Ok(detail * expanded)
}

/// Import requirements: the part of total requirements not met domestically
pub fn import_requirements(total: &Array2<f64>, domestic: &Array2<f64>) -> Array2<f64> {
    total - domestic
}
