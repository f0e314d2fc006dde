//! Final demand for commodities, by category of demand.
//!
//! Final demand is read from the use table (total demand) and the import matrix (demand met by
//! imports). As with requirements, detail-level tables only exist for the detail year and other
//! years are found by scaling with summary-level tables.
use crate::crosswalk::{Crosswalk, build_crosswalk, expand_matrix, index_lookup};
use crate::error::EioError;
use crate::input::layout::{DemandLayout, Layout};
use crate::requirements::ratio;
use crate::table::TableLoader;
use crate::year::Year;
use anyhow::{Context, Result};
use log::debug;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Demand in the tables is in millions of dollars
const DEMAND_MULTIPLIER: f64 = 1.0e6;

/// A summary code which maps to [`DUMMY_DETAIL_CODE`] in the crosswalk, used as the single column
/// when expanding a summary-level vector
const DUMMY_SUMMARY_CODE: &str = "211";
const DUMMY_DETAIL_CODE: &str = "211000";

/// A category of final demand
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
pub enum FinalDemand {
    /// Personal consumption expenditures
    PersonalConsumption,
    /// Private investment in structures
    PrivateStructures,
    /// Private investment in equipment
    PrivateEquipment,
    /// Private investment in intellectual property
    PrivateIP,
    /// Private investment in residential structures
    PrivateResidential,
    /// Change in private inventories
    InventoryChange,
    /// Exports of goods and services
    Export,
    /// Federal defense consumption
    DefenseConsumption,
    /// Federal defense investment in structures
    DefenseStructures,
    /// Federal defense investment in equipment
    DefenseEquipment,
    /// Federal defense investment in intellectual property
    DefenseIP,
    /// Federal nondefense consumption
    NondefenseConsumption,
    /// Federal nondefense investment in structures
    NondefenseStructures,
    /// Federal nondefense investment in equipment
    NondefenseEquipment,
    /// Federal nondefense investment in intellectual property
    NondefenseIP,
    /// State and local government consumption
    LocalConsumption,
    /// State and local government investment in structures
    LocalStructures,
    /// State and local government investment in equipment
    LocalEquipment,
    /// State and local government investment in intellectual property
    LocalIP,
    /// The sum of every other category
    All,
    /// The sum of every category except [`FinalDemand::Export`]
    NonExport,
}

impl FinalDemand {
    /// The summary-level code for this category, or `None` for aggregated categories
    pub fn code(self) -> Option<&'static str> {
        use FinalDemand::*;
        let code = match self {
            PersonalConsumption => "F010",
            PrivateStructures => "F02S",
            PrivateEquipment => "F02E",
            PrivateIP => "F02N",
            PrivateResidential => "F02R",
            InventoryChange => "F030",
            Export => "F040",
            DefenseConsumption => "F06C",
            DefenseStructures => "F06S",
            DefenseEquipment => "F06E",
            DefenseIP => "F06N",
            NondefenseConsumption => "F07C",
            NondefenseStructures => "F07S",
            NondefenseEquipment => "F07E",
            NondefenseIP => "F07N",
            LocalConsumption => "F10C",
            LocalStructures => "F10S",
            LocalEquipment => "F10E",
            LocalIP => "F10N",
            All | NonExport => return None,
        };
        Some(code)
    }

    /// The detail-level code for this category: the summary code followed by "00"
    pub fn detail_code(self) -> Option<String> {
        self.code().map(|code| format!("{code}00"))
    }

    /// The categories read directly from the tables
    pub fn atomic() -> impl Iterator<Item = Self> {
        Self::iter().filter(|d| d.code().is_some())
    }

    /// Whether this category is part of the aggregated category `group`
    fn is_in(self, group: Self) -> bool {
        match group {
            Self::All => true,
            Self::NonExport => self != Self::Export,
            _ => false,
        }
    }
}

/// Final demand vectors for every category in one year
pub type DemandTable = HashMap<FinalDemand, Array1<f64>>;

/// Labels and crosswalk for one pair of detail and summary demand tables
struct DemandTables<'a> {
    loader: &'a TableLoader,
    detail_file: &'a Path,
    summary_file: &'a Path,
    detail_layout: &'a DemandLayout,
    summary_layout: &'a DemandLayout,
}

impl DemandTables<'_> {
    /// Read one column of a demand table as a vector
    fn column(&self, file: &Path, sheet: &str, layout: &DemandLayout, col: usize) -> Result<Array2<f64>> {
        self.loader
            .matrix(file, sheet, layout.rows, (col, col + 1))
            .with_context(|| format!("Reading final demand from {}", file.display()))
    }

    /// Find the column of `code` within the demand columns of a sheet
    fn find_column(
        &self,
        file: &Path,
        sheet: &str,
        layout: &DemandLayout,
        code: &str,
    ) -> Result<usize> {
        let codes = self.loader.text_row(file, sheet, layout.code_row, layout.cols)?;
        let index = index_lookup(&codes).get(code).copied().ok_or_else(|| {
            EioError::MissingCategory {
                code: code.to_string(),
                table: format!("{} (sheet {sheet})", file.display()),
            }
        })?;
        Ok(layout.cols.0 + index)
    }

    fn crosswalk(&self, layout: &Layout) -> Result<Crosswalk> {
        build_crosswalk(self.loader, self.summary_file, &layout.crosswalk)
            .with_context(|| format!("Reading crosswalk from {}", self.summary_file.display()))
    }
}

/// Load final demand for every category for `year`.
///
/// If `imports` is true, `detail_file` and `summary_file` are import matrices and the result is
/// demand met by imports, otherwise they are use tables and the result is total demand. Values are
/// converted to dollars. Negative total demand and positive import demand have no physical meaning
/// and are set to zero before the aggregated categories are formed.
pub fn load_final_demand(
    loader: &TableLoader,
    detail_file: &Path,
    summary_file: &Path,
    layout: &Layout,
    year: Year,
    detail_year: Year,
    imports: bool,
) -> Result<DemandTable> {
    let tables = DemandTables {
        loader,
        detail_file,
        summary_file,
        detail_layout: &layout.detail_demand,
        summary_layout: if imports {
            &layout.summary_import_demand
        } else {
            &layout.summary_demand
        },
    };
    let detail_sheet = detail_year.sheet_name();
    let summary_sheet = year.sheet_name();

    // Only needed when adjusting to another year
    let adjustment = if year == detail_year {
        None
    } else {
        let detail_rows = loader.text_column(
            detail_file,
            &detail_sheet,
            tables.detail_layout.row_code_col,
            tables.detail_layout.rows,
        )?;
        let summary_rows = loader.text_column(
            summary_file,
            &summary_sheet,
            tables.summary_layout.row_code_col,
            tables.summary_layout.rows,
        )?;
        Some((detail_rows, summary_rows, tables.crosswalk(layout)?))
    };

    let mut out = DemandTable::new();
    for demand in FinalDemand::atomic() {
        let Some(detail_code) = demand.detail_code() else {
            continue;
        };
        let col = tables.find_column(detail_file, &detail_sheet, tables.detail_layout, &detail_code)?;
        let mut values = tables.column(detail_file, &detail_sheet, tables.detail_layout, col)?
            * DEMAND_MULTIPLIER;

        if let Some((detail_rows, summary_rows, crosswalk)) = &adjustment {
            let code = demand.code().unwrap_or_default();
            let col = tables.find_column(summary_file, &summary_sheet, tables.summary_layout, code)?;
            let for_year = tables.column(summary_file, &summary_sheet, tables.summary_layout, col)?;
            let for_detail_year =
                tables.column(summary_file, &detail_sheet, tables.summary_layout, col)?;
            let expanded = expand_matrix(
                &ratio(&for_year, &for_detail_year),
                summary_rows,
                &[DUMMY_SUMMARY_CODE.to_string()],
                detail_rows,
                &[DUMMY_DETAIL_CODE.to_string()],
                crosswalk,
            );
            values *= &expanded;
        }

        let mut values = values.remove_axis(Axis(1));
        let clipped = clip_sign(&mut values, imports);
        if clipped > 0 {
            debug!("{year} {demand} (imports: {imports}): set {clipped} entries to zero");
        }
        out.insert(demand, values);
    }

    for group in [FinalDemand::All, FinalDemand::NonExport] {
        let total = aggregate(&out, group);
        out.insert(group, total);
    }

    Ok(out)
}

/// Set entries with the wrong sign to zero, returning how many were changed.
///
/// Total demand must not be negative and import demand must not be positive.
pub fn clip_sign(values: &mut Array1<f64>, imports: bool) -> usize {
    let mut clipped = 0;
    for v in values.iter_mut() {
        if (!imports && *v < 0.0) || (imports && *v > 0.0) {
            *v = 0.0;
            clipped += 1;
        }
    }
    clipped
}

/// Sum the atomic categories belonging to `group`
fn aggregate(table: &DemandTable, group: FinalDemand) -> Array1<f64> {
    let len = table.values().next().map_or(0, Array1::len);
    FinalDemand::atomic()
        .filter(|d| d.is_in(group))
        .filter_map(|d| table.get(&d))
        .fold(Array1::zeros(len), |acc, v| acc + v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rstest::rstest;

    #[test]
    fn test_atomic_categories() {
        assert_eq!(FinalDemand::atomic().count(), 19);
        assert!(FinalDemand::atomic().all(|d| d.code().is_some()));
    }

    #[rstest]
    #[case(FinalDemand::PersonalConsumption, Some("F01000"))]
    #[case(FinalDemand::LocalIP, Some("F10N00"))]
    #[case(FinalDemand::All, None)]
    fn test_detail_code(#[case] demand: FinalDemand, #[case] expected: Option<&str>) {
        assert_eq!(demand.detail_code().as_deref(), expected);
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(
            "NonExport".parse::<FinalDemand>().unwrap(),
            FinalDemand::NonExport
        );
        assert!("Everything".parse::<FinalDemand>().is_err());
    }

    #[rstest]
    #[case(false, array![0.0, 2.0, 0.0], 1)]
    #[case(true, array![-1.0, 0.0, 0.0], 1)]
    fn test_clip_sign(
        #[case] imports: bool,
        #[case] expected: Array1<f64>,
        #[case] count: usize,
    ) {
        let mut values = array![-1.0, 2.0, 0.0];
        assert_eq!(clip_sign(&mut values, imports), count);
        assert_eq!(values, expected);
    }

    #[test]
    fn test_aggregate() {
        let mut table = DemandTable::new();
        table.insert(FinalDemand::PersonalConsumption, array![1.0, 2.0]);
        table.insert(FinalDemand::Export, array![4.0, 0.0]);
        table.insert(FinalDemand::InventoryChange, array![0.0, 1.0]);
        assert_eq!(aggregate(&table, FinalDemand::All), array![5.0, 3.0]);
        assert_eq!(aggregate(&table, FinalDemand::NonExport), array![1.0, 3.0]);
    }
}
