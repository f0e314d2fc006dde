//! Where data sits within each workbook.
//!
//! The defaults describe the spreadsheets published by the US Bureau of Economic Analysis: the
//! detailed (2007) and summary (1997 onwards) total and domestic requirements tables, the use tables
//! and the import matrices. Any table's layout can be overridden in the model configuration file.
//! Ranges are half-open, `[start, end]` in TOML meaning `start..end`.
use serde::Deserialize;

/// Layout of a requirements table and its sector labels
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequirementsLayout {
    /// Rows holding matrix values (one per industry)
    pub rows: (usize, usize),
    /// Columns holding matrix values (one per commodity)
    pub cols: (usize, usize),
    /// Column of industry codes
    pub industry_code_col: usize,
    /// Column of industry descriptions
    pub industry_description_col: usize,
    /// Row of commodity codes
    pub commodity_code_row: usize,
    /// Row of commodity descriptions
    pub commodity_description_row: usize,
}

impl RequirementsLayout {
    fn detail() -> Self {
        Self {
            rows: (5, 394),
            cols: (2, 391),
            industry_code_col: 0,
            industry_description_col: 1,
            commodity_code_row: 4,
            commodity_description_row: 3,
        }
    }

    fn summary() -> Self {
        Self {
            rows: (7, 78),
            cols: (2, 75),
            industry_code_col: 0,
            industry_description_col: 1,
            commodity_code_row: 5,
            commodity_description_row: 6,
        }
    }
}

/// Layout of the summary-to-detail sector code table
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrosswalkLayout {
    /// The sheet holding the table
    pub sheet: String,
    /// Column of summary codes
    pub summary_col: usize,
    /// Column of detail codes
    pub detail_col: usize,
    /// Rows of the table
    pub rows: (usize, usize),
}

impl Default for CrosswalkLayout {
    fn default() -> Self {
        Self {
            sheet: "NAICS codes".into(),
            summary_col: 1,
            detail_col: 2,
            rows: (6, 649),
        }
    }
}

/// Layout of final demand columns in a use table or import matrix
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemandLayout {
    /// Row holding the final demand category codes
    pub code_row: usize,
    /// Columns holding final demand
    pub cols: (usize, usize),
    /// Rows holding final demand (one per commodity)
    pub rows: (usize, usize),
    /// Column holding the commodity code of each row
    pub row_code_col: usize,
}

impl DemandLayout {
    fn detail() -> Self {
        Self {
            code_row: 5,
            cols: (392, 412),
            rows: (6, 395),
            row_code_col: 0,
        }
    }

    fn summary() -> Self {
        Self {
            code_row: 5,
            cols: (76, 96),
            rows: (7, 80),
            row_code_col: 0,
        }
    }

    fn summary_imports() -> Self {
        Self {
            code_row: 5,
            cols: (74, 94),
            rows: (6, 79),
            row_code_col: 0,
        }
    }
}

/// Layout of the table mapping industries to emission source classification codes
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SccMapLayout {
    /// The sheet holding the table
    pub sheet: String,
    /// Number of header rows before the first industry
    pub header_rows: usize,
    /// Column of industry descriptions
    pub industry_col: usize,
    /// First column of SCCs; every following column may also hold an SCC
    pub first_scc_col: usize,
}

impl Default for SccMapLayout {
    fn default() -> Self {
        Self {
            sheet: "Sheet1".into(),
            header_rows: 1,
            industry_col: 1,
            first_scc_col: 3,
        }
    }
}

/// Layout of the table grouping sectors into aggregates
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateLayout {
    /// The sheet holding the table
    pub sheet: String,
    /// Column of industry descriptions
    pub industry_col: usize,
    /// Column of the group abbreviation for each industry
    pub industry_group_col: usize,
    /// Column of commodity descriptions
    pub commodity_col: usize,
    /// Column of the group abbreviation for each commodity
    pub commodity_group_col: usize,
    /// Column of group names
    pub group_name_col: usize,
    /// Column of group abbreviations
    pub group_abbreviation_col: usize,
    /// Rows holding sectors
    pub rows: (usize, usize),
    /// Rows holding group definitions
    pub group_rows: (usize, usize),
}

impl Default for AggregateLayout {
    fn default() -> Self {
        Self {
            sheet: "bea".into(),
            industry_col: 1,
            industry_group_col: 2,
            commodity_col: 5,
            commodity_group_col: 6,
            group_name_col: 8,
            group_abbreviation_col: 9,
            rows: (1, 390),
            group_rows: (1, 8),
        }
    }
}

/// Layout of the table grouping SCCs into aggregates
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SccAggregateLayout {
    /// The sheet holding the table
    pub sheet: String,
    /// Column of SCCs, which must list the model's SCCs in sorted order
    pub scc_col: usize,
    /// Column of the group abbreviation for each SCC
    pub scc_group_col: usize,
    /// Column of group names
    pub group_name_col: usize,
    /// Column of group abbreviations
    pub group_abbreviation_col: usize,
    /// Rows holding SCCs. Reading stops at the first empty SCC.
    pub rows: (usize, usize),
    /// Rows holding group definitions
    pub group_rows: (usize, usize),
}

impl Default for SccAggregateLayout {
    fn default() -> Self {
        Self {
            sheet: "scc".into(),
            scc_col: 6,
            scc_group_col: 7,
            group_name_col: 3,
            group_abbreviation_col: 4,
            rows: (1, 5435),
            group_rows: (1, 15),
        }
    }
}

/// Layout of every table read by the model
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Layout {
    /// Detail-level total and domestic requirements tables
    pub detail_requirements: RequirementsLayout,
    /// Summary-level total and domestic requirements tables
    pub summary_requirements: RequirementsLayout,
    /// The summary-to-detail crosswalk, found in each summary workbook
    pub crosswalk: CrosswalkLayout,
    /// Detail-level use table and import matrix
    pub detail_demand: DemandLayout,
    /// Summary-level use table
    pub summary_demand: DemandLayout,
    /// Summary-level import matrix
    pub summary_import_demand: DemandLayout,
    /// Industry to SCC table
    pub scc_map: SccMapLayout,
    /// Sector aggregation table
    pub aggregates: AggregateLayout,
    /// SCC aggregation table
    pub scc_aggregates: SccAggregateLayout,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            detail_requirements: RequirementsLayout::detail(),
            summary_requirements: RequirementsLayout::summary(),
            crosswalk: CrosswalkLayout::default(),
            detail_demand: DemandLayout::detail(),
            summary_demand: DemandLayout::summary(),
            summary_import_demand: DemandLayout::summary_imports(),
            scc_map: SccMapLayout::default(),
            aggregates: AggregateLayout::default(),
            scc_aggregates: SccAggregateLayout::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dimensions_agree() {
        let layout = Layout::default();
        let detail = &layout.detail_requirements;
        assert_eq!(detail.rows.1 - detail.rows.0, 389);
        assert_eq!(detail.cols.1 - detail.cols.0, 389);
        assert_eq!(
            layout.detail_demand.rows.1 - layout.detail_demand.rows.0,
            389
        );
        assert_eq!(layout.detail_demand.cols.1 - layout.detail_demand.cols.0, 20);
    }

    #[test]
    fn test_partial_override() {
        let layout: Layout = toml::from_str(
            "[crosswalk]
            sheet = \"codes\"
            summary_col = 0
            detail_col = 1
            rows = [1, 10]",
        )
        .unwrap();
        assert_eq!(layout.crosswalk.sheet, "codes");
        assert_eq!(layout.crosswalk.rows, (1, 10));
        assert_eq!(layout.detail_requirements, Layout::default().detail_requirements);
    }
}
