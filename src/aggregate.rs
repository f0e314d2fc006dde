//! Grouping sectors and SCCs into a small number of aggregates.
use crate::eio::Eio;
use crate::error::EioError;
use crate::input::layout::SccAggregateLayout;
use crate::scc::SccList;
use crate::sector::Mask;
use crate::spatial_ref::normalize_scc;
use crate::table::TableLoader;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use ndarray::Array1;
use std::collections::HashSet;
use std::path::Path;

/// Named aggregate groups and their abbreviations, in the order they are declared
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateGroups(IndexMap<String, String>);

impl AggregateGroups {
    /// Pair up group names and abbreviations, stopping at the first empty name
    pub(crate) fn new(names: Vec<String>, abbreviations: Vec<String>) -> Self {
        Self(
            names
                .into_iter()
                .zip(abbreviations)
                .take_while(|(name, _)| !name.is_empty())
                .collect(),
        )
    }

    /// Check that every assigned abbreviation belongs to a declared group
    fn check_declared<'a, I>(&self, assigned: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let declared: HashSet<&str> = self.abbreviations().collect();
        for abbrev in assigned {
            ensure!(
                declared.contains(abbrev.as_str()),
                EioError::DataIntegrity(format!(
                    "assigned to undeclared aggregate group {abbrev:?}"
                ))
            );
        }
        Ok(())
    }

    /// Group names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Group abbreviations, in the same order as [`AggregateGroups::names`]
    pub fn abbreviations(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    /// The abbreviation of the group called `name`
    pub fn abbreviation(&self, name: &str) -> Result<&str, EioError> {
        self.0
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| EioError::not_found("aggregate group", name))
    }
}

/// Assigns each industry and commodity to an aggregate group
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregator {
    groups: AggregateGroups,
    industry_groups: Vec<String>,
    commodity_groups: Vec<String>,
}

impl Aggregator {
    /// Read an aggregation workbook.
    ///
    /// The industries and commodities listed must be exactly those of `eio`, in the same order,
    /// and each must be assigned to a declared group.
    pub fn new(eio: &Eio, file: &Path) -> Result<Self> {
        let layout = &eio.layout().aggregates;
        let loader = eio.loader();
        let column = |col, rows| loader.text_column(file, &layout.sheet, col, rows);
        let context = || format!("Reading sector aggregation from {}", file.display());

        let industries = column(layout.industry_col, layout.rows)?;
        eio.industries()
            .check_matches(&industries)
            .with_context(context)?;
        let commodities = column(layout.commodity_col, layout.rows)?;
        eio.commodities()
            .check_matches(&commodities)
            .with_context(context)?;

        let groups = AggregateGroups::new(
            column(layout.group_name_col, layout.group_rows)?,
            column(layout.group_abbreviation_col, layout.group_rows)?,
        );
        let industry_groups = column(layout.industry_group_col, layout.rows)?;
        let commodity_groups = column(layout.commodity_group_col, layout.rows)?;
        groups
            .check_declared(industry_groups.iter().chain(&commodity_groups))
            .with_context(context)?;

        Ok(Self {
            groups,
            industry_groups,
            commodity_groups,
        })
    }

    /// The aggregate groups
    pub fn groups(&self) -> &AggregateGroups {
        &self.groups
    }

    /// A mask selecting the industries in the group abbreviated `abbrev`
    pub fn industry_mask(&self, abbrev: &str) -> Mask {
        group_mask(&self.industry_groups, abbrev)
    }

    /// A mask selecting the commodities in the group abbreviated `abbrev`
    pub fn commodity_mask(&self, abbrev: &str) -> Mask {
        group_mask(&self.commodity_groups, abbrev)
    }

    /// Sum values by industry (e.g. production) into one value for each group, in group order
    pub fn industry_totals(&self, by_industry: &Array1<f64>) -> Result<Vec<f64>> {
        ensure!(
            by_industry.len() == self.industry_groups.len(),
            "Got values for {} industries but {} are grouped",
            by_industry.len(),
            self.industry_groups.len()
        );
        Ok(self
            .groups
            .abbreviations()
            .map(|abbrev| self.industry_mask(abbrev).values().dot(by_industry))
            .collect())
    }
}

/// Assigns each SCC to an aggregate group
#[derive(Debug, Clone, PartialEq)]
pub struct SccAggregator {
    groups: AggregateGroups,
    scc_groups: Vec<String>,
}

impl SccAggregator {
    /// Read an SCC aggregation workbook.
    ///
    /// The SCCs listed must be exactly those in `sccs`, in the same order, and each must be
    /// assigned to a declared group.
    pub fn new(
        loader: &TableLoader,
        layout: &SccAggregateLayout,
        file: &Path,
        sccs: &SccList,
    ) -> Result<Self> {
        let column = |col, rows| loader.text_column(file, &layout.sheet, col, rows);
        let context = || format!("Reading SCC aggregation from {}", file.display());

        let listed: Vec<String> = column(layout.scc_col, layout.rows)?
            .into_iter()
            .take_while(|code| !code.is_empty())
            .collect();
        ensure!(
            listed.len() == sccs.len(),
            EioError::DataIntegrity(format!(
                "incorrect number of SCCs in {}: {} != {}",
                file.display(),
                listed.len(),
                sccs.len()
            ))
        );
        for (code, scc) in listed.iter().zip(sccs.codes()) {
            let code = normalize_scc(code).with_context(context)?;
            ensure!(
                &code == scc,
                EioError::DataIntegrity(format!("SCCs don't match: {code} != {scc}"))
            );
        }

        let groups = AggregateGroups::new(
            column(layout.group_name_col, layout.group_rows)?,
            column(layout.group_abbreviation_col, layout.group_rows)?,
        );
        let mut scc_groups = column(layout.scc_group_col, layout.rows)?;
        scc_groups.truncate(listed.len());
        groups.check_declared(&scc_groups).with_context(context)?;

        Ok(Self { groups, scc_groups })
    }

    /// The aggregate groups
    pub fn groups(&self) -> &AggregateGroups {
        &self.groups
    }

    /// A mask selecting the SCCs in the group abbreviated `abbrev`
    pub fn scc_mask(&self, abbrev: &str) -> Mask {
        group_mask(&self.scc_groups, abbrev)
    }
}

fn group_mask(groups: &[String], abbrev: &str) -> Mask {
    Mask::from_bools(groups.iter().map(|group| group == abbrev))
}
