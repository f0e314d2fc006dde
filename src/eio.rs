//! The economic input-output model.
//!
//! An [`Eio`] holds requirements matrices and final demand vectors for every configured year, plus
//! the ordered lists of industries and commodities which index them.
use crate::demand::{DemandTable, FinalDemand, load_final_demand};
use crate::error::EioError;
use crate::input::Config;
use crate::input::layout::Layout;
use crate::requirements::{
    RequirementsFiles, SectorLabels, adjusted_requirements, commodities, import_requirements,
    industries,
};
use crate::sector::{Location, Mask, SectorList};
use crate::table::TableLoader;
use crate::year::Year;
use anyhow::{Context, Result, ensure};
use log::info;
use ndarray::{Array1, Array2};
use std::collections::HashMap;
use std::panic;
use std::thread::{self, ScopedJoinHandle};

/// Everything loaded for a single year
struct YearData {
    total_requirements: Array2<f64>,
    domestic_requirements: Array2<f64>,
    import_requirements: Array2<f64>,
    total_demand: DemandTable,
    import_demand: DemandTable,
}

/// Wait for a scoped thread, re-raising any panic in the calling thread
fn join<T>(handle: ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    handle
        .join()
        .unwrap_or_else(|payload| panic::resume_unwind(payload))
}

/// An economic input-output model covering one or more years
pub struct Eio {
    years: Vec<Year>,
    detail_year: Year,
    data: HashMap<Year, YearData>,
    industries: SectorList,
    commodities: SectorList,
    industry_codes: SectorList,
    commodity_codes: SectorList,
    loader: TableLoader,
    layout: Layout,
}

impl Eio {
    /// Load the model described by `config`.
    ///
    /// Requirements and final demand for each year are loaded in parallel. If any of them fails,
    /// the first error is returned and nothing is kept.
    pub fn new(config: &Config) -> Result<Self> {
        info!(
            "Loading economic data for {} year(s); detail year {}",
            config.years.len(),
            config.detail_year
        );
        let loader = TableLoader::new(config.workbook_cache_size);
        let layout = &config.layout;
        let detail_year = config.detail_year;
        let total_files = RequirementsFiles {
            detail: &config.total_requirements_detail,
            summary: &config.total_requirements_summary,
        };
        let domestic_files = RequirementsFiles {
            detail: &config.domestic_requirements_detail,
            summary: &config.domestic_requirements_summary,
        };
        let detail_sheet = detail_year.sheet_name();

        let (data, industry_labels, commodity_labels) = thread::scope(|s| -> Result<_> {
            let loader = &loader;
            let detail_sheet = detail_sheet.as_str();
            let handles: Vec<_> = config
                .years
                .iter()
                .map(|&year| {
                    let total = s.spawn(move || {
                        adjusted_requirements(loader, total_files, layout, year, detail_year)
                    });
                    let domestic = s.spawn(move || {
                        adjusted_requirements(loader, domestic_files, layout, year, detail_year)
                    });
                    let total_demand = s.spawn(move || {
                        load_final_demand(
                            loader,
                            &config.use_detail,
                            &config.use_summary,
                            layout,
                            year,
                            detail_year,
                            false,
                        )
                    });
                    let import_demand = s.spawn(move || {
                        load_final_demand(
                            loader,
                            &config.imports_detail,
                            &config.imports_summary,
                            layout,
                            year,
                            detail_year,
                            true,
                        )
                    });
                    (year, total, domestic, total_demand, import_demand)
                })
                .collect();
            let industry_labels = s.spawn(move || {
                industries(
                    loader,
                    total_files.detail,
                    detail_sheet,
                    &layout.detail_requirements,
                )
            });
            let commodity_labels = s.spawn(move || {
                commodities(
                    loader,
                    total_files.detail,
                    detail_sheet,
                    &layout.detail_requirements,
                )
            });

            let mut data = HashMap::new();
            for (year, total, domestic, total_demand, import_demand) in handles {
                let total_requirements =
                    join(total).with_context(|| format!("Loading total requirements for {year}"))?;
                let domestic_requirements = join(domestic)
                    .with_context(|| format!("Loading domestic requirements for {year}"))?;
                let total_demand = join(total_demand)
                    .with_context(|| format!("Loading total final demand for {year}"))?;
                let import_demand = join(import_demand)
                    .with_context(|| format!("Loading import final demand for {year}"))?;
                data.insert(
                    year,
                    YearData {
                        import_requirements: import_requirements(
                            &total_requirements,
                            &domestic_requirements,
                        ),
                        total_requirements,
                        domestic_requirements,
                        total_demand,
                        import_demand,
                    },
                );
            }

            let industry_labels = join(industry_labels).context("Loading industries")?;
            let commodity_labels = join(commodity_labels).context("Loading commodities")?;
            Ok((data, industry_labels, commodity_labels))
        })?;

        let SectorLabels {
            codes: industry_codes,
            descriptions: industry_names,
        } = industry_labels;
        let SectorLabels {
            codes: commodity_codes,
            descriptions: commodity_names,
        } = commodity_labels;
        ensure!(
            industry_names.len() == commodity_names.len(),
            EioError::DataIntegrity(format!(
                "number of industries ({}) and commodities ({}) differ",
                industry_names.len(),
                commodity_names.len()
            ))
        );
        info!("Loaded {} sectors", industry_names.len());

        Ok(Self {
            years: config.years.clone(),
            detail_year,
            data,
            industries: SectorList::new("industry", industry_names),
            commodities: SectorList::new("commodity", commodity_names),
            industry_codes: SectorList::new("industry code", industry_codes),
            commodity_codes: SectorList::new("commodity code", commodity_codes),
            loader,
            layout: config.layout.clone(),
        })
    }

    /// The years the model has data for
    pub fn years(&self) -> &[Year] {
        &self.years
    }

    /// The year for which detail-level tables were read directly
    pub fn detail_year(&self) -> Year {
        self.detail_year
    }

    /// Industries, in matrix row order
    pub fn industries(&self) -> &SectorList {
        &self.industries
    }

    /// Commodities, in matrix column order
    pub fn commodities(&self) -> &SectorList {
        &self.commodities
    }

    /// The loader used to read the model's tables.
    ///
    /// Other tables read through it share its workbook cache.
    pub fn loader(&self) -> &TableLoader {
        &self.loader
    }

    /// Where data sits within each table
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The position of the named industry
    pub fn industry_index(&self, name: &str) -> Result<usize> {
        Ok(self.industries.index(name)?)
    }

    /// The position of the named commodity
    pub fn commodity_index(&self, name: &str) -> Result<usize> {
        Ok(self.commodities.index(name)?)
    }

    /// The position of the industry with the given code
    pub fn industry_code_index(&self, code: &str) -> Result<usize> {
        Ok(self.industry_codes.index(code)?)
    }

    /// The position of the commodity with the given code
    pub fn commodity_code_index(&self, code: &str) -> Result<usize> {
        Ok(self.commodity_codes.index(code)?)
    }

    /// A mask selecting only the named industry
    pub fn industry_mask(&self, name: &str) -> Result<Mask> {
        Ok(self.industries.mask(name)?)
    }

    /// A mask selecting only the named commodity
    pub fn commodity_mask(&self, name: &str) -> Result<Mask> {
        Ok(self.commodities.mask(name)?)
    }

    fn year_data(&self, year: Year) -> Result<&YearData> {
        Ok(self
            .data
            .get(&year)
            .ok_or_else(|| EioError::not_found("year", year.to_string()))?)
    }

    /// The requirements matrix for `year` (industry x commodity)
    pub fn requirements(&self, year: Year, loc: Location) -> Result<&Array2<f64>> {
        let data = self.year_data(year)?;
        Ok(match loc {
            Location::Domestic => &data.domestic_requirements,
            Location::Imported => &data.import_requirements,
            Location::Total => &data.total_requirements,
        })
    }

    /// Economic production in each industry caused by `demand` for commodities in `year`.
    ///
    /// The result has the same units as `demand`.
    pub fn economic_impacts(
        &self,
        demand: &Array1<f64>,
        year: Year,
        loc: Location,
    ) -> Result<Array1<f64>> {
        let requirements = self.requirements(year, loc)?;
        ensure!(
            demand.len() == requirements.ncols(),
            "Demand has {} entries but there are {} commodities",
            demand.len(),
            requirements.ncols()
        );
        Ok(requirements.dot(demand))
    }

    /// Final demand of kind `demand` for `year`.
    ///
    /// If `commodities` is given, demand for commodities outside the mask is set to zero.
    pub fn final_demand(
        &self,
        demand: FinalDemand,
        commodities: Option<&Mask>,
        year: Year,
        loc: Location,
    ) -> Result<Array1<f64>> {
        let data = self.year_data(year)?;
        let lookup = |table: &DemandTable| -> Result<Array1<f64>> {
            Ok(table
                .get(&demand)
                .cloned()
                .ok_or_else(|| EioError::not_found("final demand", demand.to_string()))?)
        };

        let mut out = match loc {
            Location::Domestic => lookup(&data.total_demand)? - lookup(&data.import_demand)?,
            Location::Imported => lookup(&data.import_demand)?,
            Location::Total => lookup(&data.total_demand)?,
        };
        if let Some(mask) = commodities {
            ensure!(
                mask.len() == out.len(),
                "Commodity mask has {} entries but there are {} commodities",
                mask.len(),
                out.len()
            );
            mask.apply(&mut out);
        }
        Ok(out)
    }

    /// A demand vector with `amount` of the named commodity and nothing else
    pub fn final_demand_single(&self, commodity: &str, amount: f64) -> Result<Array1<f64>> {
        let index = self.commodity_index(commodity)?;
        let mut out = Array1::zeros(self.commodities.len());
        out[index] = amount;
        Ok(out)
    }

    /// Total domestic production in each industry in `year`: the production needed to meet all
    /// domestic final demand
    pub fn domestic_production(&self, year: Year) -> Result<Array1<f64>> {
        let demand = self.final_demand(FinalDemand::All, None, year, Location::Domestic)?;
        self.economic_impacts(&demand, year, Location::Domestic)
    }
}
