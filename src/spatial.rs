//! Spatially explicit emissions, concentrations and health impacts of economic demand.
//!
//! Impacts are found by multiplying economic activity in each industry by a factor matrix: the
//! impact in each grid cell per dollar of production in each industry. Factor matrices are
//! expensive to build, so they are kept in [`RequestCache`]s and, if a cache location is
//! configured, persisted between runs. Impacts of individual requests are cached in the same way.
use crate::cache::store::{ObjectStore, store_from_location};
use crate::aggregate::SccAggregator;
use crate::cache::{Context, Persistence, RequestCache};
use crate::demand::FinalDemand;
use crate::eio::Eio;
use crate::error::EioError;
use crate::input::{Config, SpatialConfig};
use crate::scc::{SccList, read_scc_descriptions};
use crate::sector::{Location, Mask};
use crate::spatial_ref::{SpatialRef, nei_spatial_refs, read_scc_map};
use crate::surrogate::{HazardRatio, SurrogateProvider};
use crate::year::Year;
use anyhow::{Context as _, Result, ensure};
use log::info;
use ndarray::{Array1, Array2, Axis};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::sync::{Arc, OnceLock};

pub mod concentrations;
pub mod emissions;
pub mod health;
use concentrations::ConcentrationsRequest;
use emissions::EmissionsRequest;
use health::{HealthFactorRequest, HealthRequest};

/// Sub-location of the persistent cache holding the results of individual requests
const INDIVIDUAL_CACHE_DIR: &str = "individual";

type Matrix = Arc<Array2<f64>>;
type Vector = Arc<Array1<f64>>;
type FactorCache<R> = RequestCache<R, Matrix>;
type ResultCache<R> = RequestCache<R, Vector>;
type SpatialRefCache = RequestCache<Year, Arc<Vec<SpatialRef>>>;

/// Divide each industry's impacts by its production to give impacts per unit of production.
///
/// `columns` holds the impacts of each industry by grid cell. The result has one row per grid cell
/// and one column per industry. Industries with no production are given zero factors.
pub fn factor_matrix(columns: &[Array1<f64>], production: &Array1<f64>) -> Result<Array2<f64>> {
    ensure!(
        columns.len() == production.len(),
        EioError::DataIntegrity(format!(
            "impacts given for {} industries but production for {}",
            columns.len(),
            production.len()
        ))
    );
    let cells = columns.first().map_or(0, Array1::len);
    let mut out = Array2::zeros((cells, columns.len()));
    for (i, (column, &prod)) in columns.iter().zip(production).enumerate() {
        ensure!(
            column.len() == cells,
            "Industry {i} has impacts for {} grid cells, expected {cells}",
            column.len()
        );
        if prod != 0.0 {
            out.column_mut(i).assign(&(column / prod));
        }
    }
    Ok(out)
}

fn hash_values(hasher: &mut Sha256, values: &Array1<f64>) {
    hasher.update((values.len() as u64).to_le_bytes());
    for value in values {
        hasher.update(value.to_le_bytes());
    }
}

/// A cache key derived from a hash of a request's parameters
fn request_key(
    prefix: &str,
    demand: &Array1<f64>,
    mask: Option<&Mask>,
    params: &[&dyn Display],
) -> String {
    let mut hasher = Sha256::new();
    hash_values(&mut hasher, demand);
    if let Some(mask) = mask {
        hasher.update(b"mask");
        hash_values(&mut hasher, mask.values());
    }
    for param in params {
        hasher.update(param.to_string().as_bytes());
        hasher.update([0]);
    }
    format!("{prefix}_{}", hex::encode(hasher.finalize()))
}

/// Economic activity in each industry caused by `demand`, optionally restricted to the industries
/// in `industries`
fn activity(
    eio: &Eio,
    demand: &Array1<f64>,
    industries: Option<&Mask>,
    year: Year,
    loc: Location,
) -> Result<Array1<f64>> {
    let mut activity = eio.economic_impacts(demand, year, loc)?;
    if let Some(mask) = industries {
        ensure!(
            mask.len() == activity.len(),
            "Industry mask has {} entries but there are {} industries",
            mask.len(),
            activity.len()
        );
        mask.apply(&mut activity);
    }
    Ok(activity)
}

/// Impacts by grid cell: the factor matrix multiplied by masked economic activity
fn impact(
    eio: &Eio,
    factors: &Array2<f64>,
    demand: &Array1<f64>,
    industries: Option<&Mask>,
    year: Year,
    loc: Location,
) -> Result<Array1<f64>> {
    let activity = activity(eio, demand, industries, year, loc)?;
    ensure!(
        factors.ncols() == activity.len(),
        "Factor matrix has {} industries but there are {}",
        factors.ncols(),
        activity.len()
    );
    Ok(factors.dot(&activity))
}

/// Impacts by grid cell (rows) and industry (columns): each column of the factor matrix scaled by
/// activity in that industry
fn impact_matrix(
    eio: &Eio,
    factors: &Array2<f64>,
    demand: &Array1<f64>,
    year: Year,
    loc: Location,
) -> Result<Array2<f64>> {
    let activity = activity(eio, demand, None, year, loc)?;
    ensure!(
        factors.ncols() == activity.len(),
        "Factor matrix has {} industries but there are {}",
        factors.ncols(),
        activity.len()
    );
    Ok(factors * &activity.insert_axis(Axis(0)))
}

/// What factor computations need: the economic model, the surrogate provider and spatial
/// references
#[derive(Clone)]
struct FactorInputs {
    eio: Arc<Eio>,
    provider: Arc<dyn SurrogateProvider>,
    spatial_refs: Arc<SpatialRefCache>,
}

impl FactorInputs {
    /// Build a factor matrix for `year` from the impacts `industry_impacts` gives for each
    /// industry's spatial reference
    fn factors<F>(&self, ctx: &Context, year: Year, industry_impacts: F) -> Result<Array2<f64>>
    where
        F: Fn(&SpatialRef) -> Result<Array1<f64>>,
    {
        let production = self.eio.domestic_production(year)?;
        let refs = self
            .spatial_refs
            .new_request(ctx, year, year.to_string())
            .result()?;
        let names = self.eio.industries().names();
        let columns = refs
            .iter()
            .enumerate()
            .map(|(i, spatial_ref)| {
                ensure!(
                    !spatial_ref.sccs.is_empty(),
                    "Industry {i} ({}) has no SCCs",
                    names[i]
                );
                industry_impacts(spatial_ref)
                    .with_context(|| format!("Calculating impacts of {}", names[i]))
            })
            .collect::<Result<Vec<_>>>()?;
        factor_matrix(&columns, &production)
    }
}

/// An economic input-output model which can also calculate spatially explicit environmental
/// impacts.
///
/// Caches are created the first time they are needed and belong to this instance.
pub struct SpatialEio {
    inputs: FactorInputs,
    sccs: SccList,
    hazard_ratios: HashMap<String, Arc<dyn HazardRatio>>,
    factor_store: Option<Arc<dyn ObjectStore>>,
    result_store: Option<Arc<dyn ObjectStore>>,
    memory_cache_size: usize,
    factor_memory_cache_size: usize,
    emission_factors: OnceLock<Arc<FactorCache<emissions::FactorRequest>>>,
    concentration_factors: OnceLock<Arc<FactorCache<concentrations::FactorRequest>>>,
    health_factors: OnceLock<Arc<FactorCache<HealthFactorRequest>>>,
    emissions: OnceLock<ResultCache<EmissionsRequest>>,
    concentrations: OnceLock<ResultCache<ConcentrationsRequest>>,
    health: OnceLock<ResultCache<HealthRequest>>,
}

impl SpatialEio {
    /// Load the economic model described by `config` and prepare for spatial calculations.
    ///
    /// `config` must have a `spatial` section. Hazard ratio functions are registered under their
    /// names.
    pub fn new(
        config: &Config,
        provider: Arc<dyn SurrogateProvider>,
        hazard_ratios: Vec<Arc<dyn HazardRatio>>,
    ) -> Result<Self> {
        let spatial = config
            .spatial
            .as_ref()
            .context("Spatial calculations need a [spatial] section in the model configuration")?;
        let eio = Eio::new(config)?;
        Self::from_eio(eio, spatial, provider, hazard_ratios)
    }

    /// Add spatial calculations to an existing economic model
    pub fn from_eio(
        eio: Eio,
        spatial: &SpatialConfig,
        provider: Arc<dyn SurrogateProvider>,
        hazard_ratios: Vec<Arc<dyn HazardRatio>>,
    ) -> Result<Self> {
        let eio = Arc::new(eio);
        let industry_sccs = read_scc_map(
            eio.loader(),
            &spatial.scc_map,
            &eio.layout().scc_map,
            &eio,
        )?;
        let descriptions = match &spatial.scc_descriptions {
            Some(file) => read_scc_descriptions(file)?,
            None => HashMap::new(),
        };
        let sccs = SccList::new(&industry_sccs, descriptions);
        info!("Model has {} SCCs", sccs.len());

        let spatial_refs = {
            let eio = Arc::clone(&eio);
            let scc_map = spatial.scc_map.clone();
            RequestCache::new(
                "spatial references",
                move |_ctx: &Context, year: &Year| {
                    nei_spatial_refs(eio.loader(), &scc_map, &eio.layout().scc_map, *year, &eio)
                        .map(Arc::new)
                },
                1,
                0,
                None,
            )
        };

        let factor_store = store_from_location(&spatial.spatial_cache)
            .with_context(|| format!("Opening factor cache {}", spatial.spatial_cache))?;
        let individual = individual_location(&spatial.spatial_cache);
        let result_store = store_from_location(&individual)
            .with_context(|| format!("Opening result cache {individual}"))?;
        if factor_store.is_some() {
            info!("Using persistent cache at {}", spatial.spatial_cache);
        }

        Ok(Self {
            inputs: FactorInputs {
                eio,
                provider,
                spatial_refs: Arc::new(spatial_refs),
            },
            sccs,
            hazard_ratios: hazard_ratios
                .into_iter()
                .map(|hr| (hr.name().to_string(), hr))
                .collect(),
            factor_store,
            result_store,
            memory_cache_size: spatial.memory_cache_size,
            factor_memory_cache_size: spatial.factor_memory_cache_size,
            emission_factors: OnceLock::new(),
            concentration_factors: OnceLock::new(),
            health_factors: OnceLock::new(),
            emissions: OnceLock::new(),
            concentrations: OnceLock::new(),
            health: OnceLock::new(),
        })
    }

    /// The underlying economic model
    pub fn eio(&self) -> &Eio {
        &self.inputs.eio
    }

    /// See [`Eio::economic_impacts`]
    pub fn economic_impacts(
        &self,
        demand: &Array1<f64>,
        year: Year,
        loc: Location,
    ) -> Result<Array1<f64>> {
        self.eio().economic_impacts(demand, year, loc)
    }

    /// See [`Eio::final_demand`]
    pub fn final_demand(
        &self,
        demand: FinalDemand,
        commodities: Option<&Mask>,
        year: Year,
        loc: Location,
    ) -> Result<Array1<f64>> {
        self.eio().final_demand(demand, commodities, year, loc)
    }

    /// See [`Eio::domestic_production`]
    pub fn domestic_production(&self, year: Year) -> Result<Array1<f64>> {
        self.eio().domestic_production(year)
    }

    /// The SCCs the model's industries emit under
    pub fn sccs(&self) -> &SccList {
        &self.sccs
    }

    /// A mask selecting only the SCC `code`
    pub fn scc_mask(&self, code: &str) -> Result<Mask> {
        Ok(self.sccs.mask(code)?)
    }

    /// The description of the SCC `code`
    pub fn scc_description(&self, code: &str) -> Result<&str> {
        Ok(self.sccs.description(code)?)
    }

    /// Requirements by SCC (rows) and commodity (columns) in `year`
    pub fn requirements_scc(&self, year: Year, loc: Location) -> Result<Array2<f64>> {
        Ok(self.sccs.requirements(self.eio().requirements(year, loc)?))
    }

    /// Economic activity attributed to each SCC caused by `demand`
    pub fn economic_impacts_scc(
        &self,
        demand: &Array1<f64>,
        year: Year,
        loc: Location,
    ) -> Result<Array1<f64>> {
        let by_industry = self.eio().economic_impacts(demand, year, loc)?;
        Ok(self.sccs.activity(&by_industry))
    }

    /// Domestic economic activity attributed to each SCC in `year`
    pub fn domestic_production_scc(&self, year: Year) -> Result<Array1<f64>> {
        Ok(self.sccs.activity(&self.domestic_production(year)?))
    }

    /// Read a workbook grouping the model's SCCs into aggregates
    pub fn scc_aggregator(&self, file: &Path) -> Result<SccAggregator> {
        let eio = self.eio();
        SccAggregator::new(eio.loader(), &eio.layout().scc_aggregates, file, &self.sccs)
    }

    /// Spatial references for each industry in `year`
    pub fn spatial_refs(&self, ctx: &Context, year: Year) -> Result<Arc<Vec<SpatialRef>>> {
        self.inputs
            .spatial_refs
            .new_request(ctx, year, year.to_string())
            .result()
    }

    /// Look up a registered hazard ratio function
    pub fn hazard_ratio(&self, name: &str) -> Result<Arc<dyn HazardRatio>> {
        Ok(self
            .hazard_ratios
            .get(name)
            .cloned()
            .ok_or_else(|| EioError::not_found("hazard ratio function", name))?)
    }

    fn factor_cache<R: 'static, F>(&self, name: &str, process: F) -> FactorCache<R>
    where
        F: Fn(&FactorInputs, &Context, &R) -> Result<Array2<f64>> + Send + Sync + 'static,
    {
        let inputs = self.inputs.clone();
        RequestCache::new(
            name,
            move |ctx: &Context, request: &R| process(&inputs, ctx, request).map(Arc::new),
            1,
            self.factor_memory_cache_size,
            self.factor_store.clone().map(Persistence::<Matrix>::new),
        )
    }

    fn result_cache<R: 'static, F>(&self, name: &str, process: F) -> ResultCache<R>
    where
        F: Fn(&Context, &R) -> Result<Array1<f64>> + Send + Sync + 'static,
    {
        RequestCache::new(
            name,
            move |ctx: &Context, request: &R| process(ctx, request).map(Arc::new),
            1,
            self.memory_cache_size,
            self.result_store.clone().map(Persistence::<Vector>::new),
        )
    }
}

/// Where results of individual requests are kept, relative to the factor cache location
fn individual_location(cache: &str) -> String {
    if cache.is_empty() {
        String::new()
    } else {
        format!("{}/{INDIVIDUAL_CACHE_DIR}", cache.trim_end_matches('/'))
    }
}
