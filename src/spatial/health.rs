//! Spatially explicit health impacts.
use super::{
    FactorCache, FactorInputs, Matrix, ResultCache, SpatialEio, impact, impact_matrix, request_key,
};
use crate::cache::Context;
use crate::error::EioError;
use crate::pollutant::Pollutant;
use crate::sector::{Location, Mask};
use crate::surrogate::{HazardRatio, HealthSurrogate};
use crate::year::Year;
use anyhow::Result;
use ndarray::{Array1, Array2};
use std::sync::Arc;

pub(crate) struct HealthFactorRequest {
    pollutant: Pollutant,
    population: String,
    year: Year,
    hr: Arc<dyn HazardRatio>,
}

impl HealthFactorRequest {
    fn key(&self) -> String {
        format!(
            "healthFactors_{}_{}_{}_{}",
            self.pollutant,
            self.population,
            self.year,
            self.hr.name()
        )
    }
}

pub(crate) struct HealthRequest {
    demand: Array1<f64>,
    industries: Option<Mask>,
    pollutant: Pollutant,
    population: String,
    year: Year,
    loc: Location,
    hr: Arc<dyn HazardRatio>,
}

impl HealthRequest {
    fn key(&self) -> String {
        request_key(
            "health",
            &self.demand,
            self.industries.as_ref(),
            &[
                &self.pollutant,
                &self.population,
                &self.year,
                &self.loc,
                &self.hr.name(),
            ],
        )
    }
}

/// Pick out the impacts of `pollutant` on `population` from a health surrogate
fn select(
    mut surrogate: HealthSurrogate,
    population: &str,
    pollutant: Pollutant,
) -> Result<Array1<f64>, EioError> {
    let mut by_pollutant = surrogate
        .remove(population)
        .ok_or_else(|| EioError::not_found("population", population))?;
    by_pollutant
        .remove(pollutant.health_key())
        .ok_or_else(|| EioError::not_found("pollutant", pollutant.health_key()))
}

impl SpatialEio {
    fn health_factor_cache(&self) -> &Arc<FactorCache<HealthFactorRequest>> {
        self.health_factors.get_or_init(|| {
            Arc::new(self.factor_cache(
                "health factors",
                |inputs: &FactorInputs, ctx: &Context, request: &HealthFactorRequest| {
                    inputs.factors(ctx, request.year, |spatial_ref| {
                        let surrogate = inputs.provider.health_surrogate(
                            ctx,
                            spatial_ref,
                            request.hr.as_ref(),
                        )?;
                        Ok(select(surrogate, &request.population, request.pollutant)?)
                    })
                },
            ))
        })
    }

    fn health_cache(&self) -> &ResultCache<HealthRequest> {
        self.health.get_or_init(|| {
            let factors = Arc::clone(self.health_factor_cache());
            let eio = Arc::clone(&self.inputs.eio);
            self.result_cache("health", move |ctx: &Context, request: &HealthRequest| {
                let factor_request = HealthFactorRequest {
                    pollutant: request.pollutant,
                    population: request.population.clone(),
                    year: request.year,
                    hr: Arc::clone(&request.hr),
                };
                let key = factor_request.key();
                let factors = factors.new_request(ctx, factor_request, key).result()?;
                impact(
                    &eio,
                    &factors,
                    &request.demand,
                    request.industries.as_ref(),
                    request.year,
                    request.loc,
                )
            })
        })
    }

    /// Health impacts on `population` per unit of production in each industry in `year`.
    ///
    /// `hr` is the name of a registered hazard ratio function. Rows are grid cells and columns
    /// are industries.
    pub fn health_factors(
        &self,
        ctx: &Context,
        pollutant: Pollutant,
        population: &str,
        year: Year,
        hr: &str,
    ) -> Result<Matrix> {
        let request = HealthFactorRequest {
            pollutant,
            population: population.to_string(),
            year,
            hr: self.hazard_ratio(hr)?,
        };
        let key = request.key();
        self.health_factor_cache()
            .new_request(ctx, request, key)
            .result()
    }

    /// Health impacts on `population` in each grid cell caused by `demand`.
    ///
    /// If `industries` is given, only impacts of emissions from those industries are included.
    #[allow(clippy::too_many_arguments)]
    pub fn health(
        &self,
        ctx: &Context,
        demand: &Array1<f64>,
        industries: Option<&Mask>,
        pollutant: Pollutant,
        population: &str,
        year: Year,
        loc: Location,
        hr: &str,
    ) -> Result<Array1<f64>> {
        let request = HealthRequest {
            demand: demand.clone(),
            industries: industries.cloned(),
            pollutant,
            population: population.to_string(),
            year,
            loc,
            hr: self.hazard_ratio(hr)?,
        };
        let key = request.key();
        let health = self.health_cache().new_request(ctx, request, key).result()?;
        Ok(Arc::unwrap_or_clone(health))
    }

    /// Health impacts of `demand` by grid cell (rows) and emitting industry (columns)
    #[allow(clippy::too_many_arguments)]
    pub fn health_matrix(
        &self,
        ctx: &Context,
        demand: &Array1<f64>,
        pollutant: Pollutant,
        population: &str,
        year: Year,
        loc: Location,
        hr: &str,
    ) -> Result<Array2<f64>> {
        let factors = self.health_factors(ctx, pollutant, population, year, hr)?;
        impact_matrix(self.eio(), &factors, demand, year, loc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use map_macro::hash_map;
    use ndarray::array;

    fn surrogate() -> HealthSurrogate {
        hash_map! {
            "TotalPop".to_string() => hash_map! { "pNH4".to_string() => array![1.0, 2.0] },
        }
    }

    #[test]
    fn test_select() {
        let values = select(surrogate(), "TotalPop", Pollutant::PNH4).unwrap();
        assert_eq!(values, array![1.0, 2.0]);
    }

    #[test]
    fn test_select_missing_population() {
        assert_eq!(
            select(surrogate(), "Asian", Pollutant::PNH4),
            Err(EioError::not_found("population", "Asian"))
        );
    }

    #[test]
    fn test_select_missing_pollutant() {
        assert_eq!(
            select(surrogate(), "TotalPop", Pollutant::TotalPM25),
            Err(EioError::not_found("pollutant", "TotalPM2_5"))
        );
    }
}
