//! Spatially explicit emissions.
use super::{
    FactorCache, FactorInputs, Matrix, ResultCache, SpatialEio, impact, impact_matrix, request_key,
};
use crate::cache::Context;
use crate::pollutant::Emission;
use crate::sector::{Location, Mask};
use crate::year::Year;
use anyhow::Result;
use ndarray::{Array1, Array2};
use std::sync::Arc;

pub(crate) type FactorRequest = (Emission, Year);

fn factor_key(emission: Emission, year: Year) -> String {
    format!("emissionFactors_{emission}_{year}")
}

pub(crate) struct EmissionsRequest {
    demand: Array1<f64>,
    industries: Option<Mask>,
    emission: Emission,
    year: Year,
    loc: Location,
}

impl EmissionsRequest {
    fn key(&self) -> String {
        request_key(
            "emis",
            &self.demand,
            self.industries.as_ref(),
            &[&self.emission, &self.year, &self.loc],
        )
    }
}

impl SpatialEio {
    fn emission_factor_cache(&self) -> &Arc<FactorCache<FactorRequest>> {
        self.emission_factors.get_or_init(|| {
            Arc::new(self.factor_cache(
                "emission factors",
                |inputs: &FactorInputs, ctx: &Context, &(emission, year): &FactorRequest| {
                    inputs.factors(ctx, year, |spatial_ref| {
                        inputs
                            .provider
                            .emissions_surrogate(ctx, emission, spatial_ref)
                    })
                },
            ))
        })
    }

    fn emissions_cache(&self) -> &ResultCache<EmissionsRequest> {
        self.emissions.get_or_init(|| {
            let factors = Arc::clone(self.emission_factor_cache());
            let eio = Arc::clone(&self.inputs.eio);
            self.result_cache(
                "emissions",
                move |ctx: &Context, request: &EmissionsRequest| {
                    let factors = factors
                        .new_request(
                            ctx,
                            (request.emission, request.year),
                            factor_key(request.emission, request.year),
                        )
                        .result()?;
                    impact(
                        &eio,
                        &factors,
                        &request.demand,
                        request.industries.as_ref(),
                        request.year,
                        request.loc,
                    )
                },
            )
        })
    }

    /// Emissions per unit of production in each industry in `year`.
    ///
    /// Rows are grid cells and columns are industries.
    pub fn emission_factors(&self, ctx: &Context, emission: Emission, year: Year) -> Result<Matrix> {
        self.emission_factor_cache()
            .new_request(ctx, (emission, year), factor_key(emission, year))
            .result()
    }

    /// Emissions in each grid cell caused by `demand`.
    ///
    /// If `industries` is given, only emissions from those industries are included.
    pub fn emissions(
        &self,
        ctx: &Context,
        demand: &Array1<f64>,
        industries: Option<&Mask>,
        emission: Emission,
        year: Year,
        loc: Location,
    ) -> Result<Array1<f64>> {
        let request = EmissionsRequest {
            demand: demand.clone(),
            industries: industries.cloned(),
            emission,
            year,
            loc,
        };
        let key = request.key();
        let emissions = self.emissions_cache().new_request(ctx, request, key).result()?;
        Ok(Arc::unwrap_or_clone(emissions))
    }

    /// Emissions caused by `demand` by grid cell (rows) and emitting industry (columns)
    pub fn emissions_matrix(
        &self,
        ctx: &Context,
        demand: &Array1<f64>,
        emission: Emission,
        year: Year,
        loc: Location,
    ) -> Result<Array2<f64>> {
        let factors = self.emission_factors(ctx, emission, year)?;
        impact_matrix(self.eio(), &factors, demand, year, loc)
    }
}
