//! Spatially explicit pollutant concentrations.
use super::{
    FactorCache, FactorInputs, Matrix, ResultCache, SpatialEio, impact, impact_matrix, request_key,
};
use crate::cache::Context;
use crate::pollutant::Pollutant;
use crate::sector::{Location, Mask};
use crate::year::Year;
use anyhow::Result;
use ndarray::{Array1, Array2};
use std::sync::Arc;

pub(crate) type FactorRequest = (Pollutant, Year);

fn factor_key(pollutant: Pollutant, year: Year) -> String {
    format!("concentrationFactors_{pollutant}_{year}")
}

pub(crate) struct ConcentrationsRequest {
    demand: Array1<f64>,
    industries: Option<Mask>,
    pollutant: Pollutant,
    year: Year,
    loc: Location,
}

impl ConcentrationsRequest {
    fn key(&self) -> String {
        request_key(
            "conc",
            &self.demand,
            self.industries.as_ref(),
            &[&self.pollutant, &self.year, &self.loc],
        )
    }
}

impl SpatialEio {
    fn concentration_factor_cache(&self) -> &Arc<FactorCache<FactorRequest>> {
        self.concentration_factors.get_or_init(|| {
            Arc::new(self.factor_cache(
                "concentration factors",
                |inputs: &FactorInputs, ctx: &Context, &(pollutant, year): &FactorRequest| {
                    inputs.factors(ctx, year, |spatial_ref| {
                        let surrogate = inputs.provider.concentration_surrogate(ctx, spatial_ref)?;
                        Ok(surrogate.get(pollutant))
                    })
                },
            ))
        })
    }

    fn concentrations_cache(&self) -> &ResultCache<ConcentrationsRequest> {
        self.concentrations.get_or_init(|| {
            let factors = Arc::clone(self.concentration_factor_cache());
            let eio = Arc::clone(&self.inputs.eio);
            self.result_cache(
                "concentrations",
                move |ctx: &Context, request: &ConcentrationsRequest| {
                    let factors = factors
                        .new_request(
                            ctx,
                            (request.pollutant, request.year),
                            factor_key(request.pollutant, request.year),
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

    /// Concentrations per unit of production in each industry in `year`.
    ///
    /// Rows are grid cells and columns are industries.
    pub fn concentration_factors(
        &self,
        ctx: &Context,
        pollutant: Pollutant,
        year: Year,
    ) -> Result<Matrix> {
        self.concentration_factor_cache()
            .new_request(ctx, (pollutant, year), factor_key(pollutant, year))
            .result()
    }

    /// Concentrations in each grid cell caused by `demand`.
    ///
    /// If `industries` is given, only concentrations caused by those industries' emissions are
    /// included.
    pub fn concentrations(
        &self,
        ctx: &Context,
        demand: &Array1<f64>,
        industries: Option<&Mask>,
        pollutant: Pollutant,
        year: Year,
        loc: Location,
    ) -> Result<Array1<f64>> {
        let request = ConcentrationsRequest {
            demand: demand.clone(),
            industries: industries.cloned(),
            pollutant,
            year,
            loc,
        };
        let key = request.key();
        let concentrations = self
            .concentrations_cache()
            .new_request(ctx, request, key)
            .result()?;
        Ok(Arc::unwrap_or_clone(concentrations))
    }

    /// Concentrations caused by `demand` by grid cell (rows) and emitting industry (columns)
    pub fn concentration_matrix(
        &self,
        ctx: &Context,
        demand: &Array1<f64>,
        pollutant: Pollutant,
        year: Year,
        loc: Location,
    ) -> Result<Array2<f64>> {
        let factors = self.concentration_factors(ctx, pollutant, year)?;
        impact_matrix(self.eio(), &factors, demand, year, loc)
    }
}
