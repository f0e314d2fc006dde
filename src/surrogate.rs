//! Capabilities supplied by the caller for turning emissions sources into spatial impacts.
//!
//! This crate does not model air quality itself. A [`SurrogateProvider`] takes a [`SpatialRef`]
//! and returns the emissions, concentrations or health impacts it causes in each grid cell.
use crate::cache::Context;
use crate::pollutant::{Emission, Pollutant};
use crate::spatial_ref::SpatialRef;
use anyhow::Result;
use ndarray::Array1;
use std::collections::HashMap;

/// An epidemiological hazard ratio function
pub trait HazardRatio: Send + Sync {
    /// The hazard ratio at concentration `conc`
    fn hr(&self, conc: f64) -> f64;

    /// A name which uniquely identifies this function
    fn name(&self) -> &str;
}

/// Concentrations of each component of fine particulate matter, by grid cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConcentrationSurrogate {
    /// Particulate ammonium
    pub pnh4: Array1<f64>,
    /// Particulate nitrate
    pub pno3: Array1<f64>,
    /// Particulate sulfate
    pub pso4: Array1<f64>,
    /// Secondary organic aerosol
    pub soa: Array1<f64>,
    /// Primary PM2.5
    pub primary_pm25: Array1<f64>,
}

impl ConcentrationSurrogate {
    /// Total fine particulate matter: the sum of the components
    pub fn total_pm25(&self) -> Array1<f64> {
        &self.pnh4 + &self.pno3 + &self.pso4 + &self.soa + &self.primary_pm25
    }

    /// Concentrations of `pollutant`
    pub fn get(&self, pollutant: Pollutant) -> Array1<f64> {
        match pollutant {
            Pollutant::PNH4 => self.pnh4.clone(),
            Pollutant::PNO3 => self.pno3.clone(),
            Pollutant::PSO4 => self.pso4.clone(),
            Pollutant::SOA => self.soa.clone(),
            Pollutant::PrimaryPM25 => self.primary_pm25.clone(),
            Pollutant::TotalPM25 => self.total_pm25(),
        }
    }
}

/// Health impacts by grid cell, keyed first by population name and then by
/// [`Pollutant::health_key`]
pub type HealthSurrogate = HashMap<String, HashMap<String, Array1<f64>>>;

/// Calculates the spatial impacts of a single emissions source
pub trait SurrogateProvider: Send + Sync {
    /// Emissions of `emission` by grid cell
    fn emissions_surrogate(
        &self,
        ctx: &Context,
        emission: Emission,
        spatial_ref: &SpatialRef,
    ) -> Result<Array1<f64>>;

    /// Pollutant concentrations by grid cell
    fn concentration_surrogate(
        &self,
        ctx: &Context,
        spatial_ref: &SpatialRef,
    ) -> Result<ConcentrationSurrogate>;

    /// Health impacts by grid cell, calculated using `hr`
    fn health_surrogate(
        &self,
        ctx: &Context,
        spatial_ref: &SpatialRef,
        hr: &dyn HazardRatio,
    ) -> Result<HealthSurrogate>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_total_pm25() {
        let conc = ConcentrationSurrogate {
            pnh4: array![1.0, 0.0],
            pno3: array![0.0, 1.0],
            pso4: array![0.5, 0.5],
            soa: array![0.25, 0.0],
            primary_pm25: array![0.0, 2.0],
        };
        assert_eq!(conc.total_pm25(), array![1.75, 3.5]);
        assert_eq!(conc.get(Pollutant::TotalPM25), conc.total_pm25());
        assert_eq!(conc.get(Pollutant::SOA), array![0.25, 0.0]);
    }
}
