//! A surrogate provider for tests, with the four-sector test model.
// Each test file compiles this module separately and uses only some of it
#![allow(dead_code)]
use anyhow::Result;
use eieio::cache::Context;
use eieio::input::Config;
use eieio::pollutant::{Emission, Pollutant};
use eieio::spatial_ref::SpatialRef;
use eieio::surrogate::{ConcentrationSurrogate, HazardRatio, HealthSurrogate, SurrogateProvider};
use ndarray::{Array1, array};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

/// The configuration file of the four-sector test model
pub const SMALL_CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/small/config.toml");

/// The aggregation workbook of the four-sector test model
pub const SMALL_AGGREGATES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/small/aggregates");

/// Load the configuration of the four-sector test model
pub fn small_config() -> Config {
    Config::load(Path::new(SMALL_CONFIG)).unwrap()
}

/// Impacts proportional to the summed SCC shares of each source, over three grid cells
#[derive(Default)]
pub struct SccShareProvider {
    pub calls: AtomicUsize,
}

impl SccShareProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn concentrations(&self, spatial_ref: &SpatialRef) -> ConcentrationSurrogate {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let base: f64 = spatial_ref.scc_fractions.iter().sum();
        ConcentrationSurrogate {
            pnh4: array![base, 0.0, 0.0],
            pno3: array![0.0, base, 0.0],
            pso4: array![0.0, 0.0, base],
            soa: array![0.5 * base, 0.0, 0.0],
            primary_pm25: array![0.0, 0.0, 2.0 * base],
        }
    }
}

impl SurrogateProvider for SccShareProvider {
    fn emissions_surrogate(
        &self,
        _ctx: &Context,
        _emission: Emission,
        spatial_ref: &SpatialRef,
    ) -> Result<Array1<f64>> {
        Ok(self.concentrations(spatial_ref).primary_pm25)
    }

    fn concentration_surrogate(
        &self,
        _ctx: &Context,
        spatial_ref: &SpatialRef,
    ) -> Result<ConcentrationSurrogate> {
        Ok(self.concentrations(spatial_ref))
    }

    fn health_surrogate(
        &self,
        _ctx: &Context,
        spatial_ref: &SpatialRef,
        hr: &dyn HazardRatio,
    ) -> Result<HealthSurrogate> {
        let conc = self.concentrations(spatial_ref);
        let by_pollutant = Pollutant::iter()
            .map(|pol| {
                let deaths = conc.get(pol).mapv(|c| hr.hr(c) - 1.0);
                (pol.health_key().to_string(), deaths)
            })
            .collect();
        Ok(HashMap::from([("TotalPop".to_string(), by_pollutant)]))
    }
}

/// A hazard ratio of one plus 1% per unit concentration
pub struct OnePercent;

impl HazardRatio for OnePercent {
    fn hr(&self, conc: f64) -> f64 {
        1.0 + 0.01 * conc
    }

    fn name(&self) -> &str {
        "OnePercent"
    }
}
