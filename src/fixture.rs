//! Fixtures for tests
use crate::cache::Context;
use crate::eio::Eio;
use crate::input::Config;
use crate::pollutant::{Emission, Pollutant};
use crate::spatial_ref::SpatialRef;
use crate::surrogate::{ConcentrationSurrogate, HazardRatio, HealthSurrogate, SurrogateProvider};
use anyhow::Result;
use ndarray::{Array1, array};
use rstest::fixture;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// The configuration file of the four-sector test model
pub const SMALL_CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/small/config.toml");

#[fixture]
pub fn small_config() -> Config {
    Config::load(Path::new(SMALL_CONFIG)).unwrap()
}

#[fixture]
pub fn small_eio(small_config: Config) -> Eio {
    Eio::new(&small_config).unwrap()
}

/// A surrogate provider whose impacts are simple multiples of the total SCC share of each source.
///
/// Every surrogate covers three grid cells.
#[derive(Default)]
pub struct FakeProvider {
    /// How many times a surrogate has been requested
    pub calls: AtomicUsize,
}

impl FakeProvider {
    fn base(&self, spatial_ref: &SpatialRef) -> f64 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        spatial_ref.scc_fractions.iter().sum()
    }

    fn concentrations(base: f64) -> ConcentrationSurrogate {
        ConcentrationSurrogate {
            pnh4: array![base, 0.0, 0.0],
            pno3: array![0.0, base, 0.0],
            pso4: array![0.0, 0.0, base],
            soa: array![0.5 * base, 0.0, 0.0],
            primary_pm25: array![0.0, 0.0, 2.0 * base],
        }
    }
}

impl SurrogateProvider for FakeProvider {
    fn emissions_surrogate(
        &self,
        _ctx: &Context,
        emission: Emission,
        spatial_ref: &SpatialRef,
    ) -> Result<Array1<f64>> {
        let base = self.base(spatial_ref);
        let scale = match emission {
            Emission::PM25 => 1.0,
            _ => 2.0,
        };
        Ok(array![base, 0.0, scale * base])
    }

    fn concentration_surrogate(
        &self,
        _ctx: &Context,
        spatial_ref: &SpatialRef,
    ) -> Result<ConcentrationSurrogate> {
        Ok(Self::concentrations(self.base(spatial_ref)))
    }

    fn health_surrogate(
        &self,
        _ctx: &Context,
        spatial_ref: &SpatialRef,
        hr: &dyn HazardRatio,
    ) -> Result<HealthSurrogate> {
        let conc = Self::concentrations(self.base(spatial_ref));
        let by_pollutant = Pollutant::iter()
            .map(|pol| {
                let deaths = conc.get(pol).mapv(|c| hr.hr(c) - 1.0);
                (pol.health_key().to_string(), deaths)
            })
            .collect();
        Ok(HashMap::from([("TotalPop".to_string(), by_pollutant)]))
    }
}

/// A hazard ratio which rises linearly with concentration
pub struct LinearHr;

impl HazardRatio for LinearHr {
    fn hr(&self, conc: f64) -> f64 {
        1.0 + 0.01 * conc
    }

    fn name(&self) -> &str {
        "Linear"
    }
}
