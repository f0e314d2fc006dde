//! Spatial impacts of demand in the four-sector test model.
use eieio::cache::Context;
use eieio::demand::FinalDemand;
use eieio::input::Config;
use eieio::pollutant::{Emission, Pollutant};
use eieio::sector::Location;
use eieio::spatial::SpatialEio;
use eieio::year::Year;
use float_cmp::approx_eq;
use ndarray::Array1;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

mod fake;
use fake::{OnePercent, SccShareProvider, small_config};

const YEAR: Year = Year(2011);

fn spatial_eio(config: &Config) -> (SpatialEio, Arc<SccShareProvider>) {
    let provider = Arc::new(SccShareProvider::default());
    let spatial = SpatialEio::new(config, provider.clone(), vec![Arc::new(OnePercent)]).unwrap();
    (spatial, provider)
}

fn domestic_demand(spatial: &SpatialEio) -> Array1<f64> {
    spatial
        .final_demand(FinalDemand::All, None, YEAR, Location::Domestic)
        .unwrap()
}

fn total_pm25(spatial: &SpatialEio, demand: &Array1<f64>) -> Array1<f64> {
    spatial
        .concentrations(
            &Context::background(),
            demand,
            None,
            Pollutant::TotalPM25,
            YEAR,
            Location::Domestic,
        )
        .unwrap()
}

#[test]
fn scc_fractions_sum_to_one() {
    let (spatial, _) = spatial_eio(&small_config());
    let refs = spatial.spatial_refs(&Context::background(), YEAR).unwrap();
    let mut totals = HashMap::new();
    for spatial_ref in refs.iter() {
        assert_eq!(spatial_ref.emis_year, YEAR);
        for (scc, fraction) in spatial_ref.sccs.iter().zip(&spatial_ref.scc_fractions) {
            *totals.entry(scc.clone()).or_insert(0.0) += fraction;
        }
    }
    assert_eq!(totals.len(), 5);
    for (scc, total) in totals {
        assert!(approx_eq!(f64, total, 1.0, epsilon = 1e-10), "{scc}: {total}");
    }
}

#[test]
fn total_pm25_regression() {
    let (spatial, _) = spatial_eio(&small_config());
    let conc = total_pm25(&spatial, &domestic_demand(&spatial));
    assert!(approx_eq!(f64, conc.sum(), 27.5, epsilon = 1e-9), "{conc}");
}

#[test]
fn concurrent_requests_share_one_computation() {
    let (spatial, provider) = spatial_eio(&small_config());
    let demand = domestic_demand(&spatial);
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| total_pm25(&spatial, &demand)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(results.iter().all(|conc| conc == &results[0]));

    // One surrogate per industry
    assert_eq!(provider.calls(), 4);
}

#[test]
fn results_persist_between_instances() {
    let dir = tempdir().unwrap();
    let mut config = small_config();
    config.spatial.as_mut().unwrap().spatial_cache = dir.path().to_string_lossy().into_owned();

    let (first, first_provider) = spatial_eio(&config);
    let demand = domestic_demand(&first);
    let expected = total_pm25(&first, &demand);
    assert_eq!(first_provider.calls(), 4);
    assert!(dir.path().join("individual").is_dir());

    let (second, second_provider) = spatial_eio(&config);
    assert_eq!(total_pm25(&second, &demand), expected);
    let factors = second
        .concentration_factors(&Context::background(), Pollutant::TotalPM25, YEAR)
        .unwrap();
    assert_eq!(factors.dim(), (3, 4));
    assert_eq!(second_provider.calls(), 0);
}

#[test]
fn emissions_by_industry_add_up() {
    let (spatial, _) = spatial_eio(&small_config());
    let ctx = Context::background();
    let demand = domestic_demand(&spatial);
    let total = spatial
        .emissions(&ctx, &demand, None, Emission::PM25, YEAR, Location::Domestic)
        .unwrap();
    let matrix = spatial
        .emissions_matrix(&ctx, &demand, Emission::PM25, YEAR, Location::Domestic)
        .unwrap();
    for (cell, row) in matrix.rows().into_iter().enumerate() {
        assert!(approx_eq!(f64, row.sum(), total[cell], epsilon = 1e-9));
    }
}

#[test]
fn health_impacts() {
    let (spatial, _) = spatial_eio(&small_config());
    let health = spatial
        .health(
            &Context::background(),
            &domestic_demand(&spatial),
            None,
            Pollutant::TotalPM25,
            "TotalPop",
            YEAR,
            Location::Domestic,
            "OnePercent",
        )
        .unwrap();
    assert!(approx_eq!(f64, health.sum(), 0.275, epsilon = 1e-9));
}
