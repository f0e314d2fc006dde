//! Spatially explicit environmentally extended input-output life cycle assessment.
//!
//! An [`eio::Eio`] model links final demand for commodities to production in each industry. A
//! [`spatial::SpatialEio`] adds the emissions, pollutant concentrations and health impacts of that
//! production by grid cell, using an external [`surrogate::SurrogateProvider`].
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod aggregate;
pub mod cache;
pub mod cli;
pub mod crosswalk;
pub mod demand;
pub mod eio;
pub mod error;
pub mod id;
pub mod input;
pub mod log;
pub mod output;
pub mod pollutant;
pub mod requirements;
pub mod scc;
pub mod sector;
pub mod settings;
pub mod spatial;
pub mod spatial_ref;
pub mod surrogate;
pub mod table;
pub mod year;

#[cfg(test)]
mod fixture;

/// Get the config dir for the program
pub fn get_eieio_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        // Only likely to happen if $HOME is unset
        panic!("Could not get user's home directory");
    };
    config_dir.push("eieio");
    config_dir
}
