//! Reading the model configuration file.
use crate::year::Year;
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub mod layout;
use layout::Layout;

/// The default number of request-level results kept in memory
const DEFAULT_MEMORY_CACHE_SIZE: usize = 100;

/// The default number of factor matrices kept in memory (they are large)
const DEFAULT_FACTOR_MEMORY_CACHE_SIZE: usize = 1;

/// Read and deserialise a TOML file.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Format an error message to include the file path
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Replace `$VAR` and `${VAR}` with the value of the environment variable `VAR`.
///
/// Unset variables expand to an empty string.
pub fn expand_env(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let name: String = if chars.peek() == Some(&'{') {
            chars.next();
            chars.by_ref().take_while(|&c| c != '}').collect()
        } else {
            chars
                .peeking_take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect()
        };
        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&env::var(&name).unwrap_or_default());
        }
    }
    out
}

/// Expand environment variables in every string in a TOML document
fn expand_env_in_value(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => *s = expand_env(s),
        toml::Value::Array(values) => values.iter_mut().for_each(expand_env_in_value),
        toml::Value::Table(table) => table.iter_mut().for_each(|(_, v)| expand_env_in_value(v)),
        _ => {}
    }
}

/// Configuration for the spatial part of the model
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpatialConfig {
    /// Workbook mapping industries to emission source classification codes
    pub scc_map: PathBuf,
    /// CSV file of SCC descriptions (SCC code, then description)
    #[serde(default)]
    pub scc_descriptions: Option<PathBuf>,
    /// Where to store computed factors: a directory, an `http(s)://` URL (read only) or a
    /// `gs://bucket/prefix` location. Empty to keep results in memory only.
    #[serde(default)]
    pub spatial_cache: String,
    /// How many emissions, concentration and health results to keep in memory
    #[serde(default = "default_memory_cache_size")]
    pub memory_cache_size: usize,
    /// How many factor matrices of each kind to keep in memory
    #[serde(default = "default_factor_memory_cache_size")]
    pub factor_memory_cache_size: usize,
}

fn default_memory_cache_size() -> usize {
    DEFAULT_MEMORY_CACHE_SIZE
}

fn default_factor_memory_cache_size() -> usize {
    DEFAULT_FACTOR_MEMORY_CACHE_SIZE
}

fn default_workbook_cache_size() -> usize {
    crate::table::DEFAULT_WORKBOOK_CACHE_SIZE
}

/// Model configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The years to load data for
    pub years: Vec<Year>,
    /// The only year for which detail-level tables exist
    pub detail_year: Year,
    /// Summary-level use table
    pub use_summary: PathBuf,
    /// Detail-level use table
    pub use_detail: PathBuf,
    /// Summary-level import matrix
    pub imports_summary: PathBuf,
    /// Detail-level import matrix
    pub imports_detail: PathBuf,
    /// Summary-level total requirements (industry x commodity)
    pub total_requirements_summary: PathBuf,
    /// Summary-level domestic requirements (industry x commodity)
    pub domestic_requirements_summary: PathBuf,
    /// Detail-level total requirements (industry x commodity)
    pub total_requirements_detail: PathBuf,
    /// Detail-level domestic requirements (industry x commodity)
    pub domestic_requirements_detail: PathBuf,
    /// Overrides for where data sits in each workbook
    #[serde(default)]
    pub layout: Layout,
    /// How many parsed workbooks to keep in memory
    #[serde(default = "default_workbook_cache_size")]
    pub workbook_cache_size: usize,
    /// Settings for spatial impact calculations
    #[serde(default)]
    pub spatial: Option<SpatialConfig>,
}

impl Config {
    /// Read a configuration file.
    ///
    /// Environment variables in string values are expanded and relative paths are taken to be
    /// relative to the folder containing the configuration file.
    pub fn load(file_path: &Path) -> Result<Self> {
        let mut value = toml::Value::Table(read_toml(file_path)?);
        expand_env_in_value(&mut value);
        let mut config: Config = value
            .try_into()
            .with_context(|| input_err_msg(file_path))?;

        let base_dir = file_path.parent().unwrap_or(Path::new(""));
        config.resolve_paths(base_dir);
        config
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(config)
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        for path in [
            &mut self.use_summary,
            &mut self.use_detail,
            &mut self.imports_summary,
            &mut self.imports_detail,
            &mut self.total_requirements_summary,
            &mut self.domestic_requirements_summary,
            &mut self.total_requirements_detail,
            &mut self.domestic_requirements_detail,
        ] {
            resolve_path(path, base_dir);
        }

        if let Some(spatial) = &mut self.spatial {
            resolve_path(&mut spatial.scc_map, base_dir);
            if let Some(path) = &mut spatial.scc_descriptions {
                resolve_path(path, base_dir);
            }
            let cache = &spatial.spatial_cache;
            if !cache.is_empty() && !cache.contains("://") && Path::new(cache).is_relative() {
                spatial.spatial_cache = base_dir.join(cache).to_string_lossy().into_owned();
            }
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.years.is_empty(), "No years specified");
        ensure!(self.years.iter().all_unique(), "Years must be unique");
        Ok(())
    }
}

fn resolve_path(path: &mut PathBuf, base_dir: &Path) {
    if path.is_relative() {
        *path = base_dir.join(&*path);
    }
}
