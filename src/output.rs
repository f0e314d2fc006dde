//! Writing results to CSV files.
use crate::aggregate::AggregateGroups;
use crate::sector::SectorList;
use crate::spatial_ref::SpatialRef;
use crate::year::Year;
use anyhow::{Context, Result, ensure};
use ndarray::Array1;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "eieio_results";

/// The output file name for domestic production
pub const PRODUCTION_FILE_NAME: &str = "production.csv";

/// The output file name for production summed by aggregate group
pub const PRODUCTION_BY_GROUP_FILE_NAME: &str = "production_by_group.csv";

/// The output file name for spatial references
pub const SPATIAL_REFS_FILE_NAME: &str = "spatial_refs.csv";

/// Get the default output folder for the model configured in `config_path`.
///
/// The folder is named after the folder holding the configuration file.
pub fn get_output_dir(config_path: &Path) -> Result<PathBuf> {
    let config_path = config_path
        .canonicalize()
        .context("Could not resolve path to model configuration")?;
    let model_name = config_path
        .parent()
        .and_then(Path::file_name)
        .context("Model configuration cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model folder name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create an output folder.
///
/// An existing non-empty folder is only reused if `allow_overwrite` is true. Returns whether
/// existing files may be overwritten.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if let Ok(mut entries) = fs::read_dir(output_dir) {
        if entries.next().is_none() {
            return Ok(false);
        }
        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Use --overwrite to replace it."
        );
        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    fs::create_dir_all(output_dir)?;
    Ok(overwrite)
}

#[derive(Serialize, Debug, PartialEq)]
struct ProductionRow<'a> {
    year: Year,
    industry: &'a str,
    production: f64,
}

#[derive(Serialize, Debug, PartialEq)]
struct GroupProductionRow<'a> {
    year: Year,
    group: &'a str,
    abbreviation: &'a str,
    production: f64,
}

#[derive(Serialize, Debug, PartialEq)]
struct SpatialRefRow<'a> {
    industry: &'a str,
    scc: &'a str,
    fraction: f64,
    emis_year: Year,
}

/// Write domestic production by industry to `production.csv` in `output_dir`
pub fn write_production(
    output_dir: &Path,
    industries: &SectorList,
    year: Year,
    production: &Array1<f64>,
) -> Result<PathBuf> {
    let file_path = output_dir.join(PRODUCTION_FILE_NAME);
    let mut writer = csv::Writer::from_path(&file_path)?;
    for (industry, &production) in industries.names().iter().zip(production) {
        writer.serialize(ProductionRow {
            year,
            industry,
            production,
        })?;
    }
    writer.flush()?;
    Ok(file_path)
}

/// Write production for each aggregate group to `production_by_group.csv` in `output_dir`
pub fn write_production_by_group(
    output_dir: &Path,
    groups: &AggregateGroups,
    year: Year,
    totals: &[f64],
) -> Result<PathBuf> {
    let file_path = output_dir.join(PRODUCTION_BY_GROUP_FILE_NAME);
    let mut writer = csv::Writer::from_path(&file_path)?;
    for ((group, abbreviation), &production) in
        groups.names().zip(groups.abbreviations()).zip(totals)
    {
        writer.serialize(GroupProductionRow {
            year,
            group,
            abbreviation,
            production,
        })?;
    }
    writer.flush()?;
    Ok(file_path)
}

/// Write each industry's SCCs and SCC shares to `spatial_refs.csv` in `output_dir`
pub fn write_spatial_refs(
    output_dir: &Path,
    industries: &SectorList,
    refs: &[SpatialRef],
) -> Result<PathBuf> {
    let file_path = output_dir.join(SPATIAL_REFS_FILE_NAME);
    let mut writer = csv::Writer::from_path(&file_path)?;
    for (industry, spatial_ref) in industries.names().iter().zip(refs) {
        for (scc, &fraction) in spatial_ref.sccs.iter().zip(&spatial_ref.scc_fractions) {
            writer.serialize(SpatialRefRow {
                industry,
                scc: scc.as_str(),
                fraction,
                emis_year: spatial_ref.emis_year,
            })?;
        }
    }
    writer.flush()?;
    Ok(file_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial_ref::SourceType;
    use ndarray::array;
    use tempfile::tempdir;

    fn industries() -> SectorList {
        SectorList::new("industry", vec!["Farms".into(), "Mining".into()])
    }

    #[test]
    fn test_create_output_directory_new() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("results");
        assert!(!create_output_directory(&output_dir, false).unwrap());
        assert!(output_dir.is_dir());
    }

    #[test]
    fn test_create_output_directory_existing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("old.csv"), "x").unwrap();
        assert!(create_output_directory(dir.path(), false).is_err());
        assert!(create_output_directory(dir.path(), true).unwrap());
        assert!(!dir.path().join("old.csv").exists());
    }

    #[test]
    fn test_write_production() {
        let dir = tempdir().unwrap();
        let path =
            write_production(dir.path(), &industries(), Year(2011), &array![1.5, 2.0]).unwrap();
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "year,industry,production\n2011,Farms,1.5\n2011,Mining,2.0\n"
        );
    }

    #[test]
    fn test_write_production_by_group() {
        let dir = tempdir().unwrap();
        let groups = AggregateGroups::new(
            vec!["Agriculture".into(), "Mining".into()],
            vec!["Ag.".into(), "Min.".into()],
        );
        let path =
            write_production_by_group(dir.path(), &groups, Year(2007), &[3.0, 0.5]).unwrap();
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "year,group,abbreviation,production
             2007,Agriculture,Ag.,3.0
             2007,Mining,Min.,0.5
"
        );
    }

    #[test]
    fn test_write_spatial_refs() {
        let dir = tempdir().unwrap();
        let spatial_ref = |sccs: &[&str], scc_fractions| SpatialRef {
            sccs: sccs.iter().map(|&scc| scc.into()).collect(),
            scc_fractions,
            emis_year: Year(2011),
            source_type: SourceType::Stationary,
            no_normalization: true,
        };
        let refs = [
            spatial_ref(&["2801000003"], vec![0.25]),
            spatial_ref(&["2801000003", "2310000000"], vec![0.75, 1.0]),
        ];
        let path = write_spatial_refs(dir.path(), &industries(), &refs).unwrap();
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "industry,scc,fraction,emis_year\n\
             Farms,2801000003,0.25,2011\n\
             Mining,2801000003,0.75,2011\n\
             Mining,2310000000,1.0,2011\n"
        );
    }
}
