//! Integration tests for the `production` command.
use eieio::cli::{OutputOpts, handle_production_command};
use eieio::output::{PRODUCTION_BY_GROUP_FILE_NAME, PRODUCTION_FILE_NAME};
use eieio::settings::Settings;
use eieio::year::Year;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

mod fake;
use fake::{SMALL_AGGREGATES, SMALL_CONFIG};

#[test]
fn test_handle_production_command() {
    unsafe { std::env::set_var("EIEIO_LOG_LEVEL", "off") };

    // Save results to non-existent directory to check that directory creation works
    let dir = tempdir().unwrap();
    let output_dir = dir.path().join("results");
    let opts = OutputOpts {
        output_dir: Some(output_dir.clone()),
        overwrite: false,
    };
    handle_production_command(
        Path::new(SMALL_CONFIG),
        Year(2007),
        None,
        &opts,
        Some(Settings::default()),
    )
    .unwrap();

    let production = fs::read_to_string(output_dir.join(PRODUCTION_FILE_NAME)).unwrap();
    let lines: Vec<_> = production.lines().collect();
    assert_eq!(lines[0], "year,industry,production");
    assert_eq!(lines.len(), 5);
    assert!(lines[1].starts_with("2007,Oilseed farming,"));
    assert!(output_dir.join("eieio_info.log").is_file());

    // Second time will fail because the folder is no longer empty
    assert!(
        handle_production_command(
            Path::new(SMALL_CONFIG),
            Year(2007),
            None,
            &opts,
            Some(Settings::default()),
        )
        .is_err()
    );
}

#[test]
fn test_handle_production_command_by_group() {
    unsafe { std::env::set_var("EIEIO_LOG_LEVEL", "off") };

    let dir = tempdir().unwrap();
    let opts = OutputOpts {
        output_dir: Some(dir.path().to_path_buf()),
        overwrite: false,
    };
    handle_production_command(
        Path::new(SMALL_CONFIG),
        Year(2007),
        Some(Path::new(SMALL_AGGREGATES)),
        &opts,
        Some(Settings::default()),
    )
    .unwrap();

    let by_group = fs::read_to_string(dir.path().join(PRODUCTION_BY_GROUP_FILE_NAME)).unwrap();
    let lines: Vec<_> = by_group.lines().collect();
    assert_eq!(lines[0], "year,group,abbreviation,production");
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("2007,Agriculture,Ag.,"));
    assert_eq!(lines[3], "2007,Services,Svc.,0.0");
}
