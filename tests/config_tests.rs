//! Tests for configuration loading and path resolution
//!
//! Paths are read from the environment once per process, so everything that
//! depends on UNIREP_HOME lives in a single serialized test.
mod common;

use common::TestEnvironment;
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::path::PathBuf;
use unirep::core::config::{load_or_default, save_config, Config};
use unirep::core::paths;
use unirep::UniRepError;

#[test]
#[serial]
fn test_default_location_under_unirep_home() {
    let env = TestEnvironment::new();
    let home = env.path("home");
    std::env::set_var("UNIREP_HOME", &home);
    std::env::remove_var("UNIREP_OUTPUT_DIR");

    assert_eq!(paths::unirep_home(), home);
    assert_eq!(paths::config_path(), home.join("config.toml"));
    assert_eq!(paths::outputs_dir(), home.join("outputs"));

    // No file yet: defaults
    let config = load_or_default(None).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.output_root(), home.join("outputs"));

    let mut custom = Config::default();
    custom.babble.length = 42;
    custom.output.root = Some(PathBuf::from("/data/unirep"));
    save_config(paths::config_path(), &custom).unwrap();

    let loaded = load_or_default(None).unwrap();
    assert_eq!(loaded.babble.length, 42);
    assert_eq!(loaded.run_dir("run1"), PathBuf::from("/data/unirep/run1"));
}

#[test]
#[serial]
fn test_partial_file_keeps_other_defaults() {
    let env = TestEnvironment::new();
    let path = env.write(
        "partial.toml",
        "[runtime]\nprogram = \"python\"\nargs = []\n\n[evotune]\nmax_splits = 3\n",
    );

    let config = load_or_default(Some(path.as_path())).unwrap();
    assert_eq!(config.runtime.program, "python");
    assert!(config.runtime.args.is_empty());
    assert_eq!(config.runtime.babble_script, PathBuf::from("scripts/babble.py"));
    assert_eq!(config.evotune.max_splits, 3);
    assert_eq!(config.babble.temperature, 1.0);
}

#[test]
#[serial]
fn test_unknown_value_type_is_a_config_error() {
    let env = TestEnvironment::new();
    let path = env.write("bad.toml", "[babble]\nlength = \"long\"\n");
    assert!(matches!(
        load_or_default(Some(path.as_path())),
        Err(UniRepError::Config(_))
    ));
}
