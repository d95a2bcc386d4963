//! Layered configuration loading: defaults, TOML file, environment.

use protocol_node::NodeConfig;
use serial_test::serial;
use std::env;
use std::fs;

fn clear_overrides() {
    env::remove_var("VALSET_MIN_FEE");
    env::remove_var("VALSET_IDENTITY__POWER_UNIT");
}

#[test]
#[serial]
fn test_defaults_without_file() {
    clear_overrides();
    let config = NodeConfig::load(None).unwrap();
    assert_eq!(config, NodeConfig::default());
}

#[test]
#[serial]
fn test_generated_file_round_trips() {
    clear_overrides();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config").join("node.toml");

    let written = NodeConfig::default().with_min_fee(3).with_snapshot_path(dir.path().join("state.bin"));
    written.save(&path).unwrap();

    let loaded = NodeConfig::load(Some(&path)).unwrap();
    assert_eq!(loaded, written);
}

#[test]
#[serial]
fn test_partial_file_keeps_defaults() {
    clear_overrides();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.toml");
    fs::write(&path, "min_fee = 7\n\n[identity]\nmaturity_blocks = 12\n").unwrap();

    let config = NodeConfig::load(Some(&path)).unwrap();
    assert_eq!(config.min_fee, 7);
    assert_eq!(config.identity.maturity_blocks, 12);
    assert_eq!(config.identity.staking_currency, "VT");
    assert_eq!(config.log_filter, "info");
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_overrides();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.toml");
    fs::write(&path, "min_fee = 7\n").unwrap();

    env::set_var("VALSET_MIN_FEE", "9");
    env::set_var("VALSET_IDENTITY__POWER_UNIT", "100");
    let config = NodeConfig::load(Some(&path));
    clear_overrides();

    let config = config.unwrap();
    assert_eq!(config.min_fee, 9);
    assert_eq!(config.identity.power_unit, 100);
}

#[test]
#[serial]
fn test_invalid_values_rejected() {
    clear_overrides();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.toml");
    fs::write(&path, "[identity]\npower_unit = 0\n").unwrap();
    assert!(NodeConfig::load(Some(&path)).is_err());

    assert!(NodeConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
}
