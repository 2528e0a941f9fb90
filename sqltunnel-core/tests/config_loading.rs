//! `YamlConfigProvider` against real files on disk.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use sqltunnel_core::{ConfigError, ConfigProvider, EndpointSpec, YamlConfigProvider};

#[test]
fn loads_config_from_file() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(
        "proxies:\n  - instance: \"proj:us-central1:orders\"\n    port: 5432\n    secret: orders-pw\n",
    )
    .expect("write config");

    let cfg = YamlConfigProvider.load(file.path()).expect("load");
    assert_eq!(
        cfg.proxies,
        vec![EndpointSpec::new("proj:us-central1:orders", 5432, "orders-pw")]
    );
}

#[test]
fn missing_file_reports_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let missing = dir.child("absent.yaml");
    missing.assert(predicate::path::missing());

    let err = YamlConfigProvider.load(missing.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("absent.yaml"));
}

#[test]
fn malformed_yaml_reports_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str("proxies: [unclosed").expect("write config");

    let err = YamlConfigProvider.load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}
