use pricerelay::config::Config;
use std::fs;

fn valid() -> Config {
    let mut cfg = Config::default();
    cfg.amber.api_token = "psk_123".to_string();
    cfg
}

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("pricerelay.yaml");

    let mut cfg = valid();
    cfg.mqtt.topic_prefix = "home/energy".to_string();
    cfg.tariffs.export.fixed_charge = 0.05;
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.mqtt.topic_prefix, "home/energy");
    assert_eq!(loaded.tariffs.export, cfg.tariffs.export);
    assert_eq!(loaded.logging.file, cfg.logging.file);
    assert!(loaded.validate().is_ok());
}

#[test]
fn config_validation_errors() {
    let mut cfg = valid();
    cfg.mqtt.host.clear();
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.mqtt.port = 0;
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.mqtt.topic_prefix = "/".to_string();
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.schedule.wait_granularity_seconds = 0;
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.amber.base_url = " ".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"mqtt: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}

#[test]
fn missing_file_is_io_error() {
    let err = Config::from_file("/nonexistent/pricerelay.yaml").unwrap_err();
    assert!(format!("{}", err).starts_with("I/O error"));
}
