use governor_broker::config::{Config, secrets::ExposeSecret};
use governor_broker::error::Error;

const CREDS: &str = r#"
endpoint: 10.0.0.1:17070
username: admin
password: hunter2
cacert: |
  -----BEGIN CERTIFICATE-----
  MIIB
  -----END CERTIFICATE-----
model: default
governor-charm: governor-charm
"#;

#[test]
fn config_loads_creds_file_from_storage_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("creds.yaml"), CREDS).unwrap();

    let config = Config::load(dir.path()).unwrap();
    assert_eq!(config.endpoint, "10.0.0.1:17070");
    assert_eq!(config.username, "admin");
    assert_eq!(config.password.expose_secret(), "hunter2");
    assert!(config.cacert.starts_with("-----BEGIN CERTIFICATE-----"));
    assert_eq!(config.model, "default");
    assert_eq!(config.governor_charm, "governor-charm");
    assert_eq!(config.store_path(), dir.path().join("gs_db"));
}

#[test]
fn config_debug_hides_password() {
    let config = Config::from_yaml(CREDS, "/tmp").unwrap();
    assert!(!format!("{config:?}").contains("hunter2"));
}

#[test]
fn config_fails_without_required_key() {
    let creds = CREDS.replace("governor-charm: governor-charm\n", "");
    let result = Config::from_yaml(&creds, "/tmp");
    assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("governor-charm")));
}

#[test]
fn config_fails_when_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(Config::load(dir.path()), Err(Error::Config(_))));
}
