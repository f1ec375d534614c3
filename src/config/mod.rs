//! Typed configuration from the broker's credentials file.
//!
//! Loads once at startup, fails fast if required keys are missing.
//! The password is wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File name of the credentials file inside the storage directory.
pub const CREDS_FILE: &str = "creds.yaml";

/// File name of the event store inside the storage directory.
pub const STORE_FILE: &str = "gs_db";

#[derive(Debug)]
pub struct Config {
    pub endpoint: String,
    pub username: String,
    pub password: SecretString,
    pub cacert: String,
    pub model: String,
    pub governor_charm: String,
    pub storage_path: PathBuf,
    pub otel_endpoint: Option<String>,
}

/// On-disk shape of `creds.yaml`.
#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CredsFile {
    endpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    cacert: Option<String>,
    model: Option<String>,
    governor_charm: Option<String>,
}

impl Config {
    /// Load configuration from `<dir>/creds.yaml`.
    ///
    /// The directory doubles as the storage path holding the event store.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let path = dir.join(CREDS_FILE);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&content, dir)
    }

    /// Parse configuration from YAML text, with `storage_path` as the store directory.
    pub fn from_yaml(content: &str, storage_path: impl Into<PathBuf>) -> Result<Self> {
        let creds: CredsFile = serde_yaml::from_str(content)?;

        Ok(Self {
            endpoint: required(creds.endpoint, "endpoint")?,
            username: required(creds.username, "username")?,
            password: SecretString::from(required(creds.password, "password")?),
            cacert: required(creds.cacert, "cacert")?,
            model: required(creds.model, "model")?,
            governor_charm: required(creds.governor_charm, "governor-charm")?,
            storage_path: storage_path.into(),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
        })
    }

    /// Path of the durable event store.
    pub fn store_path(&self) -> PathBuf {
        self.storage_path.join(STORE_FILE)
    }
}

fn required(value: Option<String>, key: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("required key {key} is missing from {CREDS_FILE}")))
}
