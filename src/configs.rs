use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::generate_root_ca::RootSubject;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub root_ca: RootSubject,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/federation_ca.sock")
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Rocksdb,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/registry")
}

#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapConfig {
    /// Generate and install a root authority at startup when none is stored
    #[serde(default = "default_generate_root")]
    pub generate_root_if_missing: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            generate_root_if_missing: default_generate_root(),
        }
    }
}

fn default_generate_root() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config_str =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).context("Failed to parse config file")
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.root_ca, RootSubject::default());
        assert!(config.bootstrap.generate_root_if_missing);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            socket_path = "/run/ca.sock"

            [storage]
            backend = "rocksdb"

            [root_ca]
            organization = "Example Federation"
            country = "US"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.socket_path, PathBuf::from("/run/ca.sock"));
        assert_eq!(config.storage.backend, StorageBackend::Rocksdb);
        assert_eq!(config.storage.path, PathBuf::from("data/registry"));
        assert_eq!(config.root_ca.organization, "Example Federation");
        assert_eq!(config.root_ca.country, "US");
        assert_eq!(config.root_ca.common_name, RootSubject::default().common_name);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(AppConfig::from_toml("[storage]\nbackend = \"postgres\"").is_err());
    }
}
