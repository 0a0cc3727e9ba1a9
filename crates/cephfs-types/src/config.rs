//! Declarative mount configuration.
//!
//! A `MountConfig` describes how a handle is prepared before `mount`:
//! which client identity to allocate with, which ceph config file to read,
//! and which individual options to override. It is stored as RON:
//!
//! ```ron
//! (
//!     client_id: Some("admin"),
//!     config_file: Some("/etc/ceph/ceph.conf"),
//!     parse_env: Some("CEPH_ARGS"),
//!     options: {
//!         "client_mount_timeout": "30",
//!     },
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Errors that can occur when loading a mount configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// How to prepare a mount handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Client identity passed at allocation (`client.<id>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Explicit ceph config file. `None` reads the default search path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,

    /// Whether to read a ceph config file at all.
    #[serde(default = "default_true")]
    pub read_config: bool,

    /// Environment variable holding extra ceph arguments (e.g. `CEPH_ARGS`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_env: Option<String>,

    /// Individual options, applied in key order after the file is read.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            config_file: None,
            read_config: true,
            parse_env: None,
            options: BTreeMap::new(),
        }
    }
}

impl MountConfig {
    /// Create a config that reads the default ceph config file and nothing else.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client identity.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Read this file instead of the default search path.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self.read_config = true;
        self
    }

    /// Skip reading any ceph config file.
    pub fn without_config_file(mut self) -> Self {
        self.config_file = None;
        self.read_config = false;
        self
    }

    /// Parse extra arguments from the named environment variable.
    pub fn with_parse_env(mut self, var: impl Into<String>) -> Self {
        self.parse_env = Some(var.into());
        self
    }

    /// Override a single option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Parse a config from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Load a config from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_reads_default_file() {
        let config = MountConfig::default();
        assert!(config.read_config);
        assert!(config.config_file.is_none());
        assert!(config.client_id.is_none());
        assert!(config.options.is_empty());
    }

    #[test]
    fn test_empty_ron_uses_defaults() {
        let config = MountConfig::from_ron("()").unwrap();
        assert_eq!(config, MountConfig::default());
    }

    #[test]
    fn test_parse_full_ron() {
        let text = r#"(
            client_id: Some("admin"),
            config_file: Some("/etc/ceph/ceph.conf"),
            parse_env: Some("CEPH_ARGS"),
            options: {
                "client_mount_timeout": "30",
                "debug_client": "0",
            },
        )"#;
        let config = MountConfig::from_ron(text).unwrap();
        let expected = MountConfig::new()
            .with_client_id("admin")
            .with_config_file("/etc/ceph/ceph.conf")
            .with_parse_env("CEPH_ARGS")
            .with_option("client_mount_timeout", "30")
            .with_option("debug_client", "0");
        assert_eq!(config, expected);
    }

    #[test]
    fn test_without_config_file() {
        let config = MountConfig::from_ron("(read_config: false)").unwrap();
        assert!(!config.read_config);
        assert_eq!(config, MountConfig::new().without_config_file());
    }

    #[test]
    fn test_parse_error() {
        let err = MountConfig::from_ron("(client_id: 42)").unwrap_err();
        assert!(matches!(err, ConfigError::Ron(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"(client_id: Some("fsclient"))"#).unwrap();

        let config = MountConfig::load(file.path()).unwrap();
        assert_eq!(config.client_id.as_deref(), Some("fsclient"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.ron");
        let err = MountConfig::load(&missing).unwrap_err();
        match err {
            ConfigError::Io { path, .. } => assert_eq!(path, missing),
            other => panic!("expected Io, got {other:?}"),
        }
    }
}
