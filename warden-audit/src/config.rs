//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following
//! precedence (highest to lowest):
//! 1. Environment variables (prefix: WARDEN_AUDIT_)
//! 2. Current working directory: ./warden.toml
//! 3. Default values
//!
//! The host application normally constructs [`AuditConfig`] directly and
//! injects it into the service; `load()` exists for standalone deployments.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::event::{ProductMetadata, SCHEMA_VERSION};

/// Audit subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Data directory override. When unset the per-user XDG data directory
    /// (`~/.local/share/warden/`) is used.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Active store file name
    #[serde(default = "default_db_file")]
    pub db_file: String,

    /// Rotation threshold in bytes
    #[serde(default = "default_max_db_size")]
    pub max_db_size_bytes: u64,

    /// Number of rotated store files to retain
    #[serde(default = "default_max_rotated")]
    pub max_rotated_files: usize,

    /// Product name stamped into event metadata
    #[serde(default = "default_product")]
    pub product: String,

    /// Product version stamped into event metadata
    #[serde(default = "default_product_version")]
    pub product_version: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            db_file: default_db_file(),
            max_db_size_bytes: default_max_db_size(),
            max_rotated_files: default_max_rotated(),
            product: default_product(),
            product_version: default_product_version(),
        }
    }
}

impl AuditConfig {
    /// Load configuration from warden.toml and WARDEN_AUDIT_* environment
    /// variables, falling back to defaults.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(AuditConfig::default()))
            .merge(Toml::file("warden.toml"))
            .merge(Env::prefixed("WARDEN_AUDIT_").split("__"));

        Ok(figment.extract()?)
    }

    /// Resolve the active store file path, creating the data directory if
    /// absent.
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            std::fs::create_dir_all(dir)?;
            Ok(dir.join(&self.db_file))
        } else {
            let xdg_dirs = xdg::BaseDirectories::with_prefix("warden");
            Ok(xdg_dirs.place_data_file(&self.db_file)?)
        }
    }

    /// Product metadata injected into every event
    pub fn product_metadata(&self) -> ProductMetadata {
        ProductMetadata {
            version: SCHEMA_VERSION.to_string(),
            product: self.product.clone(),
            product_version: self.product_version.clone(),
        }
    }
}

fn default_db_file() -> String {
    "audit.db".to_string()
}

fn default_max_db_size() -> u64 {
    10 * 1024 * 1024
}

fn default_max_rotated() -> usize {
    5
}

fn default_product() -> String {
    "Warden".to_string()
}

fn default_product_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.db_file, "audit.db");
        assert_eq!(config.max_db_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.max_rotated_files, 5);
        assert_eq!(config.product, "Warden");
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_resolve_db_path_with_override() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("audit-data");
        let config = AuditConfig {
            data_dir: Some(nested.clone()),
            ..AuditConfig::default()
        };

        let path = config.resolve_db_path().unwrap();
        assert_eq!(path, nested.join("audit.db"));
        assert!(nested.exists());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = AuditConfig {
            data_dir: Some(PathBuf::from("/tmp/warden")),
            db_file: "events.db".into(),
            max_db_size_bytes: 1024,
            max_rotated_files: 2,
            product: "Warden".into(),
            product_version: "9.9.9".into(),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: AuditConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.db_file, "events.db");
        assert_eq!(back.max_rotated_files, 2);
    }

    #[test]
    fn test_product_metadata() {
        let meta = AuditConfig::default().product_metadata();
        assert_eq!(meta.product, "Warden");
        assert_eq!(meta.version, SCHEMA_VERSION);
    }
}
