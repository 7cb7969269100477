//! Controller configuration.
//!
//! # Storage layout
//!
//! ```text
//! <config_dir>/buteo/controller.yaml
//! ```
//!
//! Every field has a default, so an empty file, a partial file, or no file
//! at all yields a usable configuration pointed at the stock daemon.
//!
//! # API pattern
//!
//! - `fn_at(config_dir: &Path, …)`: explicit directory; used in tests
//! - `fn(…)`: derives the directory from `dirs::config_dir()`

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_SERVICE_NAME: &str = "com.meego.msyncd";
pub const DEFAULT_OBJECT_PATH: &str = "/synchronizer";
pub const DEFAULT_INTERFACE: &str = "com.meego.msyncd";
pub const CONFIG_FILE: &str = "controller.yaml";

/// Which message bus the daemon lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    Session,
    System,
}

/// Key/value filter passed to the daemon when enumerating profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFilter {
    pub key: String,
    pub value: String,
}

impl Default for ProfileFilter {
    /// Only profiles that depend on online accounts.
    fn default() -> Self {
        Self {
            key: "use_accounts".to_string(),
            value: "true".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub bus: BusKind,
    pub service_name: String,
    pub object_path: String,
    pub interface: String,
    pub profile_filter: ProfileFilter,
    /// Restrict `visible_sync_profiles` to enabled profiles.
    pub visible_enabled_only: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bus: BusKind::default(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            object_path: DEFAULT_OBJECT_PATH.to_string(),
            interface: DEFAULT_INTERFACE.to_string(),
            profile_filter: ProfileFilter::default(),
            visible_enabled_only: false,
        }
    }
}

impl ControllerConfig {
    /// Load a config file. A missing file is an error here.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit` if given, else `<config_dir>/buteo/controller.yaml`
    /// when it exists, else defaults.
    pub fn load_or_default_at(
        config_dir: &Path,
        explicit: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let path = default_config_path_at(config_dir);
        match Self::load(&path) {
            Err(ConfigError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// [`Self::load_or_default_at`] rooted at `dirs::config_dir()`.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        Self::load_or_default_at(&config_dir()?, None)
    }
}

/// `<config_dir>/buteo/controller.yaml`
pub fn default_config_path_at(config_dir: &Path) -> PathBuf {
    config_dir.join("buteo").join(CONFIG_FILE)
}

fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_default_file_yields_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let config = ControllerConfig::load_or_default_at(dir.path(), None).expect("load");
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.service_name, "com.meego.msyncd");
        assert_eq!(config.profile_filter.key, "use_accounts");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let explicit = dir.path().join("nope.yaml");
        let err = ControllerConfig::load_or_default_at(dir.path(), Some(explicit.as_path()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let path = default_config_path_at(dir.path());
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "bus: system\nvisible_enabled_only: true\n").expect("write");

        let config = ControllerConfig::load_or_default_at(dir.path(), None).expect("load");
        assert_eq!(config.bus, BusKind::System);
        assert!(config.visible_enabled_only);
        assert_eq!(config.object_path, DEFAULT_OBJECT_PATH);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("empty.yaml");
        fs::write(&path, "\n").expect("write");
        assert_eq!(
            ControllerConfig::load(&path).expect("load"),
            ControllerConfig::default()
        );
    }
}
