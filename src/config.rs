// Build configuration, loadable from JSON with path-aware error messages.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingMode {
    #[default]
    Memory,
    Disk,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub staging: StagingMode,
    pub tmpdir: Option<PathBuf>,       // parent of the per-build staging dir (disk mode)
}

impl BuildConfig {
    pub fn from_json_str(src: &str) -> Result<Self, ConfigError> {
        from_str_with_path(src)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        from_slice_with_path(&bytes)
    }
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, ConfigError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(path_error)
}

pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ConfigError> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize::<_, T>(de).map_err(path_error)
}

fn path_error(err: serde_path_to_error::Error<serde_json::Error>) -> ConfigError {
    ConfigError::Invalid {
        path: err.path().to_string(),
        message: err.into_inner().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_memory() {
        let cfg = BuildConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, BuildConfig::default());
        assert_eq!(cfg.staging, StagingMode::Memory);
    }

    #[test]
    fn disk_with_tmpdir() {
        let cfg = BuildConfig::from_json_str(r#"{"staging": "disk", "tmpdir": "/var/tmp"}"#).unwrap();
        assert_eq!(cfg.staging, StagingMode::Disk);
        assert_eq!(cfg.tmpdir, Some(PathBuf::from("/var/tmp")));
    }

    #[test]
    fn errors_carry_json_path() {
        match BuildConfig::from_json_str(r#"{"staging": "tape"}"#) {
            Err(ConfigError::Invalid { path, .. }) => assert_eq!(path, "staging"),
            other => panic!("{other:?}"),
        }
        assert!(BuildConfig::from_json_str(r#"{"stage": "disk"}"#).is_err());
    }
}
