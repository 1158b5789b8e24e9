// Licensed under the Apache-2.0 license

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use z9664f_platform::hwaccess::{DEFAULT_FPGA_RESOURCE, DEFAULT_I2CGET};
use z9664f_platform::{CommandRunner, LinuxHwAccess};

/// Read by `z9664f-fwutil` when no `--config` is given. Optional.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/z9664f-fwutil.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Host-specific settings. The component catalog and the update tool command
/// lines are fixed and not part of this.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub i2cget: String,
    /// FPGA resource used when the FPGA cannot be found with `lspci`.
    pub fpga_resource_fallback: PathBuf,
    /// Parent of the scratch directories used to unpack firmware images.
    pub work_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            i2cget: DEFAULT_I2CGET.to_string(),
            fpga_resource_fallback: PathBuf::from(DEFAULT_FPGA_RESOURCE),
            work_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl PlatformConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`PlatformConfig::from_file`], but a missing file yields the defaults.
    pub fn from_optional_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::from_file(path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn hw_access<C: CommandRunner>(&self, runner: C) -> LinuxHwAccess<C> {
        LinuxHwAccess::new(runner)
            .with_i2cget(self.i2cget.clone())
            .with_fpga_fallback(self.fpga_resource_fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "work_dir = \"/var/tmp/fwutil\"").unwrap();
        writeln!(file, "log_level = \"debug\"").unwrap();

        let config = PlatformConfig::from_file(file.path()).unwrap();
        assert_eq!(config.work_dir, Some(PathBuf::from("/var/tmp/fwutil")));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.i2cget, DEFAULT_I2CGET);
        assert_eq!(
            config.fpga_resource_fallback,
            PathBuf::from(DEFAULT_FPGA_RESOURCE)
        );
    }

    #[test]
    fn test_missing_optional_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlatformConfig::from_optional_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, PlatformConfig::default());
        assert!(matches!(
            PlatformConfig::from_file(dir.path().join("absent.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "work_dir = [").unwrap();
        assert!(matches!(
            PlatformConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
