//! Configuration loading and path resolution.
//!
//! Precedence, lowest to highest: built-in defaults, the TOML config file,
//! `PANEBUS_*` environment variables, CLI flags (applied by the caller).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 7878;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Port the loopback listener binds.
    pub port: u16,
    /// Override for the database file path. Supports `~`.
    pub database: Option<String>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Resolved filesystem locations.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Resolve where the config file and data live. Everything defaults to
    /// one `panebus/` directory under the platform config root; `--config`
    /// may point at a file, or at a directory to use the standard file name
    /// inside it.
    pub fn discover(override_path: Option<PathBuf>) -> Result<Self> {
        let data_dir = default_dir()?;
        let config_file = match override_path {
            Some(path) => resolve_override(&path)?,
            None => data_dir.join("config.toml"),
        };

        Ok(Self {
            config_file,
            data_dir,
        })
    }

    /// The database file, honoring the config override.
    pub fn db_path(&self, config: &AppConfig) -> Result<PathBuf> {
        match &config.database {
            Some(raw) => expand_str_path(raw),
            None => Ok(self.data_dir.join("panebus.db")),
        }
    }

    /// The PID file lives next to the database.
    pub fn pid_file(&self) -> PathBuf {
        self.data_dir.join("panebus.pid")
    }
}

/// Load configuration: defaults, then the config file (if present), then
/// `PANEBUS_*` environment variables.
pub fn load_config(paths: &AppPaths) -> Result<AppConfig> {
    let defaults = Config::try_from(&AppConfig::default()).context("encoding default config")?;

    let config = Config::builder()
        .add_source(defaults)
        .add_source(
            File::from(paths.config_file.clone())
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix("PANEBUS"))
        .build()
        .context("building configuration")?;

    config
        .try_deserialize()
        .context("deserializing configuration")
}

/// Write the default config file, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }
    let rendered =
        toml::to_string_pretty(&AppConfig::default()).context("serializing default config")?;
    std::fs::write(path, rendered)
        .with_context(|| format!("writing default config to {}", path.display()))?;
    Ok(())
}

fn default_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("panebus"))
        .ok_or_else(|| anyhow!("could not determine the user config directory"))
}

fn resolve_override(path: &Path) -> Result<PathBuf> {
    let expanded = expand_path(path)?;
    Ok(if expanded.is_dir() {
        expanded.join("config.toml")
    } else {
        expanded
    })
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path
        .to_str()
        .ok_or_else(|| anyhow!("non-UTF-8 path: {path:?}"))?;
    expand_str_path(raw)
}

fn expand_str_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .map_err(|err| anyhow!("expanding path {raw}: {err}"))?
        .into_owned();
    Ok(PathBuf::from(expanded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_bind_the_well_known_port() {
        let config = AppConfig::default();
        assert_eq!(config.port, 7878);
        assert!(config.database.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let config_file = dir.path().join("config.toml");
        std::fs::write(&config_file, "port = 9911\ndatabase = \"/tmp/other.db\"\n").unwrap();

        let paths = AppPaths {
            config_file,
            data_dir: dir.path().to_path_buf(),
        };
        let config = load_config(&paths).unwrap();
        assert_eq!(config.port, 9911);
        assert_eq!(
            paths.db_path(&config).unwrap(),
            PathBuf::from("/tmp/other.db")
        );
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let paths = AppPaths {
            config_file: dir.path().join("absent.toml"),
            data_dir: dir.path().to_path_buf(),
        };
        let config = load_config(&paths).unwrap();
        assert_eq!(config.port, 7878);
        assert_eq!(paths.db_path(&config).unwrap(), dir.path().join("panebus.db"));
    }

    #[test]
    fn default_config_round_trips() {
        let dir = tempdir().unwrap();
        let config_file = dir.path().join("config.toml");
        write_default_config(&config_file).unwrap();

        let paths = AppPaths {
            config_file,
            data_dir: dir.path().to_path_buf(),
        };
        let config = load_config(&paths).unwrap();
        assert_eq!(config.port, AppConfig::default().port);
    }
}
