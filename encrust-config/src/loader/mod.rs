//! Locating and reading `~/.encrust.json`.

pub mod error;

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    models::EncrustConfig,
    validation::{self, ConfigWarnings},
};
use error::ConfigLoadError;

/// File name of the per-user configuration in the home directory.
pub const CONFIG_FILE_NAME: &str = ".encrust.json";

/// `$HOME/.encrust.json`
pub fn default_config_path() -> Result<PathBuf, ConfigLoadError> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME))
        .ok_or(ConfigLoadError::MissingHome)
}

/// Knobs for [`ConfigLoader`].
#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    /// Explicit file, overriding [`default_config_path`].
    pub config_path: Option<PathBuf>,
}

/// A loaded configuration with the warnings raised while validating it.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    /// Parsed values.
    pub config: EncrustConfig,
    /// File they came from.
    pub path: PathBuf,
    /// Guard-rail warnings, already logged.
    pub warnings: ConfigWarnings,
}

/// Reads and validates the configuration file.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    /// Loader for the default path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader with explicit options.
    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    /// Read `path` instead of the default.
    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    /// The file [`load`](Self::load) will read.
    pub fn resolve_path(&self) -> Result<PathBuf, ConfigLoadError> {
        match &self.options.config_path {
            Some(path) => Ok(path.clone()),
            None => default_config_path(),
        }
    }

    /// Read, parse and guard-rail the configuration.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let path = self.resolve_path()?;
        let config = read_config(&path)?;
        let warnings = validation::apply_guard_rails(&config)?;
        for warning in &warnings.items {
            match &warning.hint {
                Some(hint) => warn!(%hint, "{}", warning.message),
                None => warn!("{}", warning.message),
            }
        }
        debug!(path = %path.display(), "configuration loaded");
        Ok(ConfigLoad {
            config,
            path,
            warnings,
        })
    }
}

fn read_config(path: &Path) -> Result<EncrustConfig, ConfigLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigLoadError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigLoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
