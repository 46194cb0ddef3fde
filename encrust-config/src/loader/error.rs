//! Configuration loading errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::validation::ConfigGuardRailError;

/// Why a configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// No explicit path and no `HOME` to default from.
    #[error("HOME is not set; pass an explicit configuration path")]
    MissingHome,
    /// The configuration file does not exist.
    #[error(
        "configuration file {} not found; run `encrustctl configure`",
        path.display()
    )]
    NotFound {
        /// Path that was tried.
        path: PathBuf,
    },
    /// The file exists but could not be read.
    #[error("failed to read configuration file {}", path.display())]
    Io {
        /// Configuration file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid configuration JSON.
    #[error("invalid configuration in {}", path.display())]
    Parse {
        /// Configuration file.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// The values failed a guard rail.
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
}
