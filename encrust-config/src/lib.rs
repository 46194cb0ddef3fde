//! Configuration for encrust's signing and notarization steps.
//!
//! The configuration is a small JSON object, by default at
//! `$HOME/.encrust.json`. [`ConfigLoader`] reads and parses it, then runs
//! the guard rails in [`validation`]: hard errors stop the load, softer
//! problems come back as [`ConfigWarnings`] for the caller to print.

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoader, ConfigLoaderOptions, default_config_path,
    error::ConfigLoadError,
};
pub use models::{DEFAULT_ENTITLEMENTS, EncrustConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
