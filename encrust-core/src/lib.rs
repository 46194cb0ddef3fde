//! # Encrust Core
//!
//! Universal2 packaging for Python applications on macOS.
//!
//! ## Overview
//!
//! - **Process execution**: [`process::Invocation`] describes a command line;
//!   [`process::ProcessRunner`] runs it, streaming output to a sink and
//!   capturing it for error reports.
//! - **Bounded fan-out**: [`scheduler::TaskScheduler`] runs independent
//!   async units with a concurrency cap and reports outcomes as a stream.
//! - **Wheel reconciliation**: [`reconcile::ArchitectureReconciler`] groups
//!   downloaded wheels by project and version and fuses arm64 + x86_64 pairs
//!   into universal2 wheels with `delocate-fuse`.
//! - **Binary validation**: [`scanner::BinaryScanner`] and
//!   [`validate::Validator`] find Mach-O bundles that carry a single
//!   architecture.
//! - **Release workflow**: [`build::AppBuilder`] builds, signs, archives and
//!   notarizes a py2app application.
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use encrust_core::{process::SystemRunner, validate::Validator};
//!
//! # async fn example() -> encrust_core::Result<()> {
//! let validator = Validator::new(Arc::new(SystemRunner::new()));
//! validator.validate(vec!["dist/App.app".into()]).await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod build;
pub mod error;
pub mod fatten;
pub mod process;
pub mod reconcile;
pub mod scanner;
pub mod scheduler;
pub mod signing;
pub mod validate;
pub mod wheel;

pub use build::{AppBuilder, ProjectMetadata};
pub use error::{EncrustError, Result};
pub use fatten::EnvironmentFattener;
pub use process::{
    Invocation, OutputEvent, OutputSink, ProcessResult, ProcessRunner,
    StreamSource, SystemRunner, Tool, TracingSink,
};
pub use reconcile::{ArchitectureReconciler, ReconcileLayout, ReconcileReport};
pub use scanner::{BinaryScanner, ScanState};
pub use scheduler::{FailurePolicy, TaskScheduler, TaskStream};
pub use signing::{NotaryCredentials, SigningIdentity};
pub use validate::Validator;
pub use wheel::{ArchitectureTag, PlatformTag, WheelFilename};
