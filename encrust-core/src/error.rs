//! Errors shared by every encrust workflow.

use std::path::PathBuf;

use thiserror::Error;

use crate::wheel::ArchitectureTag;

/// Everything that can stop a packaging step.
#[derive(Error, Debug)]
pub enum EncrustError {
    /// A tool could not be resolved on `PATH`.
    #[error("executable `{name}` not found on PATH")]
    ExecutableNotFound {
        /// Name that was looked up.
        name: String,
        /// Lookup failure from `which`.
        #[source]
        source: which::Error,
    },

    /// The child process could not be started.
    #[error("failed to spawn {program}")]
    Spawn {
        /// Resolved program path.
        program: String,
        /// OS error from the spawn.
        #[source]
        source: std::io::Error,
    },

    /// A tool exited unsuccessfully. Output is kept even for quiet runs.
    #[error(
        "{invocation} exited with {}\n{}",
        describe_exit_code(*code),
        captured_text(stdout, stderr)
    )]
    ProcessExit {
        /// Rendered command line.
        invocation: String,
        /// Exit status; `None` when a signal ended the process.
        code: Option<i32>,
        /// Everything the process wrote to stdout.
        stdout: Vec<u8>,
        /// Everything the process wrote to stderr.
        stderr: Vec<u8>,
    },

    /// A file in the download directory is not a wheel encrust understands.
    #[error("unrecognized architecture in {filename}: {reason}")]
    UnrecognizedArchitecture {
        /// Offending file name.
        filename: String,
        /// What did not parse.
        reason: String,
    },

    /// Two wheels claim the same (project, version, architecture) slot.
    #[error(
        "{project} {version} has two {architecture} artifacts: {} and {}",
        first.display(),
        second.display()
    )]
    DuplicateArtifact {
        /// Project name from the wheel filename.
        project: String,
        /// Project version.
        version: String,
        /// The contested slot.
        architecture: ArchitectureTag,
        /// Artifact seen first.
        first: PathBuf,
        /// Artifact that collided with it.
        second: PathBuf,
    },

    /// A thin wheel has no counterpart for the other architecture.
    #[error("no {missing} architecture for {project} {version}")]
    MissingArchitecture {
        /// Project name.
        project: String,
        /// Project version.
        version: String,
        /// The architecture that was not downloaded.
        missing: ArchitectureTag,
    },

    /// Validation found bundles that are still single-architecture.
    #[error(
        "{} single-architecture binaries remain: {}",
        paths.len(),
        join_paths(paths)
    )]
    ArchitectureStillInconsistent {
        /// Every offending bundle, sorted.
        paths: Vec<PathBuf>,
    },

    /// Filesystem failure at `path`.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path being read, written or moved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A scheduled unit panicked or was cancelled.
    #[error("scheduled task panicked: {0}")]
    TaskPanicked(String),

    /// `setup.py --name --version` printed something unexpected.
    #[error("unexpected project metadata output: {0:?}")]
    Metadata(String),
}

impl EncrustError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn describe_exit_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

fn captured_text(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(stderr));
    text
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias for encrust-core operations.
pub type Result<T> = std::result::Result<T, EncrustError>;
