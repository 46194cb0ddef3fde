//! Finding single-architecture Mach-O bundles under a set of roots.
//!
//! Every regular file (symlinks are skipped) is described with `file -b`;
//! descriptors starting with [`SINGLE_ARCHITECTURE_SIGNATURE`] are reported.
//! The `file` probes run through a [`TaskScheduler`] capped at
//! [`SCAN_PARALLELISM`].

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::{
    FutureExt, StreamExt,
    future::BoxFuture,
    stream::BoxStream,
};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::{
    error::{EncrustError, Result},
    process::{ProcessRunner, Tool},
    scheduler::TaskScheduler,
};

/// Concurrent `file` probes.
pub const SCAN_PARALLELISM: usize = 16;

/// `file -b` prefix of a thin bundle.
pub const SINGLE_ARCHITECTURE_SIGNATURE: &[u8] = b"Mach-O 64-bit bundle";
/// `file -b` prefix of a fat binary.
pub const UNIVERSAL_SIGNATURE: &[u8] = b"Mach-O universal binary with";

/// py2app launcher stubs ship per-architecture on purpose.
pub const EXEMPT_STUB_NAMES: [&str; 2] = ["main-x86_64", "main-arm64"];
/// Directory the launcher stubs live in.
pub const EXEMPT_STUB_DIR: &str = "prebuilt";

const PROGRESS_EVERY: u64 = 1000;

/// What `file -b` said about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFormat {
    /// A Mach-O bundle for one architecture.
    SingleArchitecture,
    /// A fat Mach-O binary.
    Universal,
    /// Anything else.
    Other,
}

/// Classify the output of `file -b`.
pub fn classify_descriptor(descriptor: &[u8]) -> BinaryFormat {
    if descriptor.starts_with(SINGLE_ARCHITECTURE_SIGNATURE) {
        BinaryFormat::SingleArchitecture
    } else if descriptor.starts_with(UNIVERSAL_SIGNATURE) {
        BinaryFormat::Universal
    } else {
        BinaryFormat::Other
    }
}

/// `prebuilt/main-x86_64` and `prebuilt/main-arm64`.
pub fn is_exempt_stub(path: &Path) -> bool {
    let named_stub = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| EXEMPT_STUB_NAMES.contains(&n));
    let in_prebuilt = path
        .parent()
        .and_then(Path::file_name)
        .is_some_and(|n| n == EXEMPT_STUB_DIR);
    named_stub && in_prebuilt
}

/// Progress of a scan. Purely informational.
#[derive(Debug, Default)]
pub struct ScanState {
    examined: AtomicU64,
}

impl ScanState {
    /// Fresh shared counter.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Regular files looked at so far.
    pub fn examined(&self) -> u64 {
        self.examined.load(Ordering::Relaxed)
    }

    fn record(&self) {
        let seen = self.examined.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % PROGRESS_EVERY == 0 {
            info!(examined = seen, "scanning for single-architecture binaries");
        }
    }
}

/// Walks directory trees and reports thin Mach-O bundles.
#[derive(Clone)]
pub struct BinaryScanner {
    runner: Arc<dyn ProcessRunner>,
    scheduler: TaskScheduler,
}

impl std::fmt::Debug for BinaryScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryScanner")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

type ProbeUnit = BoxFuture<'static, Result<Option<PathBuf>>>;

impl BinaryScanner {
    /// Scanner probing at most [`SCAN_PARALLELISM`] files at once.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            scheduler: TaskScheduler::new(SCAN_PARALLELISM),
        }
    }

    /// Override the probe scheduler.
    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Stream every non-exempt single-architecture bundle under `roots`.
    pub fn scan(
        &self,
        roots: Vec<PathBuf>,
        state: Arc<ScanState>,
    ) -> BoxStream<'static, Result<PathBuf>> {
        let runner = Arc::clone(&self.runner);
        let work = roots
            .into_iter()
            .flat_map(|root| WalkDir::new(root).follow_links(false))
            .filter_map(move |entry| -> Option<ProbeUnit> {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        let path = err
                            .path()
                            .map(Path::to_path_buf)
                            .unwrap_or_default();
                        let source = std::io::Error::other(err);
                        return Some(
                            async move { Err(EncrustError::io(path, source)) }
                                .boxed(),
                        );
                    }
                };
                if entry.path_is_symlink() || !entry.file_type().is_file() {
                    return None;
                }
                let path = entry.into_path();
                Some(probe(Arc::clone(&runner), path, Arc::clone(&state)).boxed())
            });

        self.scheduler
            .run(work)
            .filter_map(|outcome| async move {
                match outcome {
                    Ok(Some(path)) => Some(Ok(path)),
                    Ok(None) => None,
                    Err(err) => Some(Err(err)),
                }
            })
            .boxed()
    }

    /// Run a full scan and return the sorted violations.
    pub async fn collect(
        &self,
        roots: Vec<PathBuf>,
        state: Arc<ScanState>,
    ) -> Result<Vec<PathBuf>> {
        let mut stream = self.scan(roots, state);
        let mut found = Vec::new();
        let mut first_error = None;
        while let Some(outcome) = stream.next().await {
            match outcome {
                Ok(path) => found.push(path),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        found.sort();
        Ok(found)
    }
}

async fn probe(
    runner: Arc<dyn ProcessRunner>,
    path: PathBuf,
    state: Arc<ScanState>,
) -> Result<Option<PathBuf>> {
    state.record();
    if is_exempt_stub(&path) {
        debug!(path = %path.display(), "skipping prebuilt launcher stub");
        return Ok(None);
    }
    let result = runner.run(&Tool::describe_file(&path)).await?;
    match classify_descriptor(&result.stdout) {
        BinaryFormat::SingleArchitecture => Ok(Some(path)),
        BinaryFormat::Universal | BinaryFormat::Other => Ok(None),
    }
}
