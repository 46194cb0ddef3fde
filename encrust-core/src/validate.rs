//! Post-fattening and pre-signing architecture checks.

use std::{path::PathBuf, sync::Arc};

use tracing::{info, warn};

use crate::{
    error::{EncrustError, Result},
    process::ProcessRunner,
    scanner::{BinaryScanner, ScanState},
};

/// Confirms no single-architecture binaries are left under a set of roots.
#[derive(Debug, Clone)]
pub struct Validator {
    scanner: BinaryScanner,
}

impl Validator {
    /// Validator backed by a default [`BinaryScanner`].
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self::with_scanner(BinaryScanner::new(runner))
    }

    /// Validator around a preconfigured scanner.
    pub fn with_scanner(scanner: BinaryScanner) -> Self {
        Self { scanner }
    }

    /// Fails with [`EncrustError::ArchitectureStillInconsistent`] listing
    /// every offending path.
    pub async fn validate(&self, roots: Vec<PathBuf>) -> Result<()> {
        let state = ScanState::new();
        let offenders = self.scanner.collect(roots, Arc::clone(&state)).await?;
        if offenders.is_empty() {
            info!(
                examined = state.examined(),
                "all binaries are universal"
            );
            return Ok(());
        }
        for path in &offenders {
            warn!(path = %path.display(), "single-architecture binary");
        }
        Err(EncrustError::ArchitectureStillInconsistent { paths: offenders })
    }
}
