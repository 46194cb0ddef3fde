//! Release archives.

use std::path::Path;

use tracing::info;

use crate::{
    error::{EncrustError, Result},
    process::{ProcessRunner, Tool},
};

/// Zip `directory` into `archive`, preserving symlinks.
///
/// An existing archive is removed first; `zip` would otherwise update it in
/// place and keep stale members.
pub async fn create_zip(
    runner: &dyn ProcessRunner,
    archive: &Path,
    directory: &Path,
) -> Result<()> {
    match tokio::fs::remove_file(archive).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(EncrustError::io(archive, err)),
    }
    info!(
        archive = %archive.display(),
        directory = %directory.display(),
        "archiving"
    );
    runner.run(&Tool::zip_directory(archive, directory)).await?;
    Ok(())
}
