//! Code signing and notarization.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::{
    error::{EncrustError, Result},
    process::{ProcessRunner, Tool},
};

/// Extensions of bundle members that must carry their own signature.
pub const SIGNABLE_EXTENSIONS: [&str; 4] = ["so", "dylib", "framework", "a"];

/// Whether `path` has to be signed on its own before the enclosing bundle.
pub fn is_signable(path: &Path) -> bool {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SIGNABLE_EXTENSIONS.contains(&ext));
    if by_extension {
        return true;
    }
    // The embedded interpreter has no extension.
    path.file_name().is_some_and(|name| name == "python")
        && path
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|dir| dir == "MacOS")
}

/// Every signable file or framework directory inside `bundle`, in walk
/// order. Symlinks are not followed.
pub fn signable_paths_in(bundle: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(bundle).follow_links(false) {
        let entry = entry.map_err(|err| {
            let path = err
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| bundle.to_path_buf());
            EncrustError::io(path, std::io::Error::other(err))
        })?;
        if entry.path_is_symlink() {
            continue;
        }
        if is_signable(entry.path()) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// The identity and entitlements every `codesign` call uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningIdentity {
    /// Certificate SHA-1 as shown by `security find-identity`.
    pub identity: String,
    /// Entitlements plist passed to every `codesign`.
    pub entitlements: PathBuf,
}

impl SigningIdentity {
    /// Pair an identity with an entitlements file.
    pub fn new(
        identity: impl Into<String>,
        entitlements: impl Into<PathBuf>,
    ) -> Self {
        Self {
            identity: identity.into(),
            entitlements: entitlements.into(),
        }
    }

    /// Sign one file or bundle with the hardened runtime.
    pub async fn sign(
        &self,
        runner: &dyn ProcessRunner,
        target: &Path,
    ) -> Result<()> {
        debug!(target = %target.display(), "codesign");
        runner
            .run(&Tool::codesign(&self.identity, &self.entitlements, target))
            .await?;
        Ok(())
    }
}

/// Credentials for Apple's notary service, looked up by keychain profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotaryCredentials {
    /// Developer account email.
    pub apple_id: String,
    /// Ten-character team identifier.
    pub team_id: String,
    /// Keychain profile holding the app-specific password.
    pub profile: String,
}

impl NotaryCredentials {
    /// Submit `archive`, wait for the verdict, then staple the ticket to
    /// `application`.
    pub async fn notarize(
        &self,
        runner: &dyn ProcessRunner,
        archive: &Path,
        application: &Path,
    ) -> Result<()> {
        info!(archive = %archive.display(), "submitting for notarization");
        runner
            .run(&Tool::notarytool_submit(
                archive,
                &self.apple_id,
                &self.team_id,
                &self.profile,
            ))
            .await?;
        info!(application = %application.display(), "stapling");
        runner.run(&Tool::stapler_staple(application)).await?;
        Ok(())
    }

    /// Prompts on the terminal for the app-specific password.
    pub async fn store(&self, runner: &dyn ProcessRunner) -> Result<()> {
        runner
            .run(&Tool::notarytool_store_credentials(
                &self.profile,
                &self.apple_id,
                &self.team_id,
            ))
            .await?;
        Ok(())
    }
}
