//! Building, signing and notarizing a py2app application.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::info;

use crate::{
    archive::create_zip,
    error::{EncrustError, Result},
    process::{ProcessRunner, Tool},
    scheduler::TaskScheduler,
    signing::{NotaryCredentials, SigningIdentity, signable_paths_in},
    validate::Validator,
};

/// Archive variant submitted to the notary service.
pub const SIGNED_VARIANT: &str = "signed";

/// Name and version as reported by `setup.py`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMetadata {
    /// Application name; also the `.app` bundle name.
    pub name: String,
    /// Application version.
    pub version: String,
}

impl ProjectMetadata {
    /// Parse the two-line output of `setup.py --name --version`.
    pub fn parse(output: &str) -> Result<Self> {
        let mut lines = output.trim().lines().map(str::trim);
        match (lines.next(), lines.next(), lines.next()) {
            (Some(name), Some(version), None)
                if !name.is_empty() && !version.is_empty() =>
            {
                Ok(Self {
                    name: name.to_string(),
                    version: version.to_string(),
                })
            }
            _ => Err(EncrustError::Metadata(output.to_string())),
        }
    }

    /// Ask `setup.py` in `project_dir`.
    pub async fn discover(
        runner: &dyn ProcessRunner,
        project_dir: &Path,
    ) -> Result<Self> {
        let result = runner
            .run(&Tool::project_metadata().current_dir(project_dir))
            .await?;
        Self::parse(&result.stdout_lossy())
    }
}

/// Drives the release of one application.
///
/// Every path is derived from the project directory and the name reported
/// by [`ProjectMetadata`]; nothing is cached between steps, so each step can
/// also be run on its own.
#[derive(Clone)]
pub struct AppBuilder {
    runner: Arc<dyn ProcessRunner>,
    project_dir: PathBuf,
    metadata: ProjectMetadata,
    signing: SigningIdentity,
    notary: NotaryCredentials,
    scheduler: TaskScheduler,
}

impl std::fmt::Debug for AppBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppBuilder")
            .field("project_dir", &self.project_dir)
            .field("metadata", &self.metadata)
            .field("signing", &self.signing)
            .field("notary", &self.notary)
            .finish_non_exhaustive()
    }
}

impl AppBuilder {
    /// Builder for the project in `project_dir`.
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        project_dir: impl Into<PathBuf>,
        metadata: ProjectMetadata,
        signing: SigningIdentity,
        notary: NotaryCredentials,
    ) -> Self {
        Self {
            runner,
            project_dir: project_dir.into(),
            metadata,
            signing,
            notary,
            scheduler: TaskScheduler::default(),
        }
    }

    /// Scheduler used to sign bundle members.
    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Name and version being released.
    pub fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    /// py2app's output directory.
    pub fn dist_dir(&self) -> PathBuf {
        self.project_dir.join("dist")
    }

    /// `dist/<name>.app`
    pub fn app_path(&self) -> PathBuf {
        self.dist_dir().join(format!("{}.app", self.metadata.name))
    }

    /// `dist/<name>.<variant>.app.zip`
    pub fn archive_path(&self, variant: &str) -> PathBuf {
        self.dist_dir()
            .join(format!("{}.{variant}.app.zip", self.metadata.name))
    }

    /// build → validate → sign → notarize.
    pub async fn release_workflow(&self) -> Result<()> {
        self.build().await?;
        self.validate_app().await?;
        self.sign_app().await?;
        self.notarize_app().await?;
        info!(
            name = %self.metadata.name,
            version = %self.metadata.version,
            "release complete"
        );
        Ok(())
    }

    /// `python setup.py py2app`
    pub async fn build(&self) -> Result<()> {
        info!(name = %self.metadata.name, "building with py2app");
        self.runner
            .run(&Tool::py2app().current_dir(&self.project_dir))
            .await?;
        Ok(())
    }

    /// Fail if the built bundle still holds thin binaries.
    pub async fn validate_app(&self) -> Result<()> {
        Validator::new(Arc::clone(&self.runner))
            .validate(vec![self.app_path()])
            .await
    }

    /// Sign every member that needs its own signature, then the bundle.
    pub async fn sign_app(&self) -> Result<()> {
        let app = self.app_path();
        let members = signable_paths_in(&app)?;
        info!(count = members.len(), "signing bundle members");

        let units = members.into_iter().map({
            let runner = Arc::clone(&self.runner);
            let signing = self.signing.clone();
            move |path| {
                let runner = Arc::clone(&runner);
                let signing = signing.clone();
                async move { signing.sign(runner.as_ref(), &path).await }
            }
        });
        self.scheduler.run(units).try_drain().await?;

        info!(app = %app.display(), "signing application");
        self.signing.sign(self.runner.as_ref(), &app).await
    }

    /// Zip the bundle as `variant`, returning the archive path.
    pub async fn archive_app(&self, variant: &str) -> Result<PathBuf> {
        let archive = self.archive_path(variant);
        create_zip(self.runner.as_ref(), &archive, &self.app_path()).await?;
        Ok(archive)
    }

    /// Archive the signed bundle, notarize it and staple the ticket.
    pub async fn notarize_app(&self) -> Result<()> {
        let archive = self.archive_app(SIGNED_VARIANT).await?;
        self.notary
            .notarize(self.runner.as_ref(), &archive, &self.app_path())
            .await
    }

    /// Store notary credentials in the keychain profile. Interactive.
    pub async fn authenticate(&self) -> Result<()> {
        self.notary.store(self.runner.as_ref()).await
    }
}
