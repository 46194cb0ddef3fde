//! Making every wheel in the active Python environment universal2.
//!
//! Only works on an Apple Silicon host: pip has to run once natively and
//! once under Rosetta to download both architectures.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::info;

use crate::{
    error::{EncrustError, Result},
    process::{ProcessRunner, Tool},
    reconcile::{ArchitectureReconciler, ReconcileLayout, ReconcileReport},
    scheduler::TaskScheduler,
    validate::Validator,
    wheel::ArchitectureTag,
};

/// Architectures pip downloads for, in order.
pub const DOWNLOAD_ARCHITECTURES: [ArchitectureTag; 2] =
    [ArchitectureTag::Arm64, ArchitectureTag::X86_64];

/// Default working directory for downloads, staging and fused output.
pub const DEFAULT_WHEEL_ROOT: &str = ".wheels";

/// Keep only plain `name==version` style lines from `pip freeze` output.
///
/// Editable installs, direct URLs and local paths cannot be re-downloaded
/// for another architecture.
pub fn filter_requirements(freeze: &str) -> String {
    freeze
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.contains(':') && !line.contains('/'))
        .filter(|line| !line.starts_with("-e"))
        .map(|line| format!("{line}\n"))
        .collect()
}

/// Existing directories on the interpreter's `sys.path`.
pub async fn python_search_paths(
    runner: &dyn ProcessRunner,
) -> Result<Vec<PathBuf>> {
    let result = runner.run(&Tool::python_search_paths()).await?;
    let mut paths = Vec::new();
    for line in result.stdout_lossy().lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let path = PathBuf::from(line);
        if tokio::fs::metadata(&path)
            .await
            .is_ok_and(|md| md.is_dir())
        {
            paths.push(path);
        }
    }
    Ok(paths)
}

/// Replaces thin wheels in the active environment with universal2 ones.
#[derive(Clone)]
pub struct EnvironmentFattener {
    runner: Arc<dyn ProcessRunner>,
    root: PathBuf,
    scheduler: TaskScheduler,
}

impl std::fmt::Debug for EnvironmentFattener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentFattener")
            .field("root", &self.root)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl EnvironmentFattener {
    /// Fattener working under `root`, usually [`DEFAULT_WHEEL_ROOT`].
    pub fn new(runner: Arc<dyn ProcessRunner>, root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            root: root.into(),
            scheduler: TaskScheduler::default(),
        }
    }

    /// Scheduler for the reconciliation step.
    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Directories under the root.
    pub fn layout(&self) -> ReconcileLayout {
        ReconcileLayout::under(&self.root)
    }

    /// Filtered `pip freeze` output.
    pub fn requirements_path(&self) -> PathBuf {
        self.root.join("requirements.txt")
    }

    /// freeze → download per architecture → reconcile → reinstall →
    /// validate.
    ///
    /// Wheels left under the root by an earlier run are discarded first.
    pub async fn fatten(&self) -> Result<ReconcileReport> {
        let layout = self.layout();
        layout.reset_dirs().await?;

        let requirements = self.write_requirements().await?;
        self.download(&requirements, &layout.download_dir).await?;

        let report =
            ArchitectureReconciler::new(Arc::clone(&self.runner), layout.clone())
                .with_scheduler(self.scheduler)
                .reconcile()
                .await?;

        info!(dir = %layout.output_dir.display(), "reinstalling fused wheels");
        self.runner
            .run(&Tool::pip_install_from(&layout.output_dir, &requirements))
            .await?;

        let search_paths = python_search_paths(self.runner.as_ref()).await?;
        Validator::new(Arc::clone(&self.runner))
            .validate(search_paths)
            .await?;
        Ok(report)
    }

    async fn write_requirements(&self) -> Result<PathBuf> {
        let freeze = self.runner.run(&Tool::pip_freeze()).await?;
        let requirements = filter_requirements(&freeze.stdout_lossy());
        let path = self.requirements_path();
        tokio::fs::write(&path, requirements)
            .await
            .map_err(|source| EncrustError::io(&path, source))?;
        Ok(path)
    }

    async fn download(&self, requirements: &Path, wheel_dir: &Path) -> Result<()> {
        let pip = self.runner.locate(Tool::Pip.executable())?;
        for architecture in DOWNLOAD_ARCHITECTURES {
            info!(%architecture, "downloading wheels");
            self.runner
                .run(&Tool::pip_wheel_for_arch(
                    architecture,
                    &pip,
                    requirements,
                    wheel_dir,
                ))
                .await?;
        }
        Ok(())
    }
}
