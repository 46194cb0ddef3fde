//! Turning a directory of per-architecture wheels into universal2 wheels.
//!
//! One pip download per architecture leaves `arm64` and `x86_64` copies of
//! every binary wheel side by side. The reconciler parses each filename,
//! groups artifacts by (project, version), plans every group up front, then
//! resolves the groups concurrently: pure-Python and universal2 wheels are
//! moved as-is, and arm64/x86_64 pairs are fused with `delocate-fuse`.
//! Planning fails before anything on disk is touched.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info};

use crate::{
    error::{EncrustError, Result},
    process::{ProcessRunner, Tool},
    scheduler::{DEFAULT_PARALLELISM, TaskScheduler},
    wheel::{ArchitectureTag, WheelFilename},
};

/// A downloaded wheel and what it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelArtifact {
    /// Parsed filename.
    pub filename: WheelFilename,
    /// Architecture derived from the filename.
    pub architecture: ArchitectureTag,
    /// Location in the download directory.
    pub path: PathBuf,
}

impl WheelArtifact {
    /// Classify the wheel at `path` by its filename.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| EncrustError::UnrecognizedArchitecture {
                filename: path.display().to_string(),
                reason: "file name is not valid UTF-8".to_string(),
            })?;
        let filename = WheelFilename::parse(name)?;
        let architecture = filename.architecture()?;
        Ok(Self {
            filename,
            architecture,
            path,
        })
    }
}

/// (project, version) shared by the members of a [`FusionGroup`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    /// Project name.
    pub project: String,
    /// Project version.
    pub version: String,
}

/// Every artifact sharing one (project, version).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FusionGroup {
    /// Thin Apple Silicon wheel.
    pub arm64: Option<PathBuf>,
    /// Thin Intel wheel.
    pub x86_64: Option<PathBuf>,
    /// Already-fat wheel.
    pub universal2: Option<PathBuf>,
    /// `none-any` wheel.
    pub pure_python: Option<PathBuf>,
}

/// What resolving a group will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupPlan {
    /// Move these files to the output directory unchanged.
    Move(Vec<PathBuf>),
    /// Move `moves` unchanged and fuse the pair.
    Fuse {
        /// Members moved unchanged.
        moves: Vec<PathBuf>,
        /// Left input of `delocate-fuse`.
        arm64: PathBuf,
        /// Right input of `delocate-fuse`.
        x86_64: PathBuf,
    },
}

impl FusionGroup {
    fn slot(&mut self, architecture: ArchitectureTag) -> &mut Option<PathBuf> {
        match architecture {
            ArchitectureTag::Arm64 => &mut self.arm64,
            ArchitectureTag::X86_64 => &mut self.x86_64,
            ArchitectureTag::Universal2 => &mut self.universal2,
            ArchitectureTag::PurePython => &mut self.pure_python,
        }
    }

    /// Every present member.
    pub fn members(&self) -> impl Iterator<Item = &PathBuf> {
        [&self.arm64, &self.x86_64, &self.universal2, &self.pure_python]
            .into_iter()
            .flatten()
    }

    /// Whether the group can be resolved: a universal2 member, pure-Python
    /// only, or both halves of an arm64/x86_64 pair.
    pub fn is_satisfied(&self) -> bool {
        self.universal2.is_some()
            || (self.pure_python.is_some()
                && self.arm64.is_none()
                && self.x86_64.is_none())
            || (self.arm64.is_some() && self.x86_64.is_some())
    }

    /// Decide how to resolve this group, or explain why it cannot be.
    pub fn plan(&self, key: &GroupKey) -> Result<GroupPlan> {
        let moves: Vec<PathBuf> = [&self.universal2, &self.pure_python]
            .into_iter()
            .flatten()
            .cloned()
            .collect();

        if self.universal2.is_some()
            || (self.arm64.is_none() && self.x86_64.is_none())
        {
            return Ok(GroupPlan::Move(moves));
        }

        let missing_arch = |missing| EncrustError::MissingArchitecture {
            project: key.project.clone(),
            version: key.version.clone(),
            missing,
        };
        let arm64 = self
            .arm64
            .clone()
            .ok_or_else(|| missing_arch(ArchitectureTag::Arm64))?;
        let x86_64 = self
            .x86_64
            .clone()
            .ok_or_else(|| missing_arch(ArchitectureTag::X86_64))?;
        Ok(GroupPlan::Fuse {
            moves,
            arm64,
            x86_64,
        })
    }
}

/// Partition artifacts into groups. Deterministic: keys are sorted.
pub fn group_artifacts(
    artifacts: impl IntoIterator<Item = WheelArtifact>,
) -> Result<BTreeMap<GroupKey, FusionGroup>> {
    let mut groups: BTreeMap<GroupKey, FusionGroup> = BTreeMap::new();
    for artifact in artifacts {
        let key = GroupKey {
            project: artifact.filename.project.clone(),
            version: artifact.filename.version.clone(),
        };
        let slot = groups
            .entry(key.clone())
            .or_default()
            .slot(artifact.architecture);
        if let Some(first) = slot.as_ref() {
            return Err(EncrustError::DuplicateArtifact {
                project: key.project,
                version: key.version,
                architecture: artifact.architecture,
                first: first.clone(),
                second: artifact.path,
            });
        }
        *slot = Some(artifact.path);
    }
    Ok(groups)
}

/// Where the reconciler reads, stages and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileLayout {
    /// Where pip writes both architectures.
    pub download_dir: PathBuf,
    /// `delocate-fuse` output before the universal2 rename.
    pub staging_dir: PathBuf,
    /// Universal2 and pure-Python wheels, ready to install.
    pub output_dir: PathBuf,
}

impl ReconcileLayout {
    /// `<root>/downloaded`, `<root>/tmp`, `<root>/fused`.
    pub fn under(root: &Path) -> Self {
        Self {
            download_dir: root.join("downloaded"),
            staging_dir: root.join("tmp"),
            output_dir: root.join("fused"),
        }
    }

    /// Create all three directories, keeping their contents.
    pub async fn create_dirs(&self) -> Result<()> {
        for dir in [&self.download_dir, &self.staging_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| EncrustError::io(dir, source))?;
        }
        Ok(())
    }

    /// Empty all three directories, creating them if needed. A pass must
    /// only see wheels downloaded for it.
    pub async fn reset_dirs(&self) -> Result<()> {
        for dir in [&self.download_dir, &self.staging_dir, &self.output_dir] {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => debug!(dir = %dir.display(), "cleared"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(EncrustError::io(dir, source)),
            }
        }
        self.create_dirs().await
    }
}

/// Output of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Wheels moved to the output directory unchanged.
    pub moved: Vec<PathBuf>,
    /// Fused universal2 wheels written to the output directory.
    pub fused: Vec<PathBuf>,
}

#[derive(Debug)]
enum Resolved {
    Moved(Vec<PathBuf>),
    Fused { moved: Vec<PathBuf>, fused: PathBuf },
}

/// Resolves a download directory into universal2 and pure-Python wheels.
#[derive(Clone)]
pub struct ArchitectureReconciler {
    runner: Arc<dyn ProcessRunner>,
    layout: ReconcileLayout,
    scheduler: TaskScheduler,
}

impl std::fmt::Debug for ArchitectureReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchitectureReconciler")
            .field("layout", &self.layout)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl ArchitectureReconciler {
    /// Reconciler over `layout` with [`DEFAULT_PARALLELISM`].
    pub fn new(runner: Arc<dyn ProcessRunner>, layout: ReconcileLayout) -> Self {
        Self {
            runner,
            layout,
            scheduler: TaskScheduler::new(DEFAULT_PARALLELISM),
        }
    }

    /// Override the scheduler that runs group resolutions.
    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Directories this reconciler works in.
    pub fn layout(&self) -> &ReconcileLayout {
        &self.layout
    }

    /// Parse every file in the download directory, sorted by name.
    pub async fn collect_artifacts(&self) -> Result<Vec<WheelArtifact>> {
        let dir = &self.layout.download_dir;
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|source| EncrustError::io(dir, source))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| EncrustError::io(dir, source))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|source| EncrustError::io(entry.path(), source))?;
            if file_type.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        paths.into_iter().map(WheelArtifact::from_path).collect()
    }

    /// Run one full pass. Any error aborts the pass; resolutions already
    /// running are allowed to finish first.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let artifacts = self.collect_artifacts().await?;
        info!(
            count = artifacts.len(),
            dir = %self.layout.download_dir.display(),
            "reconciling wheel architectures"
        );
        let groups = group_artifacts(artifacts)?;

        let mut plans = Vec::with_capacity(groups.len());
        for (key, group) in &groups {
            plans.push((key.clone(), group.plan(key)?));
        }

        let work = plans.into_iter().map({
            let runner = Arc::clone(&self.runner);
            let layout = self.layout.clone();
            move |(key, plan)| {
                resolve(Arc::clone(&runner), layout.clone(), key, plan)
            }
        });
        let resolved = self.scheduler.run(work).try_drain().await?;

        let mut report = ReconcileReport::default();
        for outcome in resolved {
            match outcome {
                Resolved::Moved(moved) => report.moved.extend(moved),
                Resolved::Fused { moved, fused } => {
                    report.moved.extend(moved);
                    report.fused.push(fused);
                }
            }
        }
        report.moved.sort();
        report.fused.sort();
        info!(
            moved = report.moved.len(),
            fused = report.fused.len(),
            "reconciliation complete"
        );
        Ok(report)
    }
}

async fn resolve(
    runner: Arc<dyn ProcessRunner>,
    layout: ReconcileLayout,
    key: GroupKey,
    plan: GroupPlan,
) -> Result<Resolved> {
    match plan {
        GroupPlan::Move(sources) => {
            debug!(
                project = %key.project,
                version = %key.version,
                "no fusing needed"
            );
            let moved = move_all(&sources, &layout.output_dir).await?;
            Ok(Resolved::Moved(moved))
        }
        GroupPlan::Fuse {
            moves,
            arm64,
            x86_64,
        } => {
            let moved = move_all(&moves, &layout.output_dir).await?;
            let fused =
                fuse_pair(runner.as_ref(), &layout, &arm64, &x86_64).await?;
            info!(
                project = %key.project,
                version = %key.version,
                "fused universal2 wheel"
            );
            Ok(Resolved::Fused { moved, fused })
        }
    }
}

async fn move_all(sources: &[PathBuf], output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut moved = Vec::with_capacity(sources.len());
    for source in sources {
        let target = output_dir.join(file_name(source)?);
        move_file(source, &target).await?;
        moved.push(target);
    }
    Ok(moved)
}

/// Fuse an arm64/x86_64 pair and move the result into the output directory
/// under its universal2 name. The thin inputs are removed afterwards.
async fn fuse_pair(
    runner: &dyn ProcessRunner,
    layout: &ReconcileLayout,
    arm64: &Path,
    x86_64: &Path,
) -> Result<PathBuf> {
    runner
        .run(&Tool::delocate_fuse(&layout.staging_dir, arm64, x86_64))
        .await?;

    let arm64_name = file_name(arm64)?;
    let universal = WheelFilename::parse(arm64_name)?
        .with_architecture(ArchitectureTag::Universal2)?;
    let produced = layout.staging_dir.join(arm64_name);
    let target = layout.output_dir.join(universal.to_string());
    move_file(&produced, &target).await?;

    for input in [arm64, x86_64] {
        tokio::fs::remove_file(input)
            .await
            .map_err(|source| EncrustError::io(input, source))?;
    }
    Ok(target)
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EncrustError::UnrecognizedArchitecture {
            filename: path.display().to_string(),
            reason: "file name is not valid UTF-8".to_string(),
        })
}

/// Rename, falling back to copy + remove across filesystems.
pub(crate) async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|source| EncrustError::io(from, source))?;
    tokio::fs::remove_file(from)
        .await
        .map_err(|source| EncrustError::io(from, source))?;
    Ok(())
}
