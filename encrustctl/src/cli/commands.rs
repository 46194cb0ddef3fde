use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use encrust_config::{ConfigLoader, EncrustConfig};
use encrust_core::{
    AppBuilder, BinaryScanner, EnvironmentFattener, NotaryCredentials,
    ProcessRunner, ProjectMetadata, SigningIdentity, SystemRunner,
    TaskScheduler, Validator, fatten::python_search_paths,
};
use tracing::info;

use super::Cli;

/// Everything a subcommand needs besides its own arguments.
pub struct Context {
    runner: Arc<dyn ProcessRunner>,
    config_path: Option<PathBuf>,
    project_dir: PathBuf,
    parallelism: Option<usize>,
}

impl Context {
    pub fn new(cli: &Cli) -> Self {
        let runner = if cli.quiet {
            SystemRunner::silent()
        } else {
            SystemRunner::new()
        };
        Self {
            runner: Arc::new(runner),
            config_path: cli.config.clone(),
            project_dir: cli.project_dir.clone(),
            parallelism: cli.parallelism,
        }
    }

    fn scheduler(&self) -> Option<TaskScheduler> {
        self.parallelism.map(TaskScheduler::new)
    }

    fn load_config(&self) -> Result<EncrustConfig> {
        let mut loader = ConfigLoader::new();
        if let Some(path) = &self.config_path {
            loader = loader.with_config_path(path);
        }
        let loaded = loader.load().context("failed to load configuration")?;
        Ok(loaded.config)
    }

    pub async fn app_builder(&self) -> Result<AppBuilder> {
        let config = self.load_config()?;
        let metadata =
            ProjectMetadata::discover(self.runner.as_ref(), &self.project_dir)
                .await
                .context("failed to read project name and version")?;
        info!(name = %metadata.name, version = %metadata.version, "project");

        let signing = SigningIdentity::new(
            config.identity.clone(),
            self.project_dir.join(config.entitlements_path()),
        );
        let notary = NotaryCredentials {
            apple_id: config.apple_id,
            team_id: config.team_id,
            profile: config.profile,
        };
        let builder = AppBuilder::new(
            Arc::clone(&self.runner),
            &self.project_dir,
            metadata,
            signing,
            notary,
        );
        Ok(match self.scheduler() {
            Some(scheduler) => builder.with_scheduler(scheduler),
            None => builder,
        })
    }
}

pub async fn fatten(ctx: &Context, wheel_dir: PathBuf) -> Result<()> {
    let mut fattener =
        EnvironmentFattener::new(Arc::clone(&ctx.runner), wheel_dir);
    if let Some(scheduler) = ctx.scheduler() {
        fattener = fattener.with_scheduler(scheduler);
    }
    let report = fattener
        .fatten()
        .await
        .context("failed to fatten the Python environment")?;
    println!(
        "fused {} wheels, reinstalled {} unchanged",
        report.fused.len(),
        report.moved.len()
    );
    Ok(())
}

pub async fn validate(ctx: &Context, paths: Vec<PathBuf>) -> Result<()> {
    let roots = if paths.is_empty() {
        python_search_paths(ctx.runner.as_ref())
            .await
            .context("failed to list Python search paths")?
    } else {
        paths
    };
    let mut scanner = BinaryScanner::new(Arc::clone(&ctx.runner));
    if let Some(scheduler) = ctx.scheduler() {
        scanner = scanner.with_scheduler(scheduler);
    }
    Validator::with_scanner(scanner)
        .validate(roots)
        .await
        .context("architecture validation failed")?;
    println!("all binaries are universal");
    Ok(())
}

pub async fn build(ctx: &Context) -> Result<()> {
    ctx.app_builder().await?.build().await.context("py2app build failed")
}

pub async fn sign(ctx: &Context) -> Result<()> {
    let builder = ctx.app_builder().await?;
    builder.sign_app().await.context("code signing failed")?;
    println!("signed {}", builder.app_path().display());
    Ok(())
}

pub async fn notarize(ctx: &Context) -> Result<()> {
    let builder = ctx.app_builder().await?;
    builder.notarize_app().await.context("notarization failed")?;
    println!("notarized {}", builder.app_path().display());
    Ok(())
}

pub async fn release(ctx: &Context) -> Result<()> {
    let builder = ctx.app_builder().await?;
    builder.release_workflow().await.context("release failed")?;
    let metadata = builder.metadata();
    println!("released {} {}", metadata.name, metadata.version);
    Ok(())
}

pub async fn auth(ctx: &Context) -> Result<()> {
    ctx.app_builder()
        .await?
        .authenticate()
        .await
        .context("storing notarization credentials failed")?;
    println!("Authenticated!");
    Ok(())
}

const SETUP_STEPS: &str = "\
1. Enroll in the Apple Developer program at https://developer.apple.com/account
2. Install Xcode from the App Store and launch it
   a. open Settings -> Accounts
   b. add the Apple ID you enrolled with
   c. Manage Certificates -> + -> Developer ID Application
3. Run `security find-identity -v -p codesigning` and find the
   \"Developer ID Application\" line
4. Write the configuration file shown below
5. Create an app-specific password at https://appleid.apple.com/account/manage
6. Run `encrustctl auth` and paste the password when prompted";

pub fn configure(ctx: &Context) -> Result<()> {
    let path = match &ctx.config_path {
        Some(path) => path.clone(),
        None => encrust_config::default_config_path()?,
    };
    let template = serde_json::to_string_pretty(&EncrustConfig::template())?;
    println!("{SETUP_STEPS}\n\n{}:\n\n{template}", path.display());
    Ok(())
}
