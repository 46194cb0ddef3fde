//! Command-line surface of `encrustctl`.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use encrust_core::fatten::DEFAULT_WHEEL_ROOT;

pub use commands::Context;

#[derive(Debug, Parser)]
#[command(
    name = "encrustctl",
    version,
    about = "Build, fatten, sign and notarize Python applications for macOS"
)]
pub struct Cli {
    /// Configuration file [default: ~/.encrust.json]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Project directory containing setup.py
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    /// Do not echo the output of external tools
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Maximum number of external tools running at once
    #[arg(long, global = true)]
    pub parallelism: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replace every installed wheel with a universal2 build
    Fatten {
        /// Working directory for downloaded, staged and fused wheels
        #[arg(long, default_value = DEFAULT_WHEEL_ROOT)]
        wheel_dir: PathBuf,
    },
    /// Report single-architecture binaries
    Validate {
        /// Roots to scan [default: the Python environment's sys.path]
        paths: Vec<PathBuf>,
    },
    /// Build the application with py2app
    Build,
    /// Code-sign the built application
    Sign,
    /// Submit the signed application for notarization, then staple it
    Notarize,
    /// Build, validate, sign and notarize in one go
    Release,
    /// Store notarization credentials in the keychain
    Auth,
    /// Print setup instructions and a configuration template
    Configure,
}

pub async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::new(&cli);
    match cli.command {
        Command::Fatten { wheel_dir } => commands::fatten(&ctx, wheel_dir).await,
        Command::Validate { paths } => commands::validate(&ctx, paths).await,
        Command::Build => commands::build(&ctx).await,
        Command::Sign => commands::sign(&ctx).await,
        Command::Notarize => commands::notarize(&ctx).await,
        Command::Release => commands::release(&ctx).await,
        Command::Auth => commands::auth(&ctx).await,
        Command::Configure => commands::configure(&ctx),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "encrustctl",
            "validate",
            "dist/App.app",
            "--parallelism",
            "4",
            "-q",
        ])
        .unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.parallelism, Some(4));
        match cli.command {
            Command::Validate { paths } => {
                assert_eq!(paths, vec![PathBuf::from("dist/App.app")]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
