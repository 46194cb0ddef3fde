//! Registry of the external tools encrust knows how to drive.
//!
//! Workflows never build command lines from free-form strings; they go
//! through [`Tool`] and the typed builders below so every argument shape
//! lives in one place.

use std::path::Path;

use crate::wheel::ArchitectureTag;

use super::Invocation;

/// Known external commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// `file`, to identify Mach-O binaries.
    File,
    /// `delocate-fuse`, to merge two thin wheels.
    DelocateFuse,
    /// `pip` from the active environment.
    Pip,
    /// `arch`, to run pip under Rosetta.
    Arch,
    /// `python` from the active environment.
    Python,
    /// `codesign`.
    Codesign,
    /// `xcrun`, for notarytool and stapler.
    Xcrun,
    /// `zip`.
    Zip,
}

impl Tool {
    /// Name looked up on `PATH`.
    pub fn executable(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::DelocateFuse => "delocate-fuse",
            Self::Pip => "pip",
            Self::Arch => "arch",
            Self::Python => "python",
            Self::Codesign => "codesign",
            Self::Xcrun => "xcrun",
            Self::Zip => "zip",
        }
    }

    /// A bare invocation of this tool.
    pub fn invocation(self) -> Invocation {
        Invocation::new(self.executable())
    }

    /// `file -b <path>`, quiet: one of these runs per scanned file.
    pub fn describe_file(path: &Path) -> Invocation {
        Self::File.invocation().arg("-b").arg(path).quiet()
    }

    /// `delocate-fuse --verbose --wheel-dir=<dir> <arm64> <x86_64>`
    pub fn delocate_fuse(
        wheel_dir: &Path,
        arm64: &Path,
        x86_64: &Path,
    ) -> Invocation {
        let mut dir_flag = std::ffi::OsString::from("--wheel-dir=");
        dir_flag.push(wheel_dir);
        Self::DelocateFuse
            .invocation()
            .arg("--verbose")
            .arg(dir_flag)
            .arg(arm64)
            .arg(x86_64)
    }

    /// `pip freeze`, quiet.
    pub fn pip_freeze() -> Invocation {
        Self::Pip.invocation().arg("freeze").quiet()
    }

    /// `arch -<arch> <pip> wheel -r <requirements> -w <dir>`
    ///
    /// `pip` must be an absolute path: `arch` does not search `PATH` the
    /// way a shell would.
    pub fn pip_wheel_for_arch(
        architecture: ArchitectureTag,
        pip: &Path,
        requirements: &Path,
        wheel_dir: &Path,
    ) -> Invocation {
        Self::Arch
            .invocation()
            .arg(format!("-{}", architecture.as_str()))
            .arg(pip)
            .arg("wheel")
            .arg("-r")
            .arg(requirements)
            .arg("-w")
            .arg(wheel_dir)
    }

    /// Reinstall `requirements` from `find_links` only.
    pub fn pip_install_from(
        find_links: &Path,
        requirements: &Path,
    ) -> Invocation {
        Self::Pip
            .invocation()
            .arg("install")
            .arg("--no-index")
            .arg("--find-links")
            .arg(find_links)
            .arg("--force-reinstall")
            .arg("--requirement")
            .arg(requirements)
    }

    /// Print one `sys.path` entry per line.
    pub fn python_search_paths() -> Invocation {
        Self::Python
            .invocation()
            .arg("-c")
            .arg("import sys\nfor p in sys.path:\n    print(p)")
            .quiet()
    }

    /// `python setup.py py2app`
    pub fn py2app() -> Invocation {
        Self::Python.invocation().args(["setup.py", "py2app"])
    }

    /// `python setup.py --name --version`, quiet.
    pub fn project_metadata() -> Invocation {
        Self::Python
            .invocation()
            .args(["setup.py", "--name", "--version"])
            .quiet()
    }

    /// Sign `target` with the hardened runtime.
    pub fn codesign(
        identity: &str,
        entitlements: &Path,
        target: &Path,
    ) -> Invocation {
        Self::Codesign
            .invocation()
            .arg("--sign")
            .arg(identity)
            .arg("--entitlements")
            .arg(entitlements)
            .arg("--force")
            .arg("--options")
            .arg("runtime")
            .arg(target)
    }

    /// Submit `archive` to the notary service and wait for a verdict.
    pub fn notarytool_submit(
        archive: &Path,
        apple_id: &str,
        team_id: &str,
        profile: &str,
    ) -> Invocation {
        Self::Xcrun
            .invocation()
            .arg("notarytool")
            .arg("submit")
            .arg(archive)
            .arg(format!("--apple-id={apple_id}"))
            .arg(format!("--team-id={team_id}"))
            .arg(format!("--keychain-profile={profile}"))
            .arg("--wait")
    }

    /// `xcrun stapler staple <application>`
    pub fn stapler_staple(application: &Path) -> Invocation {
        Self::Xcrun
            .invocation()
            .args(["stapler", "staple"])
            .arg(application)
    }

    /// Interactive: notarytool prompts for the app-specific password.
    pub fn notarytool_store_credentials(
        profile: &str,
        apple_id: &str,
        team_id: &str,
    ) -> Invocation {
        Self::Xcrun
            .invocation()
            .args(["notarytool", "store-credentials", profile])
            .args(["--apple-id", apple_id])
            .args(["--team-id", team_id])
            .inherit_stdio()
    }

    /// `zip -yr <archive> <dir>`; `-y` keeps framework symlinks intact.
    pub fn zip_directory(archive: &Path, directory: &Path) -> Invocation {
        Self::Zip
            .invocation()
            .arg("-yr")
            .arg(archive)
            .arg(directory)
    }
}
