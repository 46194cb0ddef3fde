//! Wheel filenames and the architecture they target.
//!
//! `{project}-{version}(-{build})?-{python}-{abi}-{platform}.whl`, where a
//! macOS platform tag reads `{os}_{major}_{minor}_{arch}`. Parsing keeps
//! every field so the name can be rebuilt with only the architecture
//! changed.

use std::{fmt, str::FromStr};

use crate::error::{EncrustError, Result};

const WHEEL_SUFFIX: &str = ".whl";

/// CPU architecture a wheel targets, or none for pure-Python wheels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArchitectureTag {
    /// Intel.
    X86_64,
    /// Apple Silicon.
    Arm64,
    /// Both, in one fat wheel.
    Universal2,
    /// `none-any` wheels.
    PurePython,
}

impl ArchitectureTag {
    /// Spelling used in platform tags and messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
            Self::Universal2 => "universal2",
            Self::PurePython => "pure-python",
        }
    }

    /// Parse the architecture field of a platform tag. Pure-Python is not a
    /// platform architecture and never matches.
    pub fn from_platform_field(field: &str) -> Option<Self> {
        match field {
            "x86_64" => Some(Self::X86_64),
            "arm64" => Some(Self::Arm64),
            "universal2" => Some(Self::Universal2),
            _ => None,
        }
    }
}

impl fmt::Display for ArchitectureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{os}_{major}_{minor}_{arch}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTag {
    /// Usually `macosx`.
    pub os: String,
    /// Minimum OS major version.
    pub major: String,
    /// Minimum OS minor version.
    pub minor: String,
    /// Target architecture.
    pub architecture: ArchitectureTag,
}

impl PlatformTag {
    fn parse(tag: &str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = tag.splitn(4, '_').collect();
        let [os, major, minor, arch] = fields.as_slice() else {
            return Err(format!(
                "platform tag {tag:?} does not have four fields"
            ));
        };
        if !is_decimal(major) || !is_decimal(minor) {
            return Err(format!(
                "platform tag {tag:?} has a non-numeric version"
            ));
        }
        let architecture = ArchitectureTag::from_platform_field(arch)
            .ok_or_else(|| format!("unknown architecture {arch:?}"))?;
        Ok(Self {
            os: (*os).to_string(),
            major: (*major).to_string(),
            minor: (*minor).to_string(),
            architecture,
        })
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.os, self.major, self.minor, self.architecture
        )
    }
}

fn is_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// A parsed wheel filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelFilename {
    /// Distribution name, as escaped in the filename.
    pub project: String,
    /// Distribution version.
    pub version: String,
    /// Optional build tag.
    pub build: Option<String>,
    /// e.g. `cp311` or `py2.py3`.
    pub python_tag: String,
    /// e.g. `cp311` or `none`.
    pub abi_tag: String,
    /// Raw platform tag, e.g. `macosx_11_0_arm64` or `any`.
    pub platform_tag: String,
}

impl WheelFilename {
    /// Split a `.whl` filename into its fields.
    pub fn parse(filename: &str) -> Result<Self> {
        let unrecognized = |reason: &str| EncrustError::UnrecognizedArchitecture {
            filename: filename.to_string(),
            reason: reason.to_string(),
        };

        let stem = filename
            .strip_suffix(WHEEL_SUFFIX)
            .ok_or_else(|| unrecognized("not a .whl file"))?;
        let parts: Vec<&str> = stem.split('-').collect();
        let (project, version, build, python_tag, abi_tag, platform_tag) =
            match parts.as_slice() {
                [project, version, python, abi, platform] => {
                    (project, version, None, python, abi, platform)
                }
                [project, version, build, python, abi, platform] => {
                    (project, version, Some(build), python, abi, platform)
                }
                _ => return Err(unrecognized("wrong number of name fields")),
            };
        if [project, version, python_tag, abi_tag, platform_tag]
            .iter()
            .any(|field| field.is_empty())
        {
            return Err(unrecognized("empty name field"));
        }

        Ok(Self {
            project: (*project).to_string(),
            version: (*version).to_string(),
            build: build.map(|b| (*b).to_string()),
            python_tag: (*python_tag).to_string(),
            abi_tag: (*abi_tag).to_string(),
            platform_tag: (*platform_tag).to_string(),
        })
    }

    /// `none-any` wheels run everywhere.
    pub fn is_pure_python(&self) -> bool {
        self.abi_tag == "none" && self.platform_tag == "any"
    }

    /// The single macOS platform tag. Compressed tag sets (`a.b`) are
    /// rejected: a multi-platform wheel cannot be classified.
    pub fn platform(&self) -> Result<PlatformTag> {
        if self.platform_tag.contains('.') {
            return Err(self.unrecognized(format!(
                "multiple platform tags in {:?}",
                self.platform_tag
            )));
        }
        PlatformTag::parse(&self.platform_tag)
            .map_err(|reason| self.unrecognized(reason))
    }

    /// Pure-Python, or the architecture from the platform tag.
    pub fn architecture(&self) -> Result<ArchitectureTag> {
        if self.is_pure_python() {
            return Ok(ArchitectureTag::PurePython);
        }
        Ok(self.platform()?.architecture)
    }

    /// The same wheel with its platform architecture field replaced.
    pub fn with_architecture(&self, architecture: ArchitectureTag) -> Result<Self> {
        if architecture == ArchitectureTag::PurePython {
            return Err(self.unrecognized(
                "pure-python is not a platform architecture".to_string(),
            ));
        }
        let mut platform = self.platform()?;
        platform.architecture = architecture;
        Ok(Self {
            platform_tag: platform.to_string(),
            ..self.clone()
        })
    }

    fn unrecognized(&self, reason: String) -> EncrustError {
        EncrustError::UnrecognizedArchitecture {
            filename: self.to_string(),
            reason,
        }
    }
}

impl FromStr for WheelFilename {
    type Err = EncrustError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for WheelFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.project, self.version)?;
        if let Some(build) = &self.build {
            write!(f, "-{build}")?;
        }
        write!(
            f,
            "-{}-{}-{}{WHEEL_SUFFIX}",
            self.python_tag, self.abi_tag, self.platform_tag
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arm64_wheel() {
        let w: WheelFilename =
            "foo-1.0-cp310-cp310-macosx_11_0_arm64.whl".parse().unwrap();
        assert_eq!(w.project, "foo");
        assert_eq!(w.version, "1.0");
        assert_eq!(w.build, None);
        assert_eq!(w.architecture().unwrap(), ArchitectureTag::Arm64);
    }

    #[test]
    fn none_any_is_pure_python() {
        let w = WheelFilename::parse("six-1.16.0-py2.py3-none-any.whl").unwrap();
        assert_eq!(w.architecture().unwrap(), ArchitectureTag::PurePython);
    }

    #[test]
    fn build_tag_is_kept() {
        let name = "foo-1.0-2-cp311-cp311-macosx_10_9_universal2.whl";
        let w = WheelFilename::parse(name).unwrap();
        assert_eq!(w.build.as_deref(), Some("2"));
        assert_eq!(w.architecture().unwrap(), ArchitectureTag::Universal2);
        assert_eq!(w.to_string(), name);
    }

    #[test]
    fn replaces_only_the_architecture_field() {
        // "arm64" also appears in the project name; only the tag changes.
        let w = WheelFilename::parse(
            "arm64_tools-1.0-cp310-cp310-macosx_11_0_arm64.whl",
        )
        .unwrap();
        let fused = w.with_architecture(ArchitectureTag::Universal2).unwrap();
        assert_eq!(
            fused.to_string(),
            "arm64_tools-1.0-cp310-cp310-macosx_11_0_universal2.whl"
        );
    }

    #[test]
    fn multi_platform_tags_are_unclassifiable() {
        let w = WheelFilename::parse(
            "foo-1.0-cp310-cp310-macosx_10_9_x86_64.macosx_11_0_arm64.whl",
        )
        .unwrap();
        assert!(matches!(
            w.architecture(),
            Err(EncrustError::UnrecognizedArchitecture { .. })
        ));
    }

    #[test]
    fn unknown_architectures_are_rejected() {
        for name in [
            "foo-1.0-cp310-cp310-macosx_11_0_ppc.whl",
            "foo-1.0-cp310-cp310-linux_x86_64.whl",
            "foo-1.0-cp310-cp310-macosx_eleven_0_arm64.whl",
        ] {
            let w = WheelFilename::parse(name).unwrap();
            assert!(
                matches!(
                    w.architecture(),
                    Err(EncrustError::UnrecognizedArchitecture { .. })
                ),
                "{name} should not classify"
            );
        }
    }

    #[test]
    fn malformed_names_fail_to_parse() {
        for name in ["foo-1.0.tar.gz", "foo-1.0-cp310.whl", "-1.0-a-b-c.whl"] {
            assert!(WheelFilename::parse(name).is_err(), "{name}");
        }
    }
}
