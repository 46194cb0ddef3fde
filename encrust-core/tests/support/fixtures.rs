//! Fake files with the `file -b` descriptors the scanner recognises.
//!
//! [`super::runner::FakeRunner`] answers `file -b <path>` with the first
//! line of the file, so these fixtures only need the right prefix.

use std::path::{Path, PathBuf};

pub const THIN_ARM64: &str = "Mach-O 64-bit bundle arm64\n";
pub const UNIVERSAL: &str =
    "Mach-O universal binary with 2 architectures: [x86_64] [arm64]\n";
pub const TEXT: &str = "ASCII text\n";

/// Write `contents` to `root/relative`, creating parents.
pub fn write(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

/// Create empty wheel files named `names` under `dir`.
pub fn wheels(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    std::fs::create_dir_all(dir).unwrap();
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, name.as_bytes()).unwrap();
            path
        })
        .collect()
}

/// Sorted file names in `dir`.
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
