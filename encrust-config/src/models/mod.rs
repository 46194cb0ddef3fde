//! Configuration file schema.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Entitlements file used when the configuration names none.
pub const DEFAULT_ENTITLEMENTS: &str = "entitlements.plist";

/// Contents of `~/.encrust.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncrustConfig {
    /// SHA-1 hash of the "Developer ID Application" certificate, as printed
    /// by `security find-identity -v -p codesigning`.
    pub identity: String,

    /// Team identifier shown in parentheses next to the certificate name.
    #[serde(rename = "teamID")]
    pub team_id: String,

    /// Apple ID of the developer account.
    #[serde(rename = "appleID")]
    pub apple_id: String,

    /// Keychain profile that holds the notarization credentials.
    pub profile: String,

    /// Entitlements plist, relative to the project directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitlements: Option<PathBuf>,
}

impl EncrustConfig {
    /// Configured entitlements, or [`DEFAULT_ENTITLEMENTS`].
    pub fn entitlements_path(&self) -> &Path {
        self.entitlements
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_ENTITLEMENTS))
    }

    /// Placeholder configuration for `encrustctl configure` to print.
    pub fn template() -> Self {
        Self {
            identity: "<40 hex digits from security find-identity>".into(),
            team_id: "<team ID in parentheses after the identity>".into(),
            apple_id: "<email of your Apple developer account>".into(),
            profile: "<any keychain profile name you choose>".into(),
            entitlements: None,
        }
    }
}
