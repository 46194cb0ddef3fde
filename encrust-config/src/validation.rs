//! Guard rails applied to a loaded configuration.

use thiserror::Error;

use super::models::EncrustConfig;

/// Length of a certificate SHA-1 hash in hex digits.
const IDENTITY_HASH_LEN: usize = 40;
/// Apple team identifiers are ten uppercase alphanumerics.
const TEAM_ID_LEN: usize = 10;

/// Configuration that cannot be used at all.
#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    /// A required field is blank.
    #[error("configuration field {field} is empty")]
    EmptyField {
        /// JSON key of the field.
        field: &'static str,
    },
    /// The identity is not a hex certificate hash.
    #[error("signing identity {reason}")]
    InvalidIdentity {
        /// What is wrong with it.
        reason: String,
    },
}

/// Something suspicious that does not block loading.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// What looks wrong.
    pub message: String,
    /// How to fix it, when known.
    pub hint: Option<String>,
}

/// Warnings collected by [`apply_guard_rails`].
#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    /// In the order they were raised.
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    /// Record a warning without a hint.
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    /// Record a warning with a suggested fix.
    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    /// No warnings were raised.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Reject unusable configuration and collect warnings for odd values.
pub fn apply_guard_rails(
    config: &EncrustConfig,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    for (field, value) in [
        ("identity", &config.identity),
        ("teamID", &config.team_id),
        ("appleID", &config.apple_id),
        ("profile", &config.profile),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigGuardRailError::EmptyField { field });
        }
    }

    enforce_identity(&config.identity, &mut warnings)?;

    let team_id = &config.team_id;
    if team_id.len() != TEAM_ID_LEN
        || !team_id
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        warnings.push_with_hint(
            format!("teamID '{team_id}' does not look like an Apple team ID"),
            "Use the ten-character ID in parentheses from `security find-identity`",
        );
    }

    if !config.apple_id.contains('@') {
        warnings.push(format!(
            "appleID '{}' is not an email address",
            config.apple_id
        ));
    }

    Ok(warnings)
}

fn enforce_identity(
    identity: &str,
    warnings: &mut ConfigWarnings,
) -> Result<(), ConfigGuardRailError> {
    if !identity.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigGuardRailError::InvalidIdentity {
            reason: "must be the hexadecimal certificate hash".into(),
        });
    }
    if identity.len() != IDENTITY_HASH_LEN {
        warnings.push_with_hint(
            format!(
                "signing identity has {} hex digits, expected {IDENTITY_HASH_LEN}",
                identity.len()
            ),
            "Copy the full hash printed by `security find-identity -v -p codesigning`",
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EncrustConfig {
        EncrustConfig {
            identity: "0123456789ABCDEF0123456789ABCDEF01234567".into(),
            team_id: "ABCDE12345".into(),
            apple_id: "dev@example.com".into(),
            profile: "encrust".into(),
            entitlements: None,
        }
    }

    #[test]
    fn well_formed_config_has_no_warnings() {
        assert!(apply_guard_rails(&config()).unwrap().is_empty());
    }

    #[test]
    fn empty_profile_is_rejected() {
        let mut config = config();
        config.profile = "  ".into();
        assert!(matches!(
            apply_guard_rails(&config),
            Err(ConfigGuardRailError::EmptyField { field: "profile" })
        ));
    }

    #[test]
    fn identity_must_be_hex() {
        let mut config = config();
        config.identity = "Developer ID Application: Someone".into();
        assert!(matches!(
            apply_guard_rails(&config),
            Err(ConfigGuardRailError::InvalidIdentity { .. })
        ));
    }

    #[test]
    fn odd_ids_only_warn() {
        let mut config = config();
        config.identity = "ABCDEF".into();
        config.team_id = "team".into();
        config.apple_id = "someone".into();
        let warnings = apply_guard_rails(&config).unwrap();
        assert_eq!(warnings.items.len(), 3);
        assert!(warnings.items[0].hint.is_some());
    }
}
