//! Error types for PassVault

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════
    #[error("Secure random source unavailable: {0}")]
    Entropy(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Decryption failed - wrong key or corrupted data")]
    Authentication,

    #[error("Malformed ciphertext: {0}")]
    Decode(String),

    // ═══════════════════════════════════════════════════════════════
    // AUTH / POLICY ERRORS
    // ═══════════════════════════════════════════════════════════════
    #[error("Invalid master password")]
    AuthFailed,

    #[error("Store authentication failed: {0}")]
    OperatorAuthFailed(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Vault is locked - unlock with the master password first")]
    VaultLocked,

    // ═══════════════════════════════════════════════════════════════
    // STORE ERRORS
    // ═══════════════════════════════════════════════════════════════
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Record store unreachable: {0}")]
    Connectivity(String),

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Vault already initialized")]
    AlreadyInitialized,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ═══════════════════════════════════════════════════════════════
    // ROTATION ERRORS
    // ═══════════════════════════════════════════════════════════════
    #[error("Rotation stopped at record {record_id}: {source}")]
    Rotation {
        record_id: String,
        #[source]
        source: Box<VaultError>,
    },

    #[error("Master password change to generation {generation} is unfinished - run it again to resume")]
    RotationPending { generation: String },
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;

impl VaultError {
    pub(crate) fn rotation(record_id: impl Into<String>, source: VaultError) -> Self {
        Self::Rotation {
            record_id: record_id.into(),
            source: Box::new(source),
        }
    }

    /// Errors that abort the process or the current operation outright.
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            Self::Entropy(_) | Self::Crypto(_) | Self::Rotation { .. }
        )
    }

    /// Errors the user can fix by retrying or re-entering input.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Authentication
                | Self::AuthFailed
                | Self::OperatorAuthFailed(_)
                | Self::Validation(_)
                | Self::VaultLocked
                | Self::NotFound(_)
                | Self::Connectivity(_)
                | Self::RotationPending { .. }
        )
    }

    /// Wrong master or operator password.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::AuthFailed | Self::OperatorAuthFailed(_))
    }

    /// Whether the session should be dropped to Locked after this error.
    pub fn requires_lock(&self) -> bool {
        matches!(self, Self::Entropy(_) | Self::Crypto(_))
    }

    /// Message safe to show to someone who has not unlocked the vault.
    ///
    /// A wrong master password and a missing record read the same, so the
    /// output does not reveal which part of the vault exists.
    pub fn public_message(&self) -> String {
        match self {
            Self::AuthFailed | Self::NotFound(_) => {
                "Invalid master password or unknown record".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_and_not_found_look_alike_externally() {
        let auth = VaultError::AuthFailed;
        let missing = VaultError::NotFound("credential abc".into());

        assert_eq!(auth.public_message(), missing.public_message());
        assert_ne!(auth.to_string(), missing.to_string());
    }

    #[test]
    fn test_rotation_error_names_record() {
        let err = VaultError::rotation("rec42", VaultError::Authentication);
        assert!(err.to_string().contains("rec42"));
        assert!(err.is_security_critical());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_classification() {
        assert!(VaultError::Validation("too short".into()).is_recoverable());
        assert!(VaultError::Entropy("no rng".into()).requires_lock());
        assert!(VaultError::OperatorAuthFailed("401".into()).is_auth_error());
        assert!(!VaultError::Authentication.is_auth_error());
    }
}
