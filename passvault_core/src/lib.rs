//! # PassVault core
//!
//! Cryptographic core of a local-first credential vault:
//! - Argon2id master key derivation with per-generation salts
//! - AES-256-GCM encryption of credential fields
//! - Master password verification without storing the password
//! - Time-bounded unlocked sessions that zero the key on every lock
//! - Resumable master password rotation
//!
//! Persistence is delegated to a [`RecordStore`].

pub mod auth;
pub mod crypto;
pub mod error;
pub mod models;
pub mod policy;
pub mod rotation;
pub mod session;
pub mod store;
pub mod vault;

// Re-exports
pub use crypto::{CipherService, KdfParams, MasterKey};
pub use error::{VaultError, VaultResult};
pub use models::{Credential, KeyGeneration, PendingRotation, VaultConfig, DEFAULT_CATEGORY};
pub use policy::{generate_password, PasswordPolicy, DEFAULT_GENERATED_LENGTH};
pub use rotation::{RotationCoordinator, RotationReport};
pub use session::{LockReason, SessionManager, SessionState, DEFAULT_TIMEOUT};
pub use store::{MemoryStore, RecordStore};
pub use vault::{CredentialUpdate, NewCredential, RevealedCredential, Vault};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
