//! PassVault CLI - Error Types

use passvault_core::VaultError;
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    // ═══════════════════════════════════════════════════════════════
    // LOCAL CONFIG ERRORS
    // ═══════════════════════════════════════════════════════════════
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Vault not initialized - run `passvault init` first")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ═══════════════════════════════════════════════════════════════
    // INTERACTION
    // ═══════════════════════════════════════════════════════════════
    #[error("Cancelled")]
    Cancelled,

    #[error("Too many failed attempts")]
    TooManyAttempts,

    #[error("Clipboard unavailable: {0}")]
    Clipboard(String),
}

impl CliError {
    /// Check if this is a security-critical error
    pub fn is_security_critical(&self) -> bool {
        matches!(self, CliError::Vault(e) if e.is_security_critical())
    }

    /// Errors after which an interactive shell can keep going
    pub fn is_recoverable(&self) -> bool {
        match self {
            CliError::Vault(e) => e.is_recoverable(),
            CliError::Cancelled | CliError::Clipboard(_) => true,
            _ => false,
        }
    }

    /// Message for the terminal. Wrong password and unknown record read
    /// the same.
    pub fn user_message(&self) -> String {
        match self {
            CliError::Vault(e) => e.public_message(),
            other => other.to_string(),
        }
    }
}
