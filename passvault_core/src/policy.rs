//! Master password policy and random password generator

use rand::rngs::OsRng;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
/// Symbols added to the generator charset when requested
pub const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Default generated password length
pub const DEFAULT_GENERATED_LENGTH: usize = 20;
pub const MIN_GENERATED_LENGTH: usize = 4;
pub const MAX_GENERATED_LENGTH: usize = 128;

/// Rules a new master password must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    /// Minimum length in characters
    pub min_length: usize,
    /// Require at least one ASCII digit
    pub require_digit: bool,
    /// Require at least one non-alphanumeric character
    pub require_symbol: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 12,
            require_digit: false,
            require_symbol: false,
        }
    }
}

impl PasswordPolicy {
    /// List of violated rules, empty if the password is acceptable.
    pub fn violations(&self, password: &str) -> Vec<String> {
        let mut errors = Vec::new();

        if password.chars().count() < self.min_length {
            errors.push(format!(
                "password must be at least {} characters",
                self.min_length
            ));
        }

        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("password must contain at least one digit".to_string());
        }

        if self.require_symbol && !password.chars().any(|c| !c.is_alphanumeric()) {
            errors.push("password must contain at least one special character".to_string());
        }

        errors
    }

    /// Check a new password and its confirmation.
    pub fn validate(&self, password: &SecretString, confirmation: &SecretString) -> VaultResult<()> {
        let mut errors = self.violations(password.expose_secret());

        if password.expose_secret() != confirmation.expose_secret() {
            errors.push("passwords do not match".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(VaultError::Validation(errors.join("; ")))
        }
    }
}

/// Random password from letters, digits and optionally [`SYMBOLS`].
///
/// Characters are drawn uniformly from the OS random source.
pub fn generate_password(length: usize, include_symbols: bool) -> VaultResult<SecretString> {
    if !(MIN_GENERATED_LENGTH..=MAX_GENERATED_LENGTH).contains(&length) {
        return Err(VaultError::Validation(format!(
            "length must be between {} and {}",
            MIN_GENERATED_LENGTH, MAX_GENERATED_LENGTH
        )));
    }

    let mut charset: Vec<char> = LOWERCASE
        .chars()
        .chain(UPPERCASE.chars())
        .chain(DIGITS.chars())
        .collect();
    if include_symbols {
        charset.extend(SYMBOLS.chars());
    }

    let mut rng = OsRng;
    let password: String = (0..length)
        .map(|_| charset[rng.gen_range(0..charset.len())])
        .collect();

    Ok(SecretString::from(password))
}
