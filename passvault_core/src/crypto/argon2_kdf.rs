//! Argon2id KDF deriving the master key from the master password

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::zeroize_utils::{MasterKey, KEY_LEN};
use crate::error::{VaultError, VaultResult};

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// Per-generation vault salt
pub type Salt = [u8; SALT_LEN];

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Iterations (time cost)
    pub time_cost: u32,
    /// Memory in KiB
    pub memory_kib: u32,
    /// Parallel lanes
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time_cost: 3,
            memory_kib: 64 * 1024, // 64 MiB
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Preset for weak devices (and the test suite)
    pub fn low_memory() -> Self {
        Self {
            time_cost: 4,
            memory_kib: 16 * 1024, // 16 MiB
            parallelism: 1,
        }
    }

    pub fn is_below_recommended(&self) -> bool {
        let rec = Self::default();
        self.time_cost < rec.time_cost
            || self.memory_kib < rec.memory_kib
            || self.parallelism < rec.parallelism
    }

    /// Log when a vault is configured with weaker than recommended costs.
    pub fn warn_if_weak(&self) {
        if self.is_below_recommended() {
            let rec = Self::default();
            warn!(
                time_cost = self.time_cost,
                memory_kib = self.memory_kib,
                parallelism = self.parallelism,
                recommended_memory_kib = rec.memory_kib,
                "argon2 parameters below recommended values"
            );
        }
    }
}

/// Derive the 32-byte master key from `password` and `salt`.
///
/// Pure and deterministic for identical inputs.
pub fn derive(password: &[u8], salt: &Salt, params: &KdfParams) -> VaultResult<MasterKey> {
    let argon_params = Params::new(
        params.memory_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::Crypto(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = MasterKey::empty();
    argon2
        .hash_password_into(password, salt, key.as_mut_bytes())
        .map_err(|e| VaultError::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(key)
}

/// Fresh salt from the OS CSPRNG
pub fn generate_salt() -> VaultResult<Salt> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt).map_err(|e| VaultError::Entropy(e.to_string()))?;
    Ok(salt)
}

pub fn encode_salt(salt: &Salt) -> String {
    STANDARD.encode(salt)
}

pub fn decode_salt(encoded: &str) -> VaultResult<Salt> {
    let raw = STANDARD
        .decode(encoded)
        .map_err(|e| VaultError::Decode(format!("salt: {}", e)))?;

    raw.as_slice().try_into().map_err(|_| {
        VaultError::Decode(format!(
            "salt must be {} bytes, got {}",
            SALT_LEN,
            raw.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_default_params_deterministic() {
        let salt = [1u8; SALT_LEN];
        let params = KdfParams::default();

        let k1 = derive(b"test_password", &salt, &params).unwrap();
        let k2 = derive(b"test_password", &salt, &params).unwrap();

        assert_eq!(k1.expose().len(), KEY_LEN);
        assert_eq!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_any_input_change_changes_key() {
        let params = KdfParams::low_memory();
        let salt = [9u8; SALT_LEN];
        let base = derive(b"correct horse", &salt, &params).unwrap();

        let mut other_salt = salt;
        other_salt[15] ^= 0x01;
        let by_salt = derive(b"correct horse", &other_salt, &params).unwrap();
        let by_password = derive(b"correct horsf", &salt, &params).unwrap();

        assert_ne!(base.expose(), by_salt.expose());
        assert_ne!(base.expose(), by_password.expose());
    }

    #[test]
    fn test_invalid_params_are_crypto_errors() {
        let params = KdfParams {
            time_cost: 0,
            memory_kib: 1,
            parallelism: 0,
        };
        let result = derive(b"pw", &[0u8; SALT_LEN], &params);
        assert!(matches!(result, Err(VaultError::Crypto(_))));
    }

    #[test]
    fn test_generate_salt_unique() {
        let s1 = generate_salt().unwrap();
        let s2 = generate_salt().unwrap();
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_salt_encoding() {
        let salt = generate_salt().unwrap();
        assert_eq!(decode_salt(&encode_salt(&salt)).unwrap(), salt);
        assert!(matches!(decode_salt("AAAA"), Err(VaultError::Decode(_))));
        assert!(matches!(decode_salt("not base64!"), Err(VaultError::Decode(_))));
    }

    #[test]
    fn test_presets() {
        assert!(!KdfParams::default().is_below_recommended());
        assert!(KdfParams::low_memory().is_below_recommended());
    }
}
