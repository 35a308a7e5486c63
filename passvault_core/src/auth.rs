//! Master password verification
//!
//! The vault stores `base64(SHA-256(master_key))`, never the password. A
//! candidate password is checked by deriving its key with the vault salt and
//! comparing digests in constant time.

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use tracing::warn;
use zeroize::Zeroizing;

use crate::crypto::{derive, KdfParams, MasterKey, Salt};
use crate::error::{VaultError, VaultResult};

/// Verification hash of a derived master key
pub fn verification_hash(key: &MasterKey) -> String {
    let digest = key_digest(key);
    STANDARD.encode(digest.as_slice())
}

/// True only if `candidate` derives the key whose hash is `stored_hash`.
pub fn verify(candidate: &[u8], salt: &Salt, stored_hash: &str, params: &KdfParams) -> bool {
    match authenticate(candidate, salt, stored_hash, params) {
        Ok(_key) => true,
        Err(VaultError::AuthFailed) => false,
        Err(e) => {
            warn!(error = %e, "verification could not derive candidate key");
            false
        }
    }
}

/// Derive the candidate key and hand it back only if it matches.
///
/// On mismatch the candidate key is dropped (and zeroed) before returning.
pub fn authenticate(
    candidate: &[u8],
    salt: &Salt,
    stored_hash: &str,
    params: &KdfParams,
) -> VaultResult<MasterKey> {
    let key = derive(candidate, salt, params)?;

    let expected = match STANDARD.decode(stored_hash.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "stored verification hash is not valid base64");
            return Err(VaultError::AuthFailed);
        }
    };

    let computed = key_digest(&key);
    if constant_time_eq(computed.as_slice(), &expected) {
        Ok(key)
    } else {
        Err(VaultError::AuthFailed)
    }
}

fn key_digest(key: &MasterKey) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(Sha256::digest(key.expose()).into())
}

/// Compares every byte regardless of where the first difference is.
#[inline(never)]
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    std::hint::black_box(diff) == 0
}
