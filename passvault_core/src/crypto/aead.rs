//! AES-256-GCM field encryption under the master key

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use zeroize::Zeroizing;

use super::zeroize_utils::MasterKey;
use crate::error::{VaultError, VaultResult};

/// Nonce length for AES-GCM
pub const NONCE_LEN: usize = 12;

/// Authentication tag length for AES-GCM
pub const TAG_LEN: usize = 16;

/// Encrypts and decrypts credential fields under exactly one master key.
///
/// Tokens are `base64(nonce || ciphertext || tag)` with a fresh random nonce
/// per call, so every token carries what it needs to be opened.
#[derive(Debug)]
pub struct CipherService {
    key: MasterKey,
}

impl CipherService {
    pub fn new(key: MasterKey) -> Self {
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &str) -> VaultResult<String> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| VaultError::Entropy(format!("nonce: {}", e)))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| VaultError::Crypto(format!("AES-GCM encryption failed: {}", e)))?;

        let mut token = Vec::with_capacity(NONCE_LEN + sealed.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&sealed);

        Ok(STANDARD.encode(token))
    }

    /// Opens a token. Nothing is returned unless the tag verifies.
    pub fn decrypt(&self, token: &str) -> VaultResult<Zeroizing<String>> {
        let raw = STANDARD
            .decode(token.trim())
            .map_err(|e| VaultError::Decode(e.to_string()))?;

        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::Decode(format!(
                "token too short: {} bytes",
                raw.len()
            )));
        }

        let cipher = self.cipher()?;
        let (nonce, sealed) = raw.split_at(NONCE_LEN);

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce), sealed)
                .map_err(|_| VaultError::Authentication)?,
        );

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| VaultError::Decode("plaintext is not UTF-8".into()))?;

        Ok(Zeroizing::new(text.to_owned()))
    }

    /// Overwrite the held key with zeros. The service is unusable afterwards.
    pub fn secure_clear(&mut self) {
        self.key.clear();
    }

    pub fn is_cleared(&self) -> bool {
        self.key.is_cleared()
    }

    fn cipher(&self) -> VaultResult<Aes256Gcm> {
        if self.key.is_cleared() {
            return Err(VaultError::Crypto("key material has been cleared".into()));
        }
        Aes256Gcm::new_from_slice(self.key.expose())
            .map_err(|e| VaultError::Crypto(format!("AES-GCM init failed: {}", e)))
    }
}
