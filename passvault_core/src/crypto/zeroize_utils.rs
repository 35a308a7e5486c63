//! Key material with guaranteed zeroing

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a master key (AES-256)
pub const KEY_LEN: usize = 32;

/// Symmetric master key.
///
/// Owned, never `Clone`, never serialized. The bytes are overwritten with
/// zeros when the value is dropped, on every exit path including unwinding
/// and early `?` returns.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Takes ownership of raw key bytes; the argument copy is wiped.
    pub fn from_bytes(mut bytes: [u8; KEY_LEN]) -> Self {
        let key = Self { bytes };
        bytes.zeroize();
        key
    }

    pub(crate) fn empty() -> Self {
        Self {
            bytes: [0u8; KEY_LEN],
        }
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8; KEY_LEN] {
        &mut self.bytes
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Overwrite the key with zeros now instead of at drop.
    pub fn clear(&mut self) {
        self.bytes.zeroize();
    }

    /// True once the key has been wiped.
    pub fn is_cleared(&self) -> bool {
        self.bytes.iter().fold(0u8, |acc, b| acc | b) == 0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}
