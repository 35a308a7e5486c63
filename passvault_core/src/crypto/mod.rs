//! Crypto module - Argon2id, AES-256-GCM, key buffers

mod aead;
mod argon2_kdf;
mod zeroize_utils;

pub use aead::{CipherService, NONCE_LEN, TAG_LEN};
pub use argon2_kdf::{decode_salt, derive, encode_salt, generate_salt, KdfParams, Salt, SALT_LEN};
pub use zeroize_utils::{MasterKey, KEY_LEN};
