//! Records exchanged with the record store

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::crypto::{decode_salt, encode_salt, KdfParams, Salt};
use crate::error::VaultResult;

/// Category given to credentials that do not name one
pub const DEFAULT_CATEGORY: &str = "general";

/// Identifies which salt generation a ciphertext was produced under.
///
/// First 8 bytes of SHA-256(salt), hex encoded. Not secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyGeneration(String);

impl KeyGeneration {
    pub fn from_salt(salt: &Salt) -> Self {
        let digest = Sha256::digest(salt);
        Self(hex::encode(&digest[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored credential. Password and notes are opaque ciphertext tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub username: String,
    pub encrypted_password: String,
    #[serde(
        rename = "notes",
        default,
        serialize_with = "ser_optional_text",
        deserialize_with = "de_optional_text"
    )]
    pub encrypted_notes: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_generation"
    )]
    pub key_generation: Option<KeyGeneration>,
    #[serde(default, skip_serializing)]
    pub created: Option<String>,
    #[serde(default, skip_serializing)]
    pub updated: Option<String>,
}

impl Credential {
    /// Untagged records predate generation tags and count as `active`.
    pub fn is_in_generation(&self, generation: &KeyGeneration, active: &KeyGeneration) -> bool {
        match &self.key_generation {
            Some(tag) => tag == generation,
            None => generation == active,
        }
    }
}

/// Vault verification metadata. One per vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Base64 salt of the active generation
    pub salt: String,
    /// Base64 SHA-256 of the active master key
    #[serde(rename = "password_hash")]
    pub verification_hash: String,
    #[serde(default)]
    pub kdf: KdfParams,
    /// Staged master password change, present only mid-rotation
    #[serde(default)]
    pub pending_rotation: Option<PendingRotation>,
    #[serde(default, skip_serializing)]
    pub created: Option<String>,
}

/// Salt and verification hash of a generation that is not yet active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRotation {
    pub salt: String,
    #[serde(rename = "password_hash")]
    pub verification_hash: String,
    #[serde(default)]
    pub kdf: KdfParams,
}

impl VaultConfig {
    pub fn new(salt: &Salt, verification_hash: String, kdf: KdfParams) -> Self {
        Self {
            id: String::new(),
            salt: encode_salt(salt),
            verification_hash,
            kdf,
            pending_rotation: None,
            created: None,
        }
    }

    pub fn salt_bytes(&self) -> VaultResult<Salt> {
        decode_salt(&self.salt)
    }

    pub fn generation(&self) -> VaultResult<KeyGeneration> {
        Ok(KeyGeneration::from_salt(&self.salt_bytes()?))
    }

    pub fn pending_generation(&self) -> VaultResult<Option<KeyGeneration>> {
        self.pending_rotation
            .as_ref()
            .map(PendingRotation::generation)
            .transpose()
    }

    /// Makes the staged generation the active one.
    pub fn promote_pending(&mut self) -> bool {
        match self.pending_rotation.take() {
            Some(pending) => {
                self.salt = pending.salt;
                self.verification_hash = pending.verification_hash;
                self.kdf = pending.kdf;
                true
            }
            None => false,
        }
    }
}

impl PendingRotation {
    pub fn new(salt: &Salt, verification_hash: String, kdf: KdfParams) -> Self {
        Self {
            salt: encode_salt(salt),
            verification_hash,
            kdf,
        }
    }

    pub fn salt_bytes(&self) -> VaultResult<Salt> {
        decode_salt(&self.salt)
    }

    pub fn generation(&self) -> VaultResult<KeyGeneration> {
        Ok(KeyGeneration::from_salt(&self.salt_bytes()?))
    }
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

// Stores keep text columns as "" rather than null.
fn ser_optional_text<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(value.as_deref().unwrap_or(""))
}

fn de_optional_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.filter(|s| !s.is_empty()))
}

fn de_generation<'de, D: Deserializer<'de>>(d: D) -> Result<Option<KeyGeneration>, D::Error> {
    Ok(de_optional_text(d)?.map(KeyGeneration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_tracks_salt() {
        let g1 = KeyGeneration::from_salt(&[1u8; 16]);
        let g2 = KeyGeneration::from_salt(&[2u8; 16]);
        assert_eq!(g1.as_str().len(), 16);
        assert_ne!(g1, g2);
        assert_eq!(g1, KeyGeneration::from_salt(&[1u8; 16]));
    }

    #[test]
    fn test_credential_from_store_json() {
        let json = r#"{
            "id": "abc123",
            "collectionId": "pbc_1",
            "title": "email",
            "username": "a@b.com",
            "encrypted_password": "TOKEN",
            "notes": "",
            "url": "",
            "category": "",
            "key_generation": "",
            "created": "2025-01-01 10:00:00.000Z"
        }"#;

        let cred: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(cred.id, "abc123");
        assert_eq!(cred.encrypted_notes, None);
        assert_eq!(cred.key_generation, None);
        assert_eq!(cred.created.as_deref(), Some("2025-01-01 10:00:00.000Z"));
    }

    #[test]
    fn test_credential_serialization_omits_server_fields() {
        let cred = Credential {
            id: String::new(),
            title: "t".into(),
            username: "u".into(),
            encrypted_password: "p".into(),
            encrypted_notes: None,
            url: String::new(),
            category: DEFAULT_CATEGORY.into(),
            key_generation: Some(KeyGeneration::from_salt(&[3u8; 16])),
            created: Some("x".into()),
            updated: None,
        };

        let value = serde_json::to_value(&cred).unwrap();
        assert!(value.get("id").is_none());
        assert!(value.get("created").is_none());
        assert_eq!(value["notes"], "");
        assert_eq!(value["key_generation"].as_str().unwrap().len(), 16);
    }

    #[test]
    fn test_untagged_record_belongs_to_active_generation() {
        let active = KeyGeneration::from_salt(&[1u8; 16]);
        let pending = KeyGeneration::from_salt(&[2u8; 16]);
        let cred: Credential =
            serde_json::from_str(r#"{"title":"t","encrypted_password":"p"}"#).unwrap();

        assert_eq!(cred.category, DEFAULT_CATEGORY);
        assert!(cred.is_in_generation(&active, &active));
        assert!(!cred.is_in_generation(&pending, &active));
    }

    #[test]
    fn test_legacy_vault_config_defaults() {
        let json = r#"{"id":"cfg1","salt":"AAAAAAAAAAAAAAAAAAAAAA==","password_hash":"h"}"#;
        let cfg: VaultConfig = serde_json::from_str(json).unwrap();

        assert_eq!(cfg.kdf, KdfParams::default());
        assert!(cfg.pending_rotation.is_none());
        assert_eq!(cfg.salt_bytes().unwrap(), [0u8; 16]);
    }

    #[test]
    fn test_promote_pending() {
        let mut cfg = VaultConfig::new(&[1u8; 16], "old".into(), KdfParams::default());
        assert!(!cfg.promote_pending());

        cfg.pending_rotation = Some(PendingRotation::new(
            &[2u8; 16],
            "new".into(),
            KdfParams::low_memory(),
        ));
        let pending_gen = cfg.pending_generation().unwrap().unwrap();

        assert!(cfg.promote_pending());
        assert_eq!(cfg.verification_hash, "new");
        assert_eq!(cfg.kdf, KdfParams::low_memory());
        assert_eq!(cfg.generation().unwrap(), pending_gen);
        assert!(cfg.pending_rotation.is_none());
    }
}
