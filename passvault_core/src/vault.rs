//! PassVault - main entry point
//!
//! [`Vault`] ties the record store, the session and the rotation
//! coordinator together behind the operations a front end needs.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::auth::{authenticate, verification_hash};
use crate::crypto::{derive, generate_salt, CipherService, KdfParams};
use crate::error::{VaultError, VaultResult};
use crate::models::{Credential, KeyGeneration, VaultConfig, DEFAULT_CATEGORY};
use crate::policy::PasswordPolicy;
use crate::rotation::{self, RotationCoordinator, RotationReport};
use crate::session::{LockReason, SessionManager};
use crate::store::RecordStore;

/// Input for a new credential
#[derive(Debug)]
pub struct NewCredential {
    pub title: String,
    pub username: String,
    pub password: SecretString,
    pub notes: Option<SecretString>,
    pub url: String,
    /// `general` when not given
    pub category: Option<String>,
}

/// Credential with its secret fields decrypted for one call
#[derive(Debug)]
pub struct RevealedCredential {
    pub id: String,
    pub title: String,
    pub username: String,
    pub password: SecretString,
    pub notes: Option<SecretString>,
    pub url: String,
    pub category: String,
    pub created: Option<String>,
    pub updated: Option<String>,
}

/// Partial update. `None` keeps the stored value; empty notes clear them.
#[derive(Debug, Default)]
pub struct CredentialUpdate {
    pub title: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub notes: Option<SecretString>,
    pub url: Option<String>,
    pub category: Option<String>,
}

/// PassVault - one vault, one session
pub struct Vault {
    store: Arc<dyn RecordStore>,
    session: SessionManager,
    policy: PasswordPolicy,
    rotation_kdf: Option<KdfParams>,
}

impl Vault {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self {
            store,
            session: SessionManager::new(timeout),
            policy: PasswordPolicy::default(),
            rotation_kdf: None,
        }
    }

    /// Argon2 parameters for the next master password change. Without this
    /// a change keeps the vault's current parameters.
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.rotation_kdf = Some(kdf);
        self
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    pub fn is_initialized(&self) -> VaultResult<bool> {
        match self.store.get_vault_config() {
            Ok(_) => Ok(true),
            Err(VaultError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create the vault config for a new master password and unlock.
    pub fn initialize(
        &self,
        master: &SecretString,
        confirmation: &SecretString,
        kdf: KdfParams,
    ) -> VaultResult<()> {
        if self.is_initialized()? {
            return Err(VaultError::AlreadyInitialized);
        }
        self.policy.validate(master, confirmation)?;
        kdf.warn_if_weak();

        let salt = generate_salt()?;
        let key = derive(master.expose_secret().as_bytes(), &salt, &kdf)?;
        let config = VaultConfig::new(&salt, verification_hash(&key), kdf);
        self.store.save_vault_config(&config)?;
        info!(generation = %KeyGeneration::from_salt(&salt), "vault initialized");

        self.session.begin(key, salt, Arc::clone(&self.store));
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // UNLOCK / LOCK
    // ═══════════════════════════════════════════════════════════════════════

    /// Unlock with the master password. The session stays Locked on failure.
    pub fn unlock(&self, master: &SecretString) -> VaultResult<()> {
        let config = self.store.get_vault_config()?;
        if let Some(pending) = config.pending_generation()? {
            warn!(%pending, "unfinished master password change; rerun it to resume");
        }

        let salt = config.salt_bytes()?;
        let key = authenticate(
            master.expose_secret().as_bytes(),
            &salt,
            &config.verification_hash,
            &config.kdf,
        )
        .map_err(|e| {
            debug!("unlock rejected");
            e
        })?;

        self.session.begin(key, salt, Arc::clone(&self.store));
        Ok(())
    }

    /// Lock vault (zeroize the key)
    pub fn lock(&self) -> bool {
        self.session.lock(LockReason::Explicit)
    }

    pub fn lock_with(&self, reason: LockReason) -> bool {
        self.session.lock(reason)
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.is_unlocked()
    }

    pub fn time_remaining(&self) -> Duration {
        self.session.time_remaining()
    }

    /// Applies to the running session as well as later unlocks.
    pub fn set_session_timeout(&self, timeout: Duration) {
        self.session.set_timeout(timeout);
    }

    /// Generation of an unfinished master password change, if any.
    pub fn pending_rotation(&self) -> VaultResult<Option<KeyGeneration>> {
        rotation::pending_generation(self.store.as_ref())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CREDENTIAL OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn add_credential(&self, new: NewCredential) -> VaultResult<Credential> {
        if new.title.trim().is_empty() {
            return Err(VaultError::Validation("title is required".into()));
        }
        if new.password.expose_secret().is_empty() {
            return Err(VaultError::Validation("password is required".into()));
        }

        let store = self.session.store()?;
        let generation = self.session.generation()?;
        let (encrypted_password, encrypted_notes) = self.guard(self.session.with_cipher(|c| {
            let password = c.encrypt(new.password.expose_secret())?;
            let notes = encrypt_notes(c, new.notes.as_ref())?;
            Ok((password, notes))
        }))?;

        let record = Credential {
            id: String::new(),
            title: new.title,
            username: new.username,
            encrypted_password,
            encrypted_notes,
            url: new.url,
            category: new
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            key_generation: Some(generation),
            created: None,
            updated: None,
        };

        let created = store.create_credential(&record)?;
        debug!(record_id = %created.id, "credential added");
        Ok(created)
    }

    /// Fetch and decrypt one credential. Nothing decrypted is cached.
    pub fn get_credential(&self, id: &str) -> VaultResult<RevealedCredential> {
        let store = self.session.store()?;
        let record = store.get_credential(id)?;
        self.check_generation(&record)?;

        let (password, notes) = self.guard(self.session.with_cipher(|c| {
            let password = c.decrypt(&record.encrypted_password)?;
            let notes = match &record.encrypted_notes {
                Some(token) => Some(c.decrypt(token)?),
                None => None,
            };
            Ok((
                SecretString::from(password.as_str().to_owned()),
                notes.map(|n| SecretString::from(n.as_str().to_owned())),
            ))
        }))?;

        Ok(RevealedCredential {
            id: record.id,
            title: record.title,
            username: record.username,
            password,
            notes,
            url: record.url,
            category: record.category,
            created: record.created,
            updated: record.updated,
        })
    }

    /// Records as stored; secret fields stay encrypted.
    pub fn list_credentials(&self, search: Option<&str>) -> VaultResult<Vec<Credential>> {
        self.session.store()?.list_credentials(search)
    }

    pub fn update_credential(&self, id: &str, update: CredentialUpdate) -> VaultResult<Credential> {
        let store = self.session.store()?;
        let mut record = store.get_credential(id)?;
        self.check_generation(&record)?;

        if let Some(title) = update.title {
            if title.trim().is_empty() {
                return Err(VaultError::Validation("title is required".into()));
            }
            record.title = title;
        }
        if let Some(username) = update.username {
            record.username = username;
        }
        if let Some(url) = update.url {
            record.url = url;
        }
        if let Some(category) = update.category {
            record.category = if category.trim().is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                category
            };
        }

        if update.password.is_some() || update.notes.is_some() {
            let (password, notes) = self.guard(self.session.with_cipher(|c| {
                let password = match &update.password {
                    Some(p) if p.expose_secret().is_empty() => {
                        return Err(VaultError::Validation("password is required".into()))
                    }
                    Some(p) => Some(c.encrypt(p.expose_secret())?),
                    None => None,
                };
                let notes = match &update.notes {
                    Some(n) => Some(encrypt_notes(c, Some(n))?),
                    None => None,
                };
                Ok((password, notes))
            }))?;

            if let Some(token) = password {
                record.encrypted_password = token;
            }
            if let Some(token) = notes {
                record.encrypted_notes = token;
            }
        }
        record.key_generation = Some(self.session.generation()?);

        let updated = store.update_credential(id, &record)?;
        debug!(record_id = %id, "credential updated");
        Ok(updated)
    }

    pub fn delete_credential(&self, id: &str) -> VaultResult<()> {
        self.session.store()?.delete_credential(id)?;
        debug!(record_id = %id, "credential deleted");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MASTER PASSWORD
    // ═══════════════════════════════════════════════════════════════════════

    /// Re-encrypt everything under a new master password.
    ///
    /// Resumes an unfinished change when `new` matches the staged one.
    pub fn change_master_password(
        &self,
        current: &SecretString,
        new: &SecretString,
        confirmation: &SecretString,
    ) -> VaultResult<RotationReport> {
        let mut coordinator = RotationCoordinator::new(&self.session, &self.policy);
        if let Some(kdf) = self.rotation_kdf {
            coordinator = coordinator.with_kdf(kdf);
        }
        let result = coordinator.rotate(current, new, confirmation);
        self.guard(result)
    }

    /// Lock on errors that leave the key in doubt.
    fn guard<T>(&self, result: VaultResult<T>) -> VaultResult<T> {
        if let Err(e) = &result {
            if e.requires_lock() {
                warn!(error = %e, "locking vault after fatal error");
                self.session.lock(LockReason::Error);
            }
        }
        result
    }

    /// Records tagged with a generation other than the session's were
    /// written by an unfinished rotation.
    fn check_generation(&self, record: &Credential) -> VaultResult<()> {
        let active = self.session.generation()?;
        match &record.key_generation {
            Some(tag) if *tag != active => Err(VaultError::RotationPending {
                generation: tag.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Empty notes are stored as no notes.
fn encrypt_notes(cipher: &CipherService, notes: Option<&SecretString>) -> VaultResult<Option<String>> {
    match notes {
        Some(n) if !n.expose_secret().is_empty() => Ok(Some(cipher.encrypt(n.expose_secret())?)),
        _ => Ok(None),
    }
}
