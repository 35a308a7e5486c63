//! Master password rotation
//!
//! Changing the master password re-encrypts every stored secret under a key
//! derived from a fresh salt. The store has no transactions, so rotation
//! runs in phases that can be resumed after a crash:
//!
//! 0. stage the new salt and verification hash in `pending_rotation`
//! 1. rewrite each record under the new key, tagged with the new generation
//! 2. promote the pending values and clear `pending_rotation` in one update
//!
//! Until phase 2 the active config is untouched and the old password still
//! unlocks. A rerun with the same new password picks up where the last one
//! stopped; records already carrying the new tag are skipped. Nothing is
//! ever rolled back.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::auth::{authenticate, verification_hash};
use crate::crypto::{derive, generate_salt, CipherService, KdfParams, MasterKey, Salt};
use crate::error::{VaultError, VaultResult};
use crate::models::{Credential, KeyGeneration, PendingRotation, VaultConfig};
use crate::policy::PasswordPolicy;
use crate::session::SessionManager;
use crate::store::RecordStore;

/// Outcome of a completed rotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    /// Generation now active
    pub generation: KeyGeneration,
    /// Records re-encrypted by this run
    pub rewritten: usize,
    /// Records already rewritten by an earlier, interrupted run
    pub skipped: usize,
    /// Whether this run continued a staged rotation
    pub resumed: bool,
    /// False when the session locked before it could switch keys. The new
    /// password is active either way.
    pub session_rekeyed: bool,
}

/// Drives a master password change for one unlocked session.
pub struct RotationCoordinator<'a> {
    session: &'a SessionManager,
    policy: &'a PasswordPolicy,
    kdf: Option<KdfParams>,
}

struct Target {
    key: MasterKey,
    salt: Salt,
    generation: KeyGeneration,
    resumed: bool,
}

impl<'a> RotationCoordinator<'a> {
    pub fn new(session: &'a SessionManager, policy: &'a PasswordPolicy) -> Self {
        Self {
            session,
            policy,
            kdf: None,
        }
    }

    /// Argon2 parameters for the new generation. Defaults to the current
    /// vault's parameters. Ignored when resuming.
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = Some(kdf);
        self
    }

    pub fn rotate(
        &self,
        current: &SecretString,
        new: &SecretString,
        confirmation: &SecretString,
    ) -> VaultResult<RotationReport> {
        let store = self.session.store()?;
        let config = store.get_vault_config()?;

        // Step 1: the session alone is not enough, re-check the password.
        let active_salt = config.salt_bytes()?;
        let active_generation = KeyGeneration::from_salt(&active_salt);
        let old_key = authenticate(
            current.expose_secret().as_bytes(),
            &active_salt,
            &config.verification_hash,
            &config.kdf,
        )?;
        let old_cipher = CipherService::new(old_key);

        // Step 2
        self.policy.validate(new, confirmation)?;

        // Steps 3 and phase 0
        let (config, target) = self.stage(store.as_ref(), config, new)?;
        let new_cipher = CipherService::new(duplicate(&target.key));

        info!(
            from = %active_generation,
            to = %target.generation,
            resumed = target.resumed,
            "rotation started"
        );

        // Phase 1
        let (rewritten, skipped) = rewrite_all(
            store.as_ref(),
            &old_cipher,
            &new_cipher,
            &active_generation,
            &target.generation,
        )?;

        // Phase 2
        publish(store.as_ref(), config)?;
        info!(generation = %target.generation, rewritten, skipped, "rotation published");

        // Step 7: the new config is committed, so a lock that raced in
        // after publish is reported, not returned as a failure.
        let session_rekeyed = match self.session.rekey(target.key, target.salt) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "session locked after publish; unlock with the new password");
                false
            }
        };

        Ok(RotationReport {
            generation: target.generation,
            rewritten,
            skipped,
            resumed: target.resumed,
            session_rekeyed,
        })
    }

    fn stage(
        &self,
        store: &dyn RecordStore,
        mut config: VaultConfig,
        new: &SecretString,
    ) -> VaultResult<(VaultConfig, Target)> {
        if let Some(pending) = &config.pending_rotation {
            let salt = pending.salt_bytes()?;
            let key = authenticate(
                new.expose_secret().as_bytes(),
                &salt,
                &pending.verification_hash,
                &pending.kdf,
            )
            .map_err(|e| {
                warn!("new password does not match the staged rotation");
                e
            })?;

            let target = Target {
                key,
                salt,
                generation: KeyGeneration::from_salt(&salt),
                resumed: true,
            };
            return Ok((config, target));
        }

        let kdf = self.kdf.unwrap_or(config.kdf);
        kdf.warn_if_weak();

        let salt = generate_salt()?;
        let key = derive(new.expose_secret().as_bytes(), &salt, &kdf)?;
        config.pending_rotation = Some(PendingRotation::new(&salt, verification_hash(&key), kdf));

        let staged = store.update_vault_config(&config.id, &config)?;
        let generation = KeyGeneration::from_salt(&salt);
        debug!(%generation, "rotation staged");

        let target = Target {
            key,
            salt,
            generation,
            resumed: false,
        };
        Ok((staged, target))
    }
}

/// Inspect a vault for an unfinished rotation without unlocking it.
pub fn pending_generation(store: &dyn RecordStore) -> VaultResult<Option<KeyGeneration>> {
    store.get_vault_config()?.pending_generation()
}

fn rewrite_all(
    store: &dyn RecordStore,
    old: &CipherService,
    new: &CipherService,
    active: &KeyGeneration,
    target: &KeyGeneration,
) -> VaultResult<(usize, usize)> {
    let records = store.list_credentials(None)?;
    let total = records.len();
    let mut rewritten = 0;
    let mut skipped = 0;

    for record in records {
        if record.key_generation.as_ref() == Some(target) {
            skipped += 1;
            continue;
        }

        let result = if record.is_in_generation(active, active) {
            reencrypt(&record, old, new, target)
                .and_then(|updated| store.update_credential(&record.id, &updated))
        } else {
            Err(VaultError::Crypto(format!(
                "record belongs to unknown key generation {}",
                record
                    .key_generation
                    .as_ref()
                    .map(KeyGeneration::as_str)
                    .unwrap_or_default()
            )))
        };

        if let Err(e) = result {
            error!(
                record_id = %record.id,
                error = %e,
                rewritten,
                total,
                "rotation stopped; rerun with the same new password to resume"
            );
            return Err(VaultError::rotation(record.id, e));
        }

        rewritten += 1;
        debug!(record_id = %record.id, done = rewritten + skipped, total, "record rewritten");
    }

    Ok((rewritten, skipped))
}

fn reencrypt(
    record: &Credential,
    old: &CipherService,
    new: &CipherService,
    target: &KeyGeneration,
) -> VaultResult<Credential> {
    let mut updated = record.clone();

    let password = old.decrypt(&record.encrypted_password)?;
    updated.encrypted_password = new.encrypt(&password)?;

    updated.encrypted_notes = match &record.encrypted_notes {
        Some(token) => {
            let notes = old.decrypt(token)?;
            Some(new.encrypt(&notes)?)
        }
        None => None,
    };

    updated.key_generation = Some(target.clone());
    Ok(updated)
}

fn publish(store: &dyn RecordStore, mut config: VaultConfig) -> VaultResult<VaultConfig> {
    if !config.promote_pending() {
        return Err(VaultError::Store("no staged rotation to publish".into()));
    }
    let id = config.id.clone();
    store.update_vault_config(&id, &config)
}

fn duplicate(key: &MasterKey) -> MasterKey {
    MasterKey::from_bytes(*key.expose())
}
