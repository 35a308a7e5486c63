//! Record store collaborator
//!
//! The vault never talks to a database directly. Everything it persists goes
//! through [`RecordStore`]: credential CRUD, the single vault config record,
//! an operator login and a health check. Calls are blocking request/response.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};
use crate::models::{Credential, VaultConfig};

pub trait RecordStore: Send + Sync {
    /// Connectivity check
    fn health(&self) -> VaultResult<()>;

    /// Obtain a bearer credential for later calls; the store keeps it.
    fn authenticate_operator(&self, identity: &str, secret: &SecretString)
        -> VaultResult<SecretString>;

    fn create_credential(&self, record: &Credential) -> VaultResult<Credential>;

    fn get_credential(&self, id: &str) -> VaultResult<Credential>;

    /// Substring match on title, username, url and category when `search`
    /// is non-empty.
    fn list_credentials(&self, search: Option<&str>) -> VaultResult<Vec<Credential>>;

    fn update_credential(&self, id: &str, record: &Credential) -> VaultResult<Credential>;

    fn delete_credential(&self, id: &str) -> VaultResult<()>;

    /// `NotFound` until the vault has been initialized.
    fn get_vault_config(&self) -> VaultResult<VaultConfig>;

    fn save_vault_config(&self, config: &VaultConfig) -> VaultResult<VaultConfig>;

    fn update_vault_config(&self, id: &str, config: &VaultConfig) -> VaultResult<VaultConfig>;
}

/// Process-local store used by tests and demos.
pub struct MemoryStore {
    operator: Option<(String, SecretString)>,
    credentials: RwLock<BTreeMap<String, Credential>>,
    config: RwLock<Option<VaultConfig>>,
    failing_updates: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            operator: None,
            credentials: RwLock::new(BTreeMap::new()),
            config: RwLock::new(None),
            failing_updates: Mutex::new(HashSet::new()),
        }
    }

    /// Require this identity/secret pair in `authenticate_operator`.
    pub fn with_operator(mut self, identity: &str, secret: &str) -> Self {
        self.operator = Some((identity.to_string(), SecretString::from(secret.to_string())));
        self
    }

    /// Make every `update_credential` for `id` fail with a store error.
    pub fn fail_updates_for(&self, id: &str) {
        self.failing_updates.lock().insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_updates.lock().clear();
    }

    fn matches(record: &Credential, needle: &str) -> bool {
        [&record.title, &record.username, &record.url, &record.category]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn health(&self) -> VaultResult<()> {
        Ok(())
    }

    fn authenticate_operator(
        &self,
        identity: &str,
        secret: &SecretString,
    ) -> VaultResult<SecretString> {
        if let Some((expected_id, expected_secret)) = &self.operator {
            if identity != expected_id
                || secret.expose_secret() != expected_secret.expose_secret()
            {
                return Err(VaultError::OperatorAuthFailed(
                    "invalid identity or secret".into(),
                ));
            }
        }
        Ok(SecretString::from(Uuid::new_v4().to_string()))
    }

    fn create_credential(&self, record: &Credential) -> VaultResult<Credential> {
        let now = Utc::now().to_rfc3339();
        let mut stored = record.clone();
        stored.id = Uuid::new_v4().simple().to_string();
        stored.created = Some(now.clone());
        stored.updated = Some(now);

        self.credentials
            .write()
            .insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    fn get_credential(&self, id: &str) -> VaultResult<Credential> {
        self.credentials
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("credential {}", id)))
    }

    fn list_credentials(&self, search: Option<&str>) -> VaultResult<Vec<Credential>> {
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let records = self.credentials.read();
        Ok(records
            .values()
            .filter(|r| needle.as_deref().map_or(true, |n| Self::matches(r, n)))
            .cloned()
            .collect())
    }

    fn update_credential(&self, id: &str, record: &Credential) -> VaultResult<Credential> {
        if self.failing_updates.lock().contains(id) {
            return Err(VaultError::Store(format!("injected failure updating {}", id)));
        }

        let mut records = self.credentials.write();
        let existing = records
            .get_mut(id)
            .ok_or_else(|| VaultError::NotFound(format!("credential {}", id)))?;

        let created = existing.created.clone();
        *existing = record.clone();
        existing.id = id.to_string();
        existing.created = created;
        existing.updated = Some(Utc::now().to_rfc3339());

        Ok(existing.clone())
    }

    fn delete_credential(&self, id: &str) -> VaultResult<()> {
        self.credentials
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| VaultError::NotFound(format!("credential {}", id)))
    }

    fn get_vault_config(&self) -> VaultResult<VaultConfig> {
        self.config
            .read()
            .clone()
            .ok_or_else(|| VaultError::NotFound("vault not initialized".into()))
    }

    fn save_vault_config(&self, config: &VaultConfig) -> VaultResult<VaultConfig> {
        let mut slot = self.config.write();
        if slot.is_some() {
            return Err(VaultError::Store("vault config already exists".into()));
        }

        let mut stored = config.clone();
        stored.id = Uuid::new_v4().simple().to_string();
        stored.created = Some(Utc::now().to_rfc3339());
        *slot = Some(stored.clone());
        Ok(stored)
    }

    fn update_vault_config(&self, id: &str, config: &VaultConfig) -> VaultResult<VaultConfig> {
        let mut slot = self.config.write();
        match slot.as_mut() {
            Some(existing) if existing.id == id => {
                let created = existing.created.clone();
                *existing = config.clone();
                existing.id = id.to_string();
                existing.created = created;
                Ok(existing.clone())
            }
            _ => Err(VaultError::NotFound(format!("vault config {}", id))),
        }
    }
}
