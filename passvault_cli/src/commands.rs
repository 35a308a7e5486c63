//! PassVault CLI - Command implementations
//!
//! Shared by the one-shot subcommands and the interactive shell.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use passvault_core::{
    generate_password, CredentialUpdate, LockReason, NewCredential, RecordStore, RevealedCredential,
    RotationReport, Vault, VaultError,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info};

use crate::clipboard::{self, ClipboardLease};
use crate::config::LocalConfig;
use crate::error::{CliError, CliResult};
use crate::pocketbase::PocketBaseStore;
use crate::shutdown;
use crate::ui;

/// Environment variable supplying the store operator password
pub const OPERATOR_SECRET_ENV: &str = "PASSVAULT_OPERATOR_SECRET";

/// Master password attempts before giving up
pub const MAX_UNLOCK_ATTEMPTS: u32 = 3;

// ═══════════════════════════════════════════════════════════════════════════
// SESSION SETUP
// ═══════════════════════════════════════════════════════════════════════════

/// Health-check the store and log in as the operator.
pub fn connect(store_url: &str, identity: &str) -> CliResult<Arc<dyn RecordStore>> {
    let store = PocketBaseStore::new(store_url)?;
    store.health()?;
    debug!(store = store.base_url(), "record store reachable");

    let secret = operator_secret(identity)?;
    store.authenticate_operator(identity, &secret)?;
    Ok(Arc::new(store))
}

fn operator_secret(identity: &str) -> CliResult<SecretString> {
    match std::env::var(OPERATOR_SECRET_ENV) {
        Ok(value) if !value.is_empty() => Ok(SecretString::from(value)),
        _ => ui::prompt_required_secret(&format!("Store password for {}", identity)),
    }
}

/// Connect, install the signal handler and unlock.
pub fn open_vault(config: &LocalConfig) -> CliResult<Arc<Vault>> {
    if !config.initialized {
        return Err(CliError::NotInitialized);
    }

    let store = connect(&config.store_url, &config.operator_identity)?;
    let vault = Arc::new(Vault::new(store, config.session_timeout()).with_kdf(config.kdf));
    shutdown::install_signal_handler(Arc::clone(&vault))?;

    unlock_interactive(&vault)?;
    lock_on_error(&vault, warn_pending_rotation(&vault))?;
    Ok(vault)
}

fn warn_pending_rotation(vault: &Vault) -> CliResult<()> {
    if let Some(generation) = vault.pending_rotation()? {
        ui::warn(&format!(
            "A master password change to generation {} is unfinished. Run `passvault rotate` with the same new password to finish it.",
            generation
        ));
    }
    Ok(())
}

/// Lock with [`LockReason::Error`] if `result` failed, then pass it on.
pub fn lock_on_error<T>(vault: &Vault, result: CliResult<T>) -> CliResult<T> {
    if let Err(e) = &result {
        if e.is_security_critical() {
            error!(error = %e, "security-critical failure, locking vault");
        } else {
            debug!(error = %e, "command failed, locking vault");
        }
        vault.lock_with(LockReason::Error);
    }
    result
}

/// Run `f` on an unlocked vault and leave the vault Locked afterwards on
/// every path.
pub fn with_session<T>(vault: &Vault, f: impl FnOnce(&Vault) -> CliResult<T>) -> CliResult<T> {
    let result = lock_on_error(vault, f(vault));
    if result.is_ok() {
        vault.lock();
    }
    result
}

/// Prompt for the master password until it unlocks or attempts run out.
pub fn unlock_interactive(vault: &Vault) -> CliResult<()> {
    for attempt in 1..=MAX_UNLOCK_ATTEMPTS {
        let master = ui::prompt_required_secret("Master password")?;
        match vault.unlock(&master) {
            Ok(()) => return Ok(()),
            Err(VaultError::AuthFailed) => {
                ui::error(&VaultError::AuthFailed.public_message());
                debug!(attempt, "unlock attempt failed");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(CliError::TooManyAttempts)
}

// ═══════════════════════════════════════════════════════════════════════════
// INIT
// ═══════════════════════════════════════════════════════════════════════════

/// Set up the store connection and create (or join) the vault.
pub fn init(config_path: &Path, mut config: LocalConfig) -> CliResult<()> {
    ui::section("PassVault setup");

    config.store_url = ui::prompt_default("Record store URL", &config.store_url)?
        .trim_end_matches('/')
        .to_string();
    config.operator_identity = if config.operator_identity.is_empty() {
        ui::prompt("Store admin identity (email)")?
    } else {
        ui::prompt_default("Store admin identity (email)", &config.operator_identity)?
    };
    config.validate()?;

    ui::info("Testing connection to the record store...");
    let store = connect(&config.store_url, &config.operator_identity)?;
    ui::success("Connected and authenticated");

    let vault = Vault::new(store, config.session_timeout()).with_kdf(config.kdf);
    if vault.is_initialized()? {
        ui::info("This store already holds a vault; verifying the master password.");
        unlock_interactive(&vault)?;
        ui::success("Joined the existing vault");
    } else {
        let policy = vault.policy();
        let master = ui::prompt_secret(&format!(
            "Create master password (min {} chars)",
            policy.min_length
        ))?;
        let confirmation = ui::prompt_secret("Confirm master password")?;
        vault.initialize(&master, &confirmation, config.kdf)?;
        ui::success("Vault initialized");
        ui::warn("Remember your master password - it cannot be recovered!");
    }
    vault.lock();

    config.initialized = true;
    config.save(config_path)?;
    ui::key_value("Config", &config_path.display().to_string());
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// CREDENTIALS
// ═══════════════════════════════════════════════════════════════════════════

/// Fields for `add`
#[derive(Debug, Default)]
pub struct AddOptions {
    pub title: String,
    pub username: String,
    pub password: Option<SecretString>,
    pub generate: bool,
    pub length: usize,
    pub symbols: bool,
    pub url: String,
    pub notes: Option<String>,
    pub category: Option<String>,
}

/// Returns the stored password so the caller can offer to copy it.
pub fn add(vault: &Vault, opts: AddOptions) -> CliResult<SecretString> {
    let password = match opts.password {
        Some(p) => p,
        None if opts.generate => {
            let generated = generate_password(opts.length, opts.symbols)?;
            println!("🔑 Generated password: {}", generated.expose_secret());
            generated
        }
        None => ui::prompt_required_secret("Password")?,
    };

    let created = vault.add_credential(NewCredential {
        title: opts.title,
        username: opts.username,
        password: SecretString::from(password.expose_secret().to_string()),
        notes: opts.notes.map(SecretString::from),
        url: opts.url,
        category: opts.category,
    })?;
    ui::success(&format!("Credential saved (ID: {})", created.id));
    Ok(password)
}

pub fn show(vault: &Vault, id: &str, reveal: bool) -> CliResult<RevealedCredential> {
    let credential = vault.get_credential(id)?;
    ui::credential_card(&credential, reveal);
    Ok(credential)
}

pub fn list(vault: &Vault, search: Option<&str>) -> CliResult<()> {
    let records = vault.list_credentials(search)?;
    match search {
        Some(term) if !term.trim().is_empty() => ui::section(&format!("Results for \"{}\"", term)),
        _ => ui::section("Credentials"),
    }
    ui::credential_table(&records);
    Ok(())
}

pub fn edit(vault: &Vault, id: &str, update: CredentialUpdate) -> CliResult<()> {
    vault.update_credential(id, update)?;
    ui::success("Credential updated");
    Ok(())
}

pub fn delete(vault: &Vault, id: &str, assume_yes: bool) -> CliResult<()> {
    if !assume_yes && !ui::confirm(&format!("Delete credential {}?", id))? {
        return Err(CliError::Cancelled);
    }
    vault.delete_credential(id)?;
    ui::success("Credential deleted");
    Ok(())
}

/// No vault access needed.
pub fn generate(length: usize, symbols: bool) -> CliResult<SecretString> {
    let password = generate_password(length, symbols)?;
    println!("{}", password.expose_secret());
    Ok(password)
}

// ═══════════════════════════════════════════════════════════════════════════
// CLIPBOARD
// ═══════════════════════════════════════════════════════════════════════════

/// Copy `secret` and tell the user when it will be cleared.
pub fn copy_to_clipboard(what: &str, secret: &str, timeout: Duration) -> CliResult<ClipboardLease> {
    let lease = clipboard::copy(secret, timeout)?;
    ui::success(&format!(
        "{} copied to clipboard (cleared in {}s)",
        what,
        timeout.as_secs()
    ));
    Ok(lease)
}

/// One-shot commands keep the process alive until the clipboard is cleared.
pub fn hold_clipboard(lease: ClipboardLease) {
    ui::info("Waiting to clear the clipboard, Ctrl+C to quit now...");
    lease.wait();
    ui::info("Clipboard cleared");
}

// ═══════════════════════════════════════════════════════════════════════════
// SETTINGS
// ═══════════════════════════════════════════════════════════════════════════

/// Validate, persist and apply `updated`. The session timeout takes effect
/// on the running session at once. `config` is left alone on error.
pub fn update_settings(
    vault: &Vault,
    config: &mut LocalConfig,
    updated: LocalConfig,
    config_path: &Path,
) -> CliResult<()> {
    updated.validate()?;
    updated.save(config_path)?;

    if updated.session_timeout_minutes != config.session_timeout_minutes {
        vault.set_session_timeout(updated.session_timeout());
    }
    *config = updated;
    info!(path = %config_path.display(), "settings updated");
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// MASTER PASSWORD
// ═══════════════════════════════════════════════════════════════════════════

pub fn rotate(vault: &Vault) -> CliResult<RotationReport> {
    ui::section("Change master password");
    let current = ui::prompt_required_secret("Current master password")?;
    let new = ui::prompt_secret(&format!(
        "New master password (min {} chars)",
        vault.policy().min_length
    ))?;
    let confirmation = ui::prompt_secret("Confirm new master password")?;

    ui::info("Re-encrypting every credential, do not interrupt...");
    let report = vault.change_master_password(&current, &new, &confirmation)?;
    print_report(&report);
    Ok(report)
}

pub fn print_report(report: &RotationReport) {
    ui::success("Master password changed");
    ui::key_value("Generation", report.generation.as_str());
    ui::key_value("Rewritten", &report.rewritten.to_string());
    if report.resumed {
        ui::key_value("Resumed", &format!("yes, {} already done", report.skipped));
    }
    if !report.session_rekeyed {
        ui::warn("The session locked during the change. Unlock with the new master password.");
    }
}

pub fn status(vault: &Vault, config: &LocalConfig) -> CliResult<()> {
    ui::section("Status");
    ui::key_value("Store", &config.store_url);
    ui::key_value("Operator", &config.operator_identity);
    if vault.is_unlocked() {
        let remaining = vault.time_remaining();
        ui::key_value("Session", "unlocked");
        ui::key_value(
            "Locks in",
            &format!("{}m {:02}s", remaining.as_secs() / 60, remaining.as_secs() % 60),
        );
    } else {
        ui::key_value("Session", "locked");
    }
    if let Some(generation) = vault.pending_rotation()? {
        ui::key_value("Pending", &format!("rotation to {}", generation));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use passvault_core::{KdfParams, MemoryStore};
    use tempfile::tempdir;

    const MASTER: &str = "Tr0ub4dor&3correcthorse";

    fn unlocked_vault() -> Vault {
        let vault = Vault::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
        let master = SecretString::from(MASTER.to_string());
        vault
            .initialize(&master, &master, KdfParams::low_memory())
            .unwrap();
        vault
    }

    #[test]
    fn test_session_locks_after_success() {
        let vault = unlocked_vault();
        let listed = with_session(&vault, |v| Ok(v.list_credentials(None)?.len())).unwrap();

        assert_eq!(listed, 0);
        assert!(!vault.is_unlocked());
        assert_eq!(vault.session().last_lock_reason(), Some(LockReason::Explicit));
    }

    #[test]
    fn test_session_locks_on_every_error() {
        // Store failure after unlock
        let vault = unlocked_vault();
        let result = with_session(&vault, |v| -> CliResult<()> {
            v.get_credential("missing")?;
            Ok(())
        });
        assert!(matches!(result, Err(CliError::Vault(VaultError::NotFound(_)))));
        assert!(!vault.is_unlocked());
        assert_eq!(vault.session().last_lock_reason(), Some(LockReason::Error));

        // Terminal I/O failure in the middle of a command
        let vault = unlocked_vault();
        let result: CliResult<()> = with_session(&vault, |_| {
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stdin closed").into())
        });
        assert!(matches!(result, Err(CliError::Io(_))));
        assert!(!vault.is_unlocked());
        assert_eq!(vault.session().last_lock_reason(), Some(LockReason::Error));
    }

    #[test]
    fn test_lock_on_error_leaves_success_unlocked() {
        let vault = unlocked_vault();
        lock_on_error(&vault, Ok(())).unwrap();
        assert!(vault.is_unlocked());

        let failed: CliResult<()> = Err(VaultError::Store("connection reset".into()).into());
        assert!(lock_on_error(&vault, failed).is_err());
        assert!(!vault.is_unlocked());
    }

    #[test]
    fn test_update_settings_saves_and_applies_timeout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let vault = unlocked_vault();
        let mut config = LocalConfig::default();

        let updated = LocalConfig {
            session_timeout_minutes: 2,
            password_length: 32,
            default_category: "work".into(),
            ..config.clone()
        };
        update_settings(&vault, &mut config, updated.clone(), &path).unwrap();

        assert_eq!(config, updated);
        assert_eq!(LocalConfig::load(&path).unwrap(), updated);
        assert_eq!(vault.session().timeout(), Duration::from_secs(120));
        assert!(vault.is_unlocked());
    }

    #[test]
    fn test_invalid_settings_change_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let vault = unlocked_vault();
        let mut config = LocalConfig::default();

        let updated = LocalConfig {
            session_timeout_minutes: 0,
            ..config.clone()
        };
        assert!(matches!(
            update_settings(&vault, &mut config, updated, &path),
            Err(CliError::Config(_))
        ));
        assert_eq!(config, LocalConfig::default());
        assert!(!path.exists());
        assert_eq!(vault.session().timeout(), Duration::from_secs(60));
    }
}
