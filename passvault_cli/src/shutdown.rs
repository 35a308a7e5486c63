//! Signal-driven shutdown.
//!
//! Installs handlers for SIGTERM and SIGINT (Ctrl+C) on a small background
//! thread. When either arrives the vault is locked, zeroing the master key,
//! before the process exits.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use passvault_core::{LockReason, Vault};
use tracing::{debug, info, warn};

use crate::error::CliResult;

/// Exit status after an interrupt
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Spawns the signal watcher. The thread exits the process once a signal
/// has been handled.
pub fn install_signal_handler(vault: Arc<Vault>) -> CliResult<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let handle = thread::Builder::new()
        .name("passvault-signals".into())
        .spawn(move || {
            runtime.block_on(wait_for_signal());
            lock_for_shutdown(&vault);
            eprintln!();
            eprintln!("Vault locked. Bye.");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        })?;

    debug!("signal handler installed");
    Ok(handle)
}

/// Forces the vault to Locked. Returns true if a live key was wiped.
pub fn lock_for_shutdown(vault: &Vault) -> bool {
    let wiped = vault.lock_with(LockReason::Shutdown);
    info!(wiped, "vault locked for shutdown");
    wiped
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    Some(()) = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler, watching Ctrl+C only");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    settle(tokio::signal::ctrl_c().await, "SIGINT (Ctrl+C)").await
}

/// Resolves only for a delivered signal. A handler that failed to register
/// never fires, so the watcher parks instead of shutting the vault down.
async fn settle(result: std::io::Result<()>, signal: &str) {
    match result {
        Ok(()) => info!(signal, "received signal, shutting down"),
        Err(e) => {
            warn!(signal, error = %e, "cannot listen for signal");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passvault_core::{KdfParams, MemoryStore};
    use secrecy::SecretString;
    use std::io;
    use std::time::Duration;

    #[test]
    fn test_lock_for_shutdown_wipes_session() {
        let vault = Vault::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));
        let master = SecretString::from("Tr0ub4dor&3correcthorse".to_string());
        vault
            .initialize(&master, &master, KdfParams::low_memory())
            .unwrap();
        assert!(vault.is_unlocked());

        assert!(lock_for_shutdown(&vault));
        assert!(!vault.is_unlocked());
        assert_eq!(vault.session().last_lock_reason(), Some(LockReason::Shutdown));

        // Second signal finds nothing left to wipe.
        assert!(!lock_for_shutdown(&vault));
    }

    #[tokio::test]
    async fn test_registration_error_is_not_a_signal() {
        let failed = settle(Err(io::Error::other("no signal driver")), "SIGINT");
        let waited = tokio::time::timeout(Duration::from_millis(50), failed).await;
        assert!(waited.is_err(), "a failed registration must never resolve");

        let delivered = settle(Ok(()), "SIGINT");
        assert!(tokio::time::timeout(Duration::from_millis(50), delivered)
            .await
            .is_ok());
    }
}
