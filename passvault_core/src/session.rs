//! Unlocked-session state machine
//!
//! A [`SessionManager`] is the only owner of the live master key. It is
//! either Locked or Unlocked; every transition into Locked wipes the key
//! first. Readers go through guarded accessors that refresh the sliding
//! idle timer, and an expired session is locked by whichever access notices
//! it first.
//!
//! Transitions take the write side of one `RwLock`; encrypt/decrypt calls
//! only take the read side, so they run concurrently with each other but
//! never observe a key mid-wipe.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::crypto::{CipherService, MasterKey, Salt};
use crate::error::{VaultError, VaultResult};
use crate::models::KeyGeneration;
use crate::store::RecordStore;

/// Default idle timeout (5 minutes)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Why the session went back to Locked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    /// User asked for it
    Explicit,
    /// Idle longer than the timeout
    Timeout,
    /// Termination signal or process teardown
    Shutdown,
    /// Fatal error elsewhere in the program
    Error,
}

/// Coarse state for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Locked,
    Unlocked,
}

struct Unlocked {
    cipher: CipherService,
    salt: Salt,
    generation: KeyGeneration,
    store: Arc<dyn RecordStore>,
    last_activity: Mutex<Instant>,
}

impl Unlocked {
    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

enum State {
    Locked { last_reason: Option<LockReason> },
    Unlocked(Unlocked),
}

/// Single owned session for the process. Pass it down explicitly.
pub struct SessionManager {
    state: RwLock<State>,
    timeout: Mutex<Duration>,
}

impl SessionManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: RwLock::new(State::Locked { last_reason: None }),
            timeout: Mutex::new(timeout),
        }
    }

    pub fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    /// Change the idle timeout of the running session. The idle clock is
    /// not reset, so a shorter timeout can expire it on the next access.
    pub fn set_timeout(&self, timeout: Duration) {
        let _state = self.state.write();
        *self.timeout.lock() = timeout;
        info!(timeout_secs = timeout.as_secs(), "session timeout changed");
    }

    /// Locked → Unlocked with a key that has already been authenticated.
    ///
    /// An existing unlocked session is replaced and its key wiped.
    pub fn begin(&self, key: MasterKey, salt: Salt, store: Arc<dyn RecordStore>) {
        let unlocked = Unlocked {
            cipher: CipherService::new(key),
            generation: KeyGeneration::from_salt(&salt),
            salt,
            store,
            last_activity: Mutex::new(Instant::now()),
        };

        let mut state = self.state.write();
        let generation = unlocked.generation.clone();
        if let State::Unlocked(previous) = std::mem::replace(&mut *state, State::Unlocked(unlocked)) {
            wipe(previous);
        }
        info!(%generation, timeout_secs = self.timeout().as_secs(), "vault unlocked");
    }

    /// Unlocked → Locked. Returns true if a live key was wiped.
    pub fn lock(&self, reason: LockReason) -> bool {
        let mut state = self.state.write();
        transition_locked(&mut state, reason)
    }

    /// Whether the session is usable right now. Expires it if idle too long.
    pub fn is_unlocked(&self) -> bool {
        self.access(|_| Ok(())).is_ok()
    }

    pub fn state(&self) -> SessionState {
        if self.is_unlocked() {
            SessionState::Unlocked
        } else {
            SessionState::Locked
        }
    }

    pub fn last_lock_reason(&self) -> Option<LockReason> {
        match &*self.state.read() {
            State::Locked { last_reason } => *last_reason,
            State::Unlocked(_) => None,
        }
    }

    /// Remaining idle time, clamped to zero. Does not refresh or expire.
    pub fn time_remaining(&self) -> Duration {
        match &*self.state.read() {
            State::Unlocked(u) => self.timeout().saturating_sub(u.idle_for()),
            State::Locked { .. } => Duration::ZERO,
        }
    }

    /// Run `f` with the live cipher. Refreshes the idle timer.
    pub fn with_cipher<T>(
        &self,
        f: impl FnOnce(&CipherService) -> VaultResult<T>,
    ) -> VaultResult<T> {
        self.access(|u| f(&u.cipher))
    }

    /// Store handle of the unlocked session. Refreshes the idle timer.
    pub fn store(&self) -> VaultResult<Arc<dyn RecordStore>> {
        self.access(|u| Ok(Arc::clone(&u.store)))
    }

    pub fn salt(&self) -> VaultResult<Salt> {
        self.access(|u| Ok(u.salt))
    }

    pub fn generation(&self) -> VaultResult<KeyGeneration> {
        self.access(|u| Ok(u.generation.clone()))
    }

    /// Swap in a new key and salt after a master password change.
    /// The old key is wiped before this returns.
    pub fn rekey(&self, key: MasterKey, salt: Salt) -> VaultResult<()> {
        let mut state = self.state.write();
        match &mut *state {
            State::Unlocked(u) => {
                let old = std::mem::replace(&mut u.cipher, CipherService::new(key));
                retire(old);
                u.salt = salt;
                u.generation = KeyGeneration::from_salt(&salt);
                u.touch();
                info!(generation = %u.generation, "session rekeyed");
                Ok(())
            }
            State::Locked { .. } => Err(VaultError::VaultLocked),
        }
    }

    fn access<T>(&self, f: impl FnOnce(&Unlocked) -> VaultResult<T>) -> VaultResult<T> {
        {
            let state = self.state.read();
            match &*state {
                State::Unlocked(u) if u.idle_for() <= self.timeout() => {
                    u.touch();
                    return f(u);
                }
                State::Unlocked(_) => {}
                State::Locked { .. } => return Err(VaultError::VaultLocked),
            }
        }

        self.expire();
        Err(VaultError::VaultLocked)
    }

    fn expire(&self) {
        let mut state = self.state.write();
        // Re-check: another thread may have touched or locked it meanwhile.
        let timeout = self.timeout();
        let idle = matches!(&*state, State::Unlocked(u) if u.idle_for() > timeout);
        if idle {
            debug!(timeout_secs = timeout.as_secs(), "session idle past timeout");
            transition_locked(&mut state, LockReason::Timeout);
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        transition_locked(self.state.get_mut(), LockReason::Shutdown);
    }
}

fn transition_locked(state: &mut State, reason: LockReason) -> bool {
    let previous = std::mem::replace(
        state,
        State::Locked {
            last_reason: Some(reason),
        },
    );
    match previous {
        State::Unlocked(u) => {
            wipe(u);
            info!(?reason, "vault locked");
            true
        }
        State::Locked { .. } => false,
    }
}

fn wipe(unlocked: Unlocked) {
    retire(unlocked.cipher);
}

fn retire(mut cipher: CipherService) {
    cipher.secure_clear();
    debug_assert!(cipher.is_cleared());
    #[cfg(test)]
    wipe_log::record(cipher.is_cleared());
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;
    use crate::store::MemoryStore;
    use std::thread;

    fn unlocked(timeout: Duration, byte: u8) -> SessionManager {
        let session = SessionManager::new(timeout);
        session.begin(
            MasterKey::from_bytes([byte; KEY_LEN]),
            [byte; 16],
            Arc::new(MemoryStore::new()),
        );
        session
    }

    #[test]
    fn test_starts_locked() {
        let session = SessionManager::default();
        assert_eq!(session.state(), SessionState::Locked);
        assert!(matches!(session.store(), Err(VaultError::VaultLocked)));
        assert!(matches!(
            session.with_cipher(|c| c.encrypt("x")),
            Err(VaultError::VaultLocked)
        ));
        assert_eq!(session.time_remaining(), Duration::ZERO);
        assert!(!session.lock(LockReason::Explicit));
    }

    #[test]
    fn test_unlock_use_lock() {
        let session = unlocked(DEFAULT_TIMEOUT, 1);
        assert!(session.is_unlocked());

        let token = session.with_cipher(|c| c.encrypt("hunter2")).unwrap();
        let plain = session.with_cipher(|c| c.decrypt(&token)).unwrap();
        assert_eq!(plain.as_str(), "hunter2");
        assert_eq!(session.salt().unwrap(), [1u8; 16]);

        assert!(session.lock(LockReason::Explicit));
        assert_eq!(session.last_lock_reason(), Some(LockReason::Explicit));
        assert!(matches!(
            session.with_cipher(|c| c.decrypt(&token)),
            Err(VaultError::VaultLocked)
        ));
    }

    #[test]
    fn test_idle_timeout_locks_on_next_access() {
        let session = unlocked(Duration::from_millis(30), 2);
        thread::sleep(Duration::from_millis(80));

        // Reporting does not expire the session by itself.
        assert_eq!(session.time_remaining(), Duration::ZERO);
        assert_eq!(session.last_lock_reason(), None);

        assert!(matches!(session.salt(), Err(VaultError::VaultLocked)));
        assert_eq!(session.last_lock_reason(), Some(LockReason::Timeout));
        assert_eq!(session.state(), SessionState::Locked);
    }

    #[test]
    fn test_activity_slides_expiry() {
        let session = unlocked(Duration::from_millis(300), 3);
        for _ in 0..4 {
            thread::sleep(Duration::from_millis(100));
            session.with_cipher(|c| c.encrypt("ping")).unwrap();
        }
        assert!(session.is_unlocked());
        assert!(session.time_remaining() > Duration::from_millis(100));
    }

    #[test]
    fn test_rekey_switches_cipher() {
        let session = unlocked(DEFAULT_TIMEOUT, 4);
        let old_token = session.with_cipher(|c| c.encrypt("secret")).unwrap();
        let old_generation = session.generation().unwrap();

        session
            .rekey(MasterKey::from_bytes([5u8; KEY_LEN]), [5u8; 16])
            .unwrap();

        assert_ne!(session.generation().unwrap(), old_generation);
        assert!(matches!(
            session.with_cipher(|c| c.decrypt(&old_token)),
            Err(VaultError::Authentication)
        ));

        session.lock(LockReason::Explicit);
        assert!(matches!(
            session.rekey(MasterKey::from_bytes([6u8; KEY_LEN]), [6u8; 16]),
            Err(VaultError::VaultLocked)
        ));
    }

    #[test]
    fn test_second_begin_replaces_first() {
        let session = unlocked(DEFAULT_TIMEOUT, 7);
        let token = session.with_cipher(|c| c.encrypt("a")).unwrap();

        session.begin(
            MasterKey::from_bytes([8u8; KEY_LEN]),
            [8u8; 16],
            Arc::new(MemoryStore::new()),
        );
        assert!(session.with_cipher(|c| c.decrypt(&token)).is_err());
    }

    #[test]
    fn test_lock_races_with_readers() {
        let session = Arc::new(unlocked(DEFAULT_TIMEOUT, 9));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let s = Arc::clone(&session);
                thread::spawn(move || {
                    for _ in 0..200 {
                        match s.with_cipher(|c| c.encrypt("x")) {
                            Ok(_) | Err(VaultError::VaultLocked) => {}
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(5));
        session.lock(LockReason::Shutdown);

        for r in readers {
            r.join().unwrap();
        }
        assert!(!session.is_unlocked());
    }

    #[test]
    fn test_every_lock_path_zeroes_the_key() {
        wipe_log::take();

        // Explicit lock
        let session = unlocked(DEFAULT_TIMEOUT, 10);
        session.lock(LockReason::Explicit);
        assert_eq!(wipe_log::take(), [true]);

        // Idle timeout, noticed on access
        let session = unlocked(Duration::from_millis(20), 11);
        thread::sleep(Duration::from_millis(60));
        assert!(!session.is_unlocked());
        assert_eq!(wipe_log::take(), [true]);

        // Rekey retires the old key and keeps the session open
        let session = unlocked(DEFAULT_TIMEOUT, 12);
        session
            .rekey(MasterKey::from_bytes([13u8; KEY_LEN]), [13u8; 16])
            .unwrap();
        assert_eq!(wipe_log::take(), [true]);
        assert!(session.is_unlocked());

        // Dropping an unlocked session
        drop(session);
        assert_eq!(wipe_log::take(), [true]);

        // Already locked: nothing to wipe
        let session = SessionManager::default();
        session.lock(LockReason::Explicit);
        drop(session);
        assert!(wipe_log::take().is_empty());
    }

    #[test]
    fn test_shorter_timeout_applies_to_running_session() {
        let session = unlocked(DEFAULT_TIMEOUT, 14);
        thread::sleep(Duration::from_millis(60));
        assert!(session.is_unlocked());

        session.set_timeout(Duration::from_millis(20));
        assert_eq!(session.timeout(), Duration::from_millis(20));
        thread::sleep(Duration::from_millis(60));
        assert!(!session.is_unlocked());
        assert_eq!(session.last_lock_reason(), Some(LockReason::Timeout));
    }
}
