//! PassVault CLI - Clipboard
//!
//! Copies a secret to the system clipboard and takes it back off after a
//! timeout. One background thread per copy owns the clipboard handle for
//! the whole lifetime of the secret. When the timeout passes, or the
//! [`ClipboardLease`] is released, the thread clears the clipboard unless
//! something else has been copied over it meanwhile.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{CliError, CliResult};

/// Minimal clipboard surface the lease thread needs
pub trait ClipboardBackend {
    fn set_text(&mut self, text: &str) -> CliResult<()>;

    fn get_text(&mut self) -> CliResult<Zeroizing<String>>;

    fn clear(&mut self) -> CliResult<()>;
}

/// The desktop clipboard via `arboard`
pub struct SystemClipboard(arboard::Clipboard);

impl SystemClipboard {
    pub fn open() -> CliResult<Self> {
        arboard::Clipboard::new().map(Self).map_err(clipboard_error)
    }
}

impl ClipboardBackend for SystemClipboard {
    fn set_text(&mut self, text: &str) -> CliResult<()> {
        self.0.set_text(text).map_err(clipboard_error)
    }

    fn get_text(&mut self) -> CliResult<Zeroizing<String>> {
        self.0.get_text().map(Zeroizing::new).map_err(clipboard_error)
    }

    fn clear(&mut self) -> CliResult<()> {
        self.0.clear().map_err(clipboard_error)
    }
}

fn clipboard_error(e: arboard::Error) -> CliError {
    CliError::Clipboard(e.to_string())
}

/// A secret currently on the clipboard. Dropping the lease clears it.
pub struct ClipboardLease {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl ClipboardLease {
    /// Block until the timeout has cleared the clipboard.
    pub fn wait(self) {
        let Self { stop, handle } = self;
        join(handle);
        drop(stop);
    }

    /// Clear now instead of waiting for the timeout.
    pub fn clear_now(self) {
        let Self { stop, handle } = self;
        // Fails only when the thread already cleared and exited.
        if stop.send(()).is_err() {
            debug!("clipboard already cleared");
        }
        join(handle);
    }
}

fn join(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        warn!("clipboard thread panicked");
    }
}

/// Put `secret` on the system clipboard for `timeout`.
pub fn copy(secret: &str, timeout: Duration) -> CliResult<ClipboardLease> {
    copy_with(SystemClipboard::open, secret, timeout)
}

/// Like [`copy`], with the backend built by `open` on the lease thread.
pub fn copy_with<B, F>(open: F, secret: &str, timeout: Duration) -> CliResult<ClipboardLease>
where
    B: ClipboardBackend,
    F: FnOnce() -> CliResult<B> + Send + 'static,
{
    let secret = Zeroizing::new(secret.to_string());
    let (ready_tx, ready_rx) = mpsc::channel::<CliResult<()>>();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    let handle = thread::Builder::new()
        .name("passvault-clipboard".into())
        .spawn(move || {
            let mut clipboard = match open().and_then(|mut c| c.set_text(&secret).map(|()| c)) {
                Ok(c) => c,
                Err(e) => {
                    // The caller is blocked on this channel until we answer.
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            match stop_rx.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => debug!("clipboard timeout reached"),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => debug!("clipboard lease released"),
            }
            clear_if_unchanged(&mut clipboard, &secret);
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => {
            debug!(timeout_secs = timeout.as_secs(), "secret copied to clipboard");
            Ok(ClipboardLease {
                stop: stop_tx,
                handle,
            })
        }
        Ok(Err(e)) => {
            join(handle);
            Err(e)
        }
        Err(_) => {
            join(handle);
            Err(CliError::Clipboard("clipboard thread exited early".into()))
        }
    }
}

/// Returns true if the clipboard still held `secret` and was cleared.
fn clear_if_unchanged<B: ClipboardBackend>(clipboard: &mut B, secret: &str) -> bool {
    match clipboard.get_text() {
        Ok(current) if current.as_str() == secret => match clipboard.clear() {
            Ok(()) => {
                debug!("clipboard cleared");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to clear clipboard");
                false
            }
        },
        Ok(_) => {
            debug!("clipboard changed since copy, leaving it alone");
            false
        }
        // Empty clipboards report an error on some platforms.
        Err(e) => {
            debug!(error = %e, "clipboard unreadable, nothing to clear");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct FakeClipboard(Arc<Mutex<Option<String>>>);

    impl FakeClipboard {
        fn contents(&self) -> Option<String> {
            self.0.lock().clone()
        }

        fn opener(&self) -> impl FnOnce() -> CliResult<FakeClipboard> + Send + 'static {
            let fake = self.clone();
            move || Ok(fake)
        }
    }

    impl ClipboardBackend for FakeClipboard {
        fn set_text(&mut self, text: &str) -> CliResult<()> {
            *self.0.lock() = Some(text.to_string());
            Ok(())
        }

        fn get_text(&mut self) -> CliResult<Zeroizing<String>> {
            self.0
                .lock()
                .clone()
                .map(Zeroizing::new)
                .ok_or_else(|| CliError::Clipboard("empty".into()))
        }

        fn clear(&mut self) -> CliResult<()> {
            *self.0.lock() = None;
            Ok(())
        }
    }

    #[test]
    fn test_timeout_clears_secret() {
        let fake = FakeClipboard::default();
        let lease = copy_with(fake.opener(), "hunter2", Duration::from_millis(30)).unwrap();
        assert_eq!(fake.contents().as_deref(), Some("hunter2"));

        lease.wait();
        assert_eq!(fake.contents(), None);
    }

    #[test]
    fn test_clear_now_does_not_wait_for_timeout() {
        let fake = FakeClipboard::default();
        let lease = copy_with(fake.opener(), "hunter2", Duration::from_secs(600)).unwrap();

        let started = Instant::now();
        lease.clear_now();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(fake.contents(), None);
    }

    #[test]
    fn test_dropped_lease_clears() {
        let fake = FakeClipboard::default();
        let lease = copy_with(fake.opener(), "hunter2", Duration::from_secs(600)).unwrap();
        drop(lease);

        let deadline = Instant::now() + Duration::from_secs(5);
        while fake.contents().is_some() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(fake.contents(), None);
    }

    #[test]
    fn test_newer_copy_is_left_alone() {
        let fake = FakeClipboard::default();
        let lease = copy_with(fake.opener(), "hunter2", Duration::from_millis(30)).unwrap();
        *fake.0.lock() = Some("copied by the user".into());

        lease.wait();
        assert_eq!(fake.contents().as_deref(), Some("copied by the user"));
    }

    #[test]
    fn test_unavailable_clipboard_is_an_error() {
        let result = copy_with(
            || -> CliResult<FakeClipboard> { Err(CliError::Clipboard("no display".into())) },
            "hunter2",
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(CliError::Clipboard(msg)) if msg == "no display"));
    }
}
