//! Single-slot cancellation handle shared by the session and its stream worker

use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

type CancelFn = Box<dyn FnOnce() + Send>;

/// Holds the cancel function of the active stream, if any
///
/// The function is taken out of the slot before it runs, so it executes at
/// most once no matter how many times `cancel` or `clear` is called.
#[derive(Default)]
pub struct CancelHandle {
    slot: Mutex<Option<CancelFn>>,
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<CancelFn>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install a cancel function, first invoking any previous one
    pub fn install(&self, cancel: impl FnOnce() + Send + 'static) {
        let previous = self.lock().replace(Box::new(cancel));
        if let Some(previous) = previous {
            tracing::debug!("Cancelling superseded stream");
            previous();
        }
    }

    /// Install a token-backed cancel function
    pub fn install_token(&self, token: CancellationToken) {
        self.install(move || token.cancel());
    }

    /// Invoke and drop the active cancel function; returns whether one ran
    pub fn cancel(&self) -> bool {
        // Release the lock before running user code
        let active = self.lock().take();
        match active {
            Some(cancel) => {
                cancel();
                true
            }
            None => false,
        }
    }

    /// Release the handle after a stream ends on its own
    ///
    /// Same as `cancel`: firing the token of a finished stream is harmless and
    /// frees anything the function captured.
    pub fn clear(&self) {
        self.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }
}
