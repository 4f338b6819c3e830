//! Debounced draft writes
//!
//! Each scheduled write bumps a generation counter. A timer that wakes up to
//! find a newer generation does nothing, so cancellation stays safe even if
//! the abort races the wake-up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::form::FormState;
use crate::storage::DraftStore;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

pub struct DraftDebouncer {
    drafts: DraftStore,
    window: Duration,
    generation: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DraftDebouncer {
    pub fn new(drafts: DraftStore, window: Duration) -> Self {
        Self {
            drafts,
            window,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Write `snapshot` once the window passes without another call.
    ///
    /// Outside a tokio runtime there is nothing to run the timer on, so the
    /// write is skipped.
    pub fn schedule(&self, snapshot: FormState) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::debug!("No runtime available, skipping draft write");
                self.abort_pending();
                return;
            }
        };

        let current = Arc::clone(&self.generation);
        let drafts = self.drafts.clone();
        let window = self.window;

        let task = handle.spawn(async move {
            tokio::time::sleep(window).await;
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            if let Err(e) = drafts.save(&snapshot).await {
                log::warn!("Failed to save draft: {}", e);
            }
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop any pending write
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.abort_pending();
    }

    /// Drop any pending write and wait until its task has stopped. Once this
    /// returns, no write scheduled earlier can still land.
    pub async fn cancel_and_wait(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = pending {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    log::warn!("Draft write task failed: {}", e);
                }
            }
        }
    }

    /// A write is scheduled and has not finished yet
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    fn abort_pending(&self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = pending {
            task.abort();
        }
    }
}

impl Drop for DraftDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
