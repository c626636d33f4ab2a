//! Cooperative cancellation
//!
//! The reducer checks the signal between steps; long-running bricks are
//! expected to check it themselves or race work against [`AbortSignal::aborted`].
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

use crate::error::PipelineError;

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    reason: Mutex<Option<String>>,
    notify: Notify,
}

/// Owner side: aborts every signal handed out
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    state: Arc<AbortState>,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            state: Some(self.state.clone()),
        }
    }

    pub fn abort(&self, reason: impl Into<String>) {
        {
            let mut slot = self
                .state
                .reason
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.state.aborted.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }
}

/// Observer side, passed to bricks through their options
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    state: Option<Arc<AbortState>>,
}

impl AbortSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.aborted.load(Ordering::SeqCst))
    }

    pub fn reason(&self) -> Option<String> {
        let state = self.state.as_ref()?;
        state
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `Err(Cancelled)` once aborted
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_aborted() {
            Err(PipelineError::cancelled(
                self.reason().unwrap_or_else(|| "aborted".to_string()),
            ))
        } else {
            Ok(())
        }
    }

    /// Resolves when the signal fires; pending forever for [`AbortSignal::never`]
    pub async fn aborted(&self) {
        let Some(state) = self.state.as_ref() else {
            return std::future::pending().await;
        };
        loop {
            let notified = state.notify.notified();
            if state.aborted.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}
