//! Cancellation and deadlines.
//!
//! Every public operation takes an `OpContext`. Cancellation is
//! cooperative: the flag is checked before each attempt, between
//! protocol steps, and during backoff sleeps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ApiError, ErrorKind};

/// Cancellation token plus optional deadline for one operation.
#[derive(Debug, Clone)]
pub struct OpContext {
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl OpContext {
    /// A context that never cancels.
    pub fn background() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// A context that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Cancel the operation. Clones of this context observe it.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with `Canceled` if the context is done.
    pub fn check(&self) -> Result<(), ApiError> {
        if self.is_canceled() {
            return Err(ApiError::new(ErrorKind::Canceled));
        }
        Ok(())
    }

    /// Sleep for `duration`, waking early on cancellation.
    pub fn sleep(&self, duration: Duration) -> Result<(), ApiError> {
        const TICK: Duration = Duration::from_millis(25);
        let until = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            std::thread::sleep(TICK.min(until - now));
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}
