use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Decides whether writes to the target should currently be held back.
pub trait Throttler: Send + Sync {
    fn throttled(&self) -> bool;
}

/// Returns once `throttler` permits writing, polling every `poll_interval`.
///
/// A missing throttler never blocks.
pub async fn wait_for_throttle(throttler: Option<&dyn Throttler>, poll_interval: Duration) {
    let Some(throttler) = throttler else {
        return;
    };

    let mut logged = false;
    while throttler.throttled() {
        if !logged {
            debug!("Writes throttled, waiting");
            logged = true;
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Throttler driven by an operator: writes stop while paused.
///
/// A disabled throttler never throttles, regardless of the pause flag.
#[derive(Debug, Default)]
pub struct PauseThrottler {
    paused: AtomicBool,
    disabled: AtomicBool,
}

impl PauseThrottler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}

impl Throttler for PauseThrottler {
    fn throttled(&self) -> bool {
        !self.is_disabled() && self.is_paused()
    }
}
