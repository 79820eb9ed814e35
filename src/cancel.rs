//! Cooperative stop control for a pipeline run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag. Cloning shares the same flag.
///
/// The flag only moves false → true during a run. It is never cleared by the
/// pipeline itself; whoever owns the control must call `reset` before starting
/// the next run, and a run started with the flag still set is refused.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a graceful stop. The current frame finishes, then the run finalizes.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
