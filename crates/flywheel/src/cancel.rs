//! cooperative cancellation of a run
//!
//! A [Cancellation] is checked before every provider lookup and before every file write.
//! Tripping it stops further work but does not undo changes already applied in memory.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("run was cancelled")]
pub struct Cancelled;

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(())
    }

    /// Trips this token on SIGINT/SIGTERM
    ///
    /// Can only be installed once per process.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("interrupt received, stopping after the current step");
            token.cancel();
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = Cancellation::new();
        let observer = token.clone();
        assert_eq!(observer.check(), Ok(()));

        token.cancel();

        assert!(observer.is_cancelled());
        assert_eq!(observer.check(), Err(Cancelled));
    }
}
