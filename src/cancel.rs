//! Cooperative cancellation token.
//!
//! The attack loop, the client monitor, and every blocking sleep check the
//! same shared flag instead of unwinding through a signal handler.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use crate::error::{AttackError, Result};

/// Shared cancellation flag checked at every suspension point.
pub type CancelFlag = Arc<AtomicBool>;

/// Create a fresh, unset cancellation flag.
pub fn new_cancel_flag() -> CancelFlag {
    Arc::new(AtomicBool::new(false))
}

pub fn is_cancelled(cancel: &CancelFlag) -> bool {
    cancel.load(Ordering::Relaxed)
}

pub fn check_cancel(cancel: &CancelFlag) -> Result<()> {
    if is_cancelled(cancel) {
        return Err(AttackError::Cancelled);
    }
    Ok(())
}

/// Sleep for `duration`, waking early with `AttackError::Cancelled` if the
/// flag is raised. Polls the flag every 100ms.
pub fn cancel_sleep(cancel: &CancelFlag, duration: Duration) -> Result<()> {
    if duration.is_zero() {
        return check_cancel(cancel);
    }

    let start = Instant::now();
    let tick = Duration::from_millis(100);
    while start.elapsed() < duration {
        check_cancel(cancel)?;
        let remaining = duration.saturating_sub(start.elapsed());
        std::thread::sleep(tick.min(remaining));
    }
    check_cancel(cancel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_completes_when_not_cancelled() {
        let cancel = new_cancel_flag();
        assert!(cancel_sleep(&cancel, Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn test_sleep_aborts_when_cancelled() {
        let cancel = new_cancel_flag();
        cancel.store(true, Ordering::Relaxed);
        let err = cancel_sleep(&cancel, Duration::from_secs(5)).unwrap_err();
        assert!(err.is_cancelled());
    }
}
