//! Scoped interrupt guard (Ctrl+C handling).
//!
//! The original installs `signal.signal(SIGINT, ...)` only around the two
//! critical sections (the hash loop, the per-record parity step) and
//! restores the default handler afterwards. `ctrlc` only lets a process
//! register one global handler for its lifetime, and its handler body can
//! only safely set a flag, not do I/O — so this guard installs the handler
//! once, lazily, on first use, and each `InterruptGuard` just arms/disarms
//! an `AtomicBool` that pipelines poll at safe points between records.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static ARMED: AtomicBool = AtomicBool::new(false);
static INIT: Once = Once::new();

fn ensure_installed() {
    INIT.call_once(|| {
        let result = ctrlc::set_handler(|| {
            if ARMED.load(Ordering::SeqCst) {
                INTERRUPTED.store(true, Ordering::SeqCst);
            }
        });
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to install Ctrl+C handler");
        }
    });
}

/// RAII guard marking a critical section as interruptible. While a guard is
/// alive, [`interrupted`] reflects whether Ctrl+C was pressed since it was
/// armed. Dropping the guard disarms delivery again.
pub struct InterruptGuard {
    _private: (),
}

impl InterruptGuard {
    pub fn arm() -> Self {
        ensure_installed();
        INTERRUPTED.store(false, Ordering::SeqCst);
        ARMED.store(true, Ordering::SeqCst);
        Self { _private: () }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        ARMED.store(false, Ordering::SeqCst);
    }
}

/// True once Ctrl+C has been observed while a guard is armed.
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_starts_uninterrupted() {
        let guard = InterruptGuard::arm();
        assert!(!interrupted());
        drop(guard);
    }
}
