//! Single-slot, non-blocking busy guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag allowing at most one holder at a time.
///
/// `try_acquire` never blocks; a failed attempt means the caller should
/// drop its work.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag {
    busy: Arc<AtomicBool>,
}

impl BusyFlag {
    /// Creates a free slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot, or returns `None` if someone already holds it.
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| BusyGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Whether the slot is currently held.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the slot; releases it on drop, including during unwinding.
#[derive(Debug)]
pub struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let flag = BusyFlag::new();
        let guard = flag.try_acquire().unwrap();
        assert!(flag.is_busy());
        assert!(flag.try_acquire().is_none());

        drop(guard);
        assert!(!flag.is_busy());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn test_released_on_panic() {
        let flag = BusyFlag::new();
        let worker_flag = flag.clone();

        let result = std::thread::spawn(move || {
            let _guard = worker_flag.try_acquire().unwrap();
            panic!("detector blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!flag.is_busy());
    }
}
