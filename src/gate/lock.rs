//! Transaction-scoped advisory locks keyed by 64-bit integers

use crate::error::BridgeResult;
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};

/// Registry of held advisory locks.
///
/// Shared by every connection of a store; a guard releases its key on drop.
#[derive(Debug, Default)]
pub struct AdvisoryLocks {
    held: Mutex<HashSet<i64>>,
    released: Condvar,
}

impl AdvisoryLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Block until `key` is free, then take it
    pub fn acquire(self: &Arc<Self>, key: i64) -> BridgeResult<AdvisoryLockGuard> {
        let mut held = self.held.lock()?;
        while held.contains(&key) {
            held = self.released.wait(held)?;
        }
        held.insert(key);
        Ok(AdvisoryLockGuard {
            locks: Arc::clone(self),
            key,
        })
    }

    /// Take `key` only if nobody holds it
    pub fn try_acquire(self: &Arc<Self>, key: i64) -> BridgeResult<Option<AdvisoryLockGuard>> {
        let mut held = self.held.lock()?;
        if !held.insert(key) {
            return Ok(None);
        }
        Ok(Some(AdvisoryLockGuard {
            locks: Arc::clone(self),
            key,
        }))
    }

    pub fn is_held(&self, key: i64) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(&key))
            .unwrap_or(false)
    }
}

/// Ownership of one advisory lock key
#[derive(Debug)]
pub struct AdvisoryLockGuard {
    locks: Arc<AdvisoryLocks>,
    key: i64,
}

impl AdvisoryLockGuard {
    pub fn key(&self) -> i64 {
        self.key
    }
}

impl Drop for AdvisoryLockGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.locks.held.lock() {
            held.remove(&self.key);
        }
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_releases_on_drop() {
        let locks = AdvisoryLocks::new();
        let guard = locks.acquire(7).unwrap();
        assert!(locks.is_held(7));
        assert!(locks.try_acquire(7).unwrap().is_none());
        drop(guard);
        assert!(!locks.is_held(7));
        assert!(locks.try_acquire(7).unwrap().is_some());
    }

    #[test]
    fn distinct_keys_do_not_contend() {
        let locks = AdvisoryLocks::new();
        let _a = locks.acquire(1).unwrap();
        assert!(locks.try_acquire(2).unwrap().is_some());
    }

    #[test]
    fn second_acquirer_waits_for_release() {
        let locks = AdvisoryLocks::new();
        let guard = locks.acquire(42).unwrap();
        let acquired = Arc::new(AtomicBool::new(false));

        let waiter = {
            let locks = Arc::clone(&locks);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _g = locks.acquire(42).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst), "waiter must block while key is held");

        drop(guard);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
