//! Shared/exclusive structure latch
//!
//! Protects the shape of an index (slot vector, trie nodes). Readers and
//! writers staging versions on existing entries take it shared; adding a
//! key, bursting a node and garbage collection take it exclusive.
//!
//! Shared acquisition is recursive: a thread already holding the latch
//! shared may take it again even while a writer is queued. There is no
//! upgrade path, so callers that discover they need exclusive access must
//! drop their shared guard and re-validate under the exclusive one.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing latch traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatchStats {
    /// Number of shared acquisitions
    pub shared: u64,
    /// Number of exclusive acquisitions
    pub exclusive: u64,
}

/// Reader-writer latch around a structure's shape
#[derive(Debug)]
pub struct SharedLatch<T> {
    inner: RwLock<T>,
    shared: AtomicU64,
    exclusive: AtomicU64,
}

impl<T> SharedLatch<T> {
    /// Wrap `value` in a latch
    pub fn new(value: T) -> Self {
        SharedLatch {
            inner: RwLock::new(value),
            shared: AtomicU64::new(0),
            exclusive: AtomicU64::new(0),
        }
    }

    /// Acquire shared access
    #[inline]
    pub fn shared(&self) -> RwLockReadGuard<'_, T> {
        self.shared.fetch_add(1, Ordering::Relaxed);
        self.inner.read_recursive()
    }

    /// Acquire exclusive access
    #[inline]
    pub fn exclusive(&self) -> RwLockWriteGuard<'_, T> {
        self.exclusive.fetch_add(1, Ordering::Relaxed);
        self.inner.write()
    }

    /// Acquire exclusive access only if no one else holds the latch
    pub fn try_exclusive(&self) -> Option<RwLockWriteGuard<'_, T>> {
        let guard = self.inner.try_write()?;
        self.exclusive.fetch_add(1, Ordering::Relaxed);
        Some(guard)
    }

    /// Acquisition counters
    pub fn stats(&self) -> LatchStats {
        LatchStats {
            shared: self.shared.load(Ordering::Relaxed),
            exclusive: self.exclusive.load(Ordering::Relaxed),
        }
    }

    /// Consume the latch, returning the protected value
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Default> Default for SharedLatch<T> {
    fn default() -> Self {
        SharedLatch::new(T::default())
    }
}
