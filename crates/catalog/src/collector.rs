//! Background garbage collection
//!
//! [`GarbageCollector`] runs [`TransactionManager::collect_garbage`] on a
//! background thread at a fixed interval.
//!
//! # Design Notes
//!
//! - Sleeps in short slices so shutdown is noticed quickly
//! - Graceful shutdown via atomic flag
//! - Each pass only prunes versions no active transaction can see

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use strata_concurrency::TransactionManager;
use tracing::{debug, info};

/// Longest uninterrupted sleep between shutdown checks
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Periodic pruner of unreachable versions
///
/// # Example
///
/// ```ignore
/// let collector = GarbageCollector::new(Arc::clone(&manager), Duration::from_secs(1));
/// let handle = collector.start();
///
/// // ... run transactions ...
///
/// collector.shutdown();
/// handle.join().unwrap();
/// ```
#[derive(Debug)]
pub struct GarbageCollector {
    manager: Arc<TransactionManager>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    passes: Arc<AtomicU64>,
}

impl GarbageCollector {
    /// Collector over `manager`, running every `interval`
    pub fn new(manager: Arc<TransactionManager>, interval: Duration) -> Self {
        GarbageCollector {
            manager,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            passes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start the background thread
    ///
    /// The thread sleeps first, then collects, until `shutdown()` is called.
    pub fn start(&self) -> JoinHandle<()> {
        let manager = Arc::clone(&self.manager);
        let shutdown = Arc::clone(&self.shutdown);
        let passes = Arc::clone(&self.passes);
        let interval = self.interval;

        let interval_ms = interval.as_millis() as u64;
        info!(target: "strata::gc", interval_ms, "Collector started");
        thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                let slice = SLEEP_SLICE.min(interval);
                let mut elapsed = Duration::ZERO;
                while elapsed < interval {
                    if shutdown.load(Ordering::Relaxed) {
                        info!(target: "strata::gc", "Collector stopped");
                        return;
                    }
                    thread::sleep(slice);
                    elapsed += slice;
                }

                let report = manager.collect_garbage();
                passes.fetch_add(1, Ordering::Relaxed);
                if report.versions_pruned > 0 || report.entries_removed > 0 {
                    debug!(
                        target: "strata::gc",
                        horizon = report.horizon,
                        versions_pruned = report.versions_pruned,
                        entries_removed = report.entries_removed,
                        "Collected garbage"
                    );
                }
            }
            info!(target: "strata::gc", "Collector stopped");
        })
    }

    /// Signal shutdown; the thread exits within one sleep slice
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown has been signaled
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Completed passes
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Pause between passes
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
