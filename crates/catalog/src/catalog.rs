//! Catalog facade
//!
//! [`Catalog`] owns the transaction manager, the key arena shared by every
//! store, the four entity stores and, when enabled, the background garbage
//! collector. It is the entry point the service layer talks to.

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use strata_concurrency::{GcReport, Transaction, TransactionManager, TransactionMetrics};
use strata_core::{KeyOrder, StrataResult};
use strata_storage::{StoreStats, StringArena, StringArenaStats};
use tracing::{info, warn};

use crate::collector::GarbageCollector;
use crate::config::CatalogConfig;
use crate::entities::{DatasetStore, NamespaceStore, RepositoryStore, UserStore};
use crate::in_memory::{InMemoryRepository, RepositoryConfig};
use crate::repository::with_transaction;

/// Point-in-time counters for the whole catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStats {
    /// Transaction lifetime counters
    pub transactions: TransactionMetrics,
    /// Shared key arena
    pub strings: StringArenaStats,
    /// Namespace structure
    pub namespaces: StoreStats,
    /// User structure
    pub users: StoreStats,
    /// Dataset structure
    pub datasets: StoreStats,
    /// Dataset id index
    pub dataset_ids: StoreStats,
    /// Repository structure
    pub repositories: StoreStats,
    /// Repository id index
    pub repository_ids: StoreStats,
    /// Completed background collection passes
    pub gc_passes: u64,
}

/// In-memory transactional metadata catalog
pub struct Catalog {
    config: CatalogConfig,
    manager: Arc<TransactionManager>,
    strings: Arc<StringArena>,
    namespaces: NamespaceStore,
    users: UserStore,
    datasets: DatasetStore,
    repositories: RepositoryStore,
    collector: Option<GarbageCollector>,
    collector_handle: Option<JoinHandle<()>>,
}

impl Catalog {
    /// Build a catalog from `config`
    ///
    /// Starts the background collector if `gc.enabled`.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Config` if the configuration is invalid.
    pub fn open(config: CatalogConfig) -> StrataResult<Self> {
        config.validate()?;

        let manager = Arc::new(TransactionManager::new());
        let strings = Arc::new(StringArena::with_limits(
            config.arena.string_chunk_bytes,
            config.arena.max_string_bytes,
        ));
        let builder = InMemoryRepository::new(Arc::clone(&manager), Arc::clone(&strings));

        let trie = RepositoryConfig::trie(config.storage.burst_threshold)
            .with_page_size(config.storage.range_page_size)
            .with_max_objects(config.arena.max_objects);
        let flat = RepositoryConfig::flat(KeyOrder::Raw)
            .with_page_size(config.storage.range_page_size)
            .with_max_objects(config.arena.max_objects);

        let namespaces: NamespaceStore = builder.described("namespaces", &trie)?;
        let users: UserStore = builder.described("users", &flat)?;
        let datasets = DatasetStore::new(
            builder.multi_described("datasets", &trie)?,
            namespaces.clone(),
        );
        let repositories = RepositoryStore::new(
            builder.multi_described("repositories", &trie)?,
            namespaces.clone(),
            users.clone(),
            datasets.clone(),
        );

        let (collector, collector_handle) = if config.gc.enabled {
            let collector = GarbageCollector::new(Arc::clone(&manager), config.gc_interval());
            let handle = collector.start();
            (Some(collector), Some(handle))
        } else {
            (None, None)
        };

        info!(
            target: "strata::catalog",
            burst_threshold = config.storage.burst_threshold,
            range_page_size = config.storage.range_page_size,
            gc = config.gc.enabled,
            "Catalog opened"
        );

        Ok(Catalog {
            config,
            manager,
            strings,
            namespaces,
            users,
            datasets,
            repositories,
            collector,
            collector_handle,
        })
    }

    /// Build a catalog with default settings and no background collector
    pub fn in_memory() -> StrataResult<Self> {
        let mut config = CatalogConfig::default();
        config.gc.enabled = false;
        Self::open(config)
    }

    /// Build a catalog from a config file, writing the default file first
    /// if none exists
    pub fn open_with_config_file(path: &Path) -> StrataResult<Self> {
        CatalogConfig::write_default_if_missing(path)?;
        Self::open(CatalogConfig::from_file(path)?)
    }

    /// Settings the catalog was built with
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Transaction manager shared by every store
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Begin a new transaction (for manual control)
    ///
    /// Prefer [`transaction`](Self::transaction) for automatic handling.
    pub fn begin(&self) -> Transaction {
        self.manager.begin()
    }

    /// Execute a transaction with the given closure
    ///
    /// - Begins a transaction at the latest committed version
    /// - Executes the closure with it
    /// - Commits on `Ok`, rolls back on `Err`
    ///
    /// A commit conflict is returned to the caller; nothing is retried.
    ///
    /// # Example
    /// ```ignore
    /// catalog.transaction(|txn| {
    ///     catalog.datasets().create_in(txn, dataset)?;
    ///     catalog.namespaces().update_description(txn, "ns1", "has data")?;
    ///     Ok(())
    /// })?;
    /// ```
    pub fn transaction<F, T>(&self, f: F) -> StrataResult<T>
    where
        F: FnOnce(&Transaction) -> StrataResult<T>,
    {
        with_transaction(&self.manager, f)
    }

    /// Namespace store
    pub fn namespaces(&self) -> &NamespaceStore {
        &self.namespaces
    }

    /// User store
    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// Dataset store
    pub fn datasets(&self) -> &DatasetStore {
        &self.datasets
    }

    /// Repository store
    pub fn repositories(&self) -> &RepositoryStore {
        &self.repositories
    }

    /// Run one garbage-collection pass now
    pub fn collect_garbage(&self) -> GcReport {
        self.manager.collect_garbage()
    }

    /// Counters for the whole catalog
    pub fn stats(&self) -> CatalogStats {
        let (datasets, dataset_ids) = self.datasets.repository().stats();
        let (repositories, repository_ids) = self.repositories.repository().stats();
        CatalogStats {
            transactions: self.manager.metrics(),
            strings: self.strings.stats(),
            namespaces: self.namespaces.stats(),
            users: self.users.stats(),
            datasets,
            dataset_ids,
            repositories,
            repository_ids,
            gc_passes: self.collector.as_ref().map_or(0, GarbageCollector::passes),
        }
    }

    /// Stop the background collector, waiting for its thread to exit
    pub fn stop_collector(&mut self) {
        if let Some(collector) = &self.collector {
            collector.shutdown();
        }
        if let Some(handle) = self.collector_handle.take() {
            if handle.join().is_err() {
                warn!(target: "strata::gc", "Collector thread panicked");
            }
        }
    }
}

impl Drop for Catalog {
    fn drop(&mut self) {
        self.stop_collector();
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .field("collector", &self.collector)
            .finish()
    }
}
