//! In-memory repository wiring
//!
//! Turns a [`RepositoryConfig`] into transaction-managed maps: picks the
//! structure (flat map or burst trie), the key order and the allocators,
//! and registers the result with the transaction manager. Every concrete
//! entity store is built through here.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strata_concurrency::{TransactionManager, TxnMap};
use strata_core::{KeyOrder, StrataError, StrataResult};
use strata_storage::{
    Allocators, BurstTrie, StringArena, TxnFlatMap, VersionedStore, DEFAULT_BURST_THRESHOLD,
    DEFAULT_RANGE_PAGE_SIZE,
};
use tracing::debug;

use crate::described::{Described, Identified};
use crate::multi::MultiDescribedRepository;
use crate::repository::DescribedRepository;

/// Structure backing a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Sorted array index
    FlatMap,
    /// Trie over name bytes whose dense nodes burst into sorted indices
    BurstTrie,
}

/// Construction parameters of one repository, fixed once built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Key comparator
    pub order: KeyOrder,
    /// Backing structure
    pub backend: Backend,
    /// Burst threshold, used by the trie backend
    pub burst_threshold: usize,
    /// Listing page size
    pub page_size: usize,
    /// Live entry limit per map
    pub max_objects: Option<usize>,
}

impl RepositoryConfig {
    /// Flat map in `order`
    pub fn flat(order: KeyOrder) -> Self {
        RepositoryConfig {
            order,
            backend: Backend::FlatMap,
            burst_threshold: DEFAULT_BURST_THRESHOLD,
            page_size: DEFAULT_RANGE_PAGE_SIZE,
            max_objects: None,
        }
    }

    /// Burst trie in qualified-name order
    pub fn trie(burst_threshold: usize) -> Self {
        RepositoryConfig {
            order: KeyOrder::Qualified,
            backend: Backend::BurstTrie,
            burst_threshold,
            page_size: DEFAULT_RANGE_PAGE_SIZE,
            max_objects: None,
        }
    }

    /// Same configuration with another page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Same configuration with an entry limit
    pub fn with_max_objects(mut self, max_objects: Option<usize>) -> Self {
        self.max_objects = max_objects;
        self
    }

    /// Reject combinations the structures cannot honor
    ///
    /// The trie walks names segment by segment, so it only supports the
    /// qualified order.
    pub fn validate(&self) -> StrataResult<()> {
        if self.backend == Backend::BurstTrie && self.order != KeyOrder::Qualified {
            return Err(StrataError::config(
                "burst trie repositories require the qualified key order",
            ));
        }
        if self.burst_threshold == 0 {
            return Err(StrataError::config("burst threshold must be >= 1"));
        }
        if self.page_size == 0 {
            return Err(StrataError::config("page size must be >= 1"));
        }
        Ok(())
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        RepositoryConfig::trie(DEFAULT_BURST_THRESHOLD)
    }
}

/// Builds managed maps that share one manager and one key arena
#[derive(Debug, Clone)]
pub struct InMemoryRepository {
    manager: Arc<TransactionManager>,
    strings: Arc<StringArena>,
}

impl InMemoryRepository {
    /// Builder over `manager`, interning keys in `strings`
    pub fn new(manager: Arc<TransactionManager>, strings: Arc<StringArena>) -> Self {
        InMemoryRepository { manager, strings }
    }

    /// Manager every built map registers with
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Shared key arena
    pub fn strings(&self) -> &Arc<StringArena> {
        &self.strings
    }

    /// A managed map named `name` shaped by `config`
    pub fn map<V>(&self, name: &str, config: &RepositoryConfig) -> StrataResult<TxnMap<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        config.validate()?;
        let allocators = Allocators::with_strings(Arc::clone(&self.strings), config.max_objects);
        let store: Box<dyn VersionedStore<V>> = match config.backend {
            Backend::FlatMap => Box::new(TxnFlatMap::new(allocators, config.order.comparator())),
            Backend::BurstTrie => Box::new(BurstTrie::new(allocators, config.burst_threshold)),
        };
        debug!(
            target: "strata::catalog",
            map = name,
            backend = ?config.backend,
            order = ?config.order,
            "Building managed map"
        );
        Ok(TxnMap::new(&self.manager, name, store).with_page_size(config.page_size))
    }

    /// Single-map repository for `E`
    pub fn described<E: Described>(
        &self,
        name: &str,
        config: &RepositoryConfig,
    ) -> StrataResult<DescribedRepository<E>> {
        Ok(DescribedRepository::new(self.map(name, config)?))
    }

    /// Renameable repository for `E`
    ///
    /// The primary map follows `config`; the id index is a flat map in raw
    /// order named `<name>_by_id`.
    pub fn multi_described<E: Identified>(
        &self,
        name: &str,
        config: &RepositoryConfig,
    ) -> StrataResult<MultiDescribedRepository<E>> {
        let index_config = RepositoryConfig::flat(KeyOrder::Raw)
            .with_page_size(config.page_size)
            .with_max_objects(config.max_objects);
        Ok(MultiDescribedRepository::new(
            self.map(name, config)?,
            self.map(&format!("{}_by_id", name), &index_config)?,
        ))
    }
}
