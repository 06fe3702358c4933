//! Catalog layer for Strata
//!
//! This crate turns the transactional maps of `strata-concurrency` into
//! entity repositories and assembles them into a [`Catalog`]:
//! - [`DescribedRepository`]: CRUD over one named, described entity kind
//! - [`MultiDescribedRepository`]: the same plus an id index and rename
//! - [`DescriptionMutations`]: atomic batches over an entity and its index
//! - [`InMemoryRepository`]: wiring of structures, arenas and comparators
//! - Entity stores for namespaces, users, datasets and repositories
//! - [`CatalogConfig`] (`catalog.toml`) and the background
//!   [`GarbageCollector`]
//!
//! Stores enforce structural rules only: name shape, uniqueness, and that
//! referenced entities exist in the caller's snapshot.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod collector;
pub mod config;
pub mod described;
pub mod entities;
pub mod in_memory;
pub mod multi;
pub mod mutations;
pub mod repository;

pub use catalog::{Catalog, CatalogStats};
pub use collector::GarbageCollector;
pub use config::{ArenaConfig, CatalogConfig, GcConfig, StorageConfig, CONFIG_FILE_NAME};
pub use described::{Described, Identified};
pub use entities::{
    Dataset, DatasetStore, Namespace, NamespaceStore, Repository, RepositoryStore, User,
    UserStore,
};
pub use in_memory::{Backend, InMemoryRepository, RepositoryConfig};
pub use multi::MultiDescribedRepository;
pub use mutations::{DescriptionMutations, IndexedMaps};
pub use repository::{with_transaction, DescribedRepository, Listing};

pub use strata_concurrency::{
    GcReport, SnapshotPin, Transaction, TransactionManager, TransactionMetrics, TxnMap,
};
pub use strata_core::{KeyOrder, QualifiedName, ReadView, StrataError, StrataResult};
