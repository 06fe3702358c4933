//! StrataCatalog - in-memory transactional metadata catalog
//!
//! StrataCatalog stores and serves descriptions of namespaces, datasets,
//! repositories and users. Every edit runs inside a transaction with
//! snapshot isolation and first-committer-wins conflict detection, backed
//! by memory-resident versioned structures (flat maps and burst tries).
//!
//! # Quick Start
//!
//! ```ignore
//! use stratacatalog::{Catalog, CatalogConfig, Namespace, QualifiedName};
//!
//! let catalog = Catalog::open(CatalogConfig::default())?;
//!
//! let name = QualifiedName::parse("analytics")?;
//! catalog.namespaces().create(Namespace::new(name.clone(), "team analytics"))?;
//!
//! let ns = catalog.namespaces().get_latest(name.as_str())?;
//! assert_eq!(ns.description, "team analytics");
//! ```
//!
//! # Architecture
//!
//! The public surface is the [`Catalog`] facade and its entity stores.
//! Storage, concurrency and core types are re-exported for callers that
//! build their own repositories on the same engine.

pub use strata_catalog::*;
