//! Concrete catalog entities and their stores
//!
//! | Entity | Store | Structure | Renameable |
//! |--------|-------|-----------|------------|
//! | [`Namespace`] | [`NamespaceStore`] | burst trie, qualified order | no |
//! | [`User`] | [`UserStore`] | flat map, raw order | no |
//! | [`Dataset`] | [`DatasetStore`] | burst trie + id index | yes |
//! | [`Repository`] | [`RepositoryStore`] | burst trie + id index | yes |
//!
//! Stores only enforce structural rules: name shape and the existence of
//! referenced entities.

pub mod dataset;
pub mod namespace;
pub mod repository;
pub mod user;

pub use dataset::{Dataset, DatasetStore};
pub use namespace::{Namespace, NamespaceStore};
pub use repository::{Repository, RepositoryStore};
pub use user::{User, UserStore};
