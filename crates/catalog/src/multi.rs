//! Multi-described repository
//!
//! A [`DescribedRepository`] plus an id index, for entity kinds that can
//! be renamed. Create, delete and rename touch both maps in one
//! multi-description batch; plain updates leave the index alone since the
//! name does not change.

use std::fmt;
use std::sync::Arc;
use strata_concurrency::{Transaction, TransactionManager, TxnMap};
use strata_core::{QualifiedName, StrataError, StrataResult};
use strata_storage::StoreStats;
use uuid::Uuid;

use crate::described::Identified;
use crate::mutations::{DescriptionMutations, IndexedMaps};
use crate::repository::{entity_error, with_transaction, DescribedRepository, Listing};

/// Renameable CRUD over one entity kind
pub struct MultiDescribedRepository<E> {
    primary: DescribedRepository<E>,
    by_id: TxnMap<String>,
}

impl<E: Identified> MultiDescribedRepository<E> {
    /// Repository over `primary` with id index `by_id`
    pub fn new(primary: TxnMap<E>, by_id: TxnMap<String>) -> Self {
        MultiDescribedRepository {
            primary: DescribedRepository::new(primary),
            by_id,
        }
    }

    /// Single-map view of the primary entries
    pub fn primary(&self) -> &DescribedRepository<E> {
        &self.primary
    }

    /// Manager the maps are registered with
    pub fn manager(&self) -> &Arc<TransactionManager> {
        self.primary.manager()
    }

    fn maps(&self) -> IndexedMaps<'_, E> {
        IndexedMaps {
            primary: self.primary.map(),
            by_id: &self.by_id,
        }
    }

    /// Create `entity` in its own transaction
    pub fn create(&self, entity: E) -> StrataResult<E> {
        with_transaction(self.manager(), |txn| self.create_in(txn, entity))
    }

    /// Create `entity` and its index entry under `txn`
    pub fn create_in(&self, txn: &Transaction, entity: E) -> StrataResult<E> {
        E::validate_name(entity.name())?;
        let name = entity.name().as_str().to_string();
        DescriptionMutations::new(txn)
            .create(self.maps(), entity.clone())
            .apply()
            .map_err(|err| entity_error::<E>(err, &name))?;
        Ok(entity)
    }

    /// Entity visible at committed `snapshot`
    pub fn get(&self, name: &str, snapshot: u64) -> StrataResult<E> {
        self.primary.get(name, snapshot)
    }

    /// Entity visible to `txn`
    pub fn get_in(&self, txn: &Transaction, name: &str) -> StrataResult<E> {
        self.primary.get_in(txn, name)
    }

    /// Entity visible to `txn`, `None` if absent
    pub fn find_in(&self, txn: &Transaction, name: &str) -> StrataResult<Option<E>> {
        self.primary.find_in(txn, name)
    }

    /// Latest committed entity
    pub fn get_latest(&self, name: &str) -> StrataResult<E> {
        self.primary.get_latest(name)
    }

    /// Entity with identifier `id` visible to `txn`
    pub fn get_by_id(&self, txn: &Transaction, id: Uuid) -> StrataResult<E> {
        let key = id.to_string();
        let name = self
            .by_id
            .get(txn, &key)?
            .ok_or_else(|| StrataError::not_found(E::KIND, key.clone()))?;
        self.primary.get_in(txn, &name)
    }

    /// Whether `txn` can see `name`
    pub fn exists_in(&self, txn: &Transaction, name: &str) -> StrataResult<bool> {
        self.primary.exists_in(txn, name)
    }

    /// Resolve a reference, recording a read dependency
    pub fn require(&self, txn: &Transaction, name: &str) -> StrataResult<E> {
        self.primary.require(txn, name)
    }

    /// Apply `mutator` to the entity and stage the result
    pub fn update<F>(&self, txn: &Transaction, name: &str, mutator: F) -> StrataResult<E>
    where
        F: FnOnce(&mut E) -> StrataResult<()>,
    {
        self.primary.update(txn, name, mutator)
    }

    /// Replace the description
    pub fn update_description(
        &self,
        txn: &Transaction,
        name: &str,
        description: impl Into<String>,
    ) -> StrataResult<E> {
        self.primary.update_description(txn, name, description)
    }

    /// Stage the removal of the entity and its index entry
    pub fn delete(&self, txn: &Transaction, name: &str) -> StrataResult<E> {
        let entity = self.primary.get_in(txn, name)?;
        self.primary.map().modified_since(txn, name)?;
        DescriptionMutations::new(txn)
            .delete(self.maps(), &entity)
            .apply()
            .map_err(|err| entity_error::<E>(err, name))?;
        Ok(entity)
    }

    /// Move the entity from `old_name` to `new_name`
    ///
    /// # Errors
    ///
    /// - `NotFound` if `txn` cannot see `old_name`
    /// - `AlreadyExists` if `new_name` is taken
    /// - `Conflict` if the entity changed after `txn`'s snapshot
    /// - `InvalidInput` if `new_name` is malformed for this kind
    pub fn rename(&self, txn: &Transaction, old_name: &str, new_name: &str) -> StrataResult<E> {
        let new_name = QualifiedName::parse(new_name)?;
        E::validate_name(&new_name)?;
        let mut entity = self.primary.get_in(txn, old_name)?;
        self.primary.map().modified_since(txn, old_name)?;
        if new_name.as_str() == old_name {
            return Ok(entity);
        }
        if self.primary.exists_in(txn, new_name.as_str())? {
            return Err(StrataError::already_exists(E::KIND, new_name.as_str()));
        }

        entity.set_name(new_name.clone());
        entity.touch();
        DescriptionMutations::new(txn)
            .rename(self.maps(), old_name, entity.clone())
            .apply()
            .map_err(|err| entity_error::<E>(err, new_name.as_str()))?;
        Ok(entity)
    }

    /// Entities under `prefix` at committed `snapshot`
    pub fn list(&self, prefix: &str, snapshot: u64) -> StrataResult<Listing<'_, E>> {
        self.primary.list(prefix, snapshot)
    }

    /// Entities under `prefix` visible to `txn`
    pub fn list_in(&self, txn: &Transaction, prefix: &str) -> StrataResult<Listing<'_, E>> {
        self.primary.list_in(txn, prefix)
    }

    /// Shape counters of the primary and index structures
    pub fn stats(&self) -> (StoreStats, StoreStats) {
        (self.primary.stats(), self.by_id.stats())
    }
}

impl<E> Clone for MultiDescribedRepository<E> {
    fn clone(&self) -> Self {
        MultiDescribedRepository {
            primary: self.primary.clone(),
            by_id: self.by_id.clone(),
        }
    }
}

impl<E> fmt::Debug for MultiDescribedRepository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiDescribedRepository")
            .field("primary", &self.primary)
            .field("by_id", &self.by_id)
            .finish()
    }
}
