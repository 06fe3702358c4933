//! Multi-description mutations
//!
//! Batches that keep an entity's primary entry (keyed by qualified name)
//! and its id index (id -> qualified name) in step. Each batch runs in a
//! [`MultiMutationContext`], so the first failing step stops the batch and
//! the caller rolls the transaction back.

use strata_concurrency::{MultiMutationContext, Transaction, TxnMap};
use strata_core::StrataResult;

use crate::described::Identified;

/// Primary map plus id index of one entity kind
pub struct IndexedMaps<'m, E> {
    /// Entities by qualified name
    pub primary: &'m TxnMap<E>,
    /// Qualified name by entity id
    pub by_id: &'m TxnMap<String>,
}

impl<'m, E> Clone for IndexedMaps<'m, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'m, E> Copy for IndexedMaps<'m, E> {}

/// Builder of description batches under one transaction
pub struct DescriptionMutations<'t> {
    ctx: MultiMutationContext<'t>,
}

impl<'t> DescriptionMutations<'t> {
    /// Empty batch governed by `txn`
    pub fn new(txn: &'t Transaction) -> Self {
        DescriptionMutations {
            ctx: MultiMutationContext::new(txn),
        }
    }

    /// Insert `entity` and its index entry
    pub fn create<E: Identified>(&mut self, maps: IndexedMaps<'_, E>, entity: E) -> &mut Self {
        let name = entity.name().as_str().to_string();
        let id = entity.id().to_string();
        self.ctx
            .insert(maps.primary, name.clone(), entity)
            .insert(maps.by_id, id, name);
        self
    }

    /// Move `entity` from `old_name` to its current name
    ///
    /// Removes the old primary entry, inserts the new one and points the
    /// index at the new name. Once committed, readers see the entity under
    /// exactly one of the two names.
    pub fn rename<E: Identified>(
        &mut self,
        maps: IndexedMaps<'_, E>,
        old_name: &str,
        entity: E,
    ) -> &mut Self {
        let new_name = entity.name().as_str().to_string();
        let id = entity.id().to_string();
        self.ctx
            .remove(maps.primary, old_name)
            .insert(maps.primary, new_name.clone(), entity)
            .put(maps.by_id, id, new_name);
        self
    }

    /// Remove `entity` and its index entry
    pub fn delete<E: Identified>(&mut self, maps: IndexedMaps<'_, E>, entity: &E) -> &mut Self {
        self.ctx
            .remove(maps.primary, entity.name().as_str())
            .remove(maps.by_id, entity.id().to_string());
        self
    }

    /// Queued steps
    pub fn len(&self) -> usize {
        self.ctx.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.ctx.is_empty()
    }

    /// Index of the step that failed during the last `apply`
    pub fn failed_at(&self) -> Option<usize> {
        self.ctx.failed_at()
    }

    /// Apply the batch, stopping at the first error
    pub fn apply(&mut self) -> StrataResult<usize> {
        self.ctx.apply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::tests::Note;
    use std::sync::Arc;
    use strata_concurrency::TransactionManager;
    use strata_core::{KeyOrder, QualifiedName, ReadView};
    use strata_storage::{Allocators, TxnFlatMap};

    use crate::described::Described;

    fn maps(manager: &Arc<TransactionManager>) -> (TxnMap<Note>, TxnMap<String>) {
        (
            TxnMap::new(
                manager,
                "notes",
                Box::new(TxnFlatMap::new(
                    Allocators::default(),
                    KeyOrder::Qualified.comparator(),
                )),
            ),
            TxnMap::new(
                manager,
                "notes_by_id",
                Box::new(TxnFlatMap::new(
                    Allocators::default(),
                    KeyOrder::Raw.comparator(),
                )),
            ),
        )
    }

    #[test]
    fn test_create_then_rename() {
        let manager = Arc::new(TransactionManager::new());
        let (primary, by_id) = maps(&manager);
        let indexed = IndexedMaps {
            primary: &primary,
            by_id: &by_id,
        };
        let note = Note::new("ns.old", "n");
        let id = note.id.to_string();

        let txn = manager.begin();
        let mut batch = DescriptionMutations::new(&txn);
        batch.create(indexed, note.clone());
        assert_eq!(batch.apply().unwrap(), 2);
        let created = txn.commit().unwrap();

        let txn = manager.begin();
        let mut renamed = note.clone();
        renamed.set_name(QualifiedName::parse("ns.new").unwrap());
        let mut batch = DescriptionMutations::new(&txn);
        batch.rename(indexed, "ns.old", renamed);
        assert_eq!(batch.len(), 3);
        batch.apply().unwrap();
        let moved = txn.commit().unwrap();

        let at = |version| ReadView::committed(version);
        assert!(primary.get_at("ns.old", at(created)).is_some());
        assert!(primary.get_at("ns.new", at(created)).is_none());
        assert!(primary.get_at("ns.old", at(moved)).is_none());
        assert!(primary.get_at("ns.new", at(moved)).is_some());
        assert_eq!(by_id.get_at(&id, at(moved)).as_deref(), Some("ns.new"));
    }

    #[test]
    fn test_rename_onto_taken_name_fails() {
        let manager = Arc::new(TransactionManager::new());
        let (primary, by_id) = maps(&manager);
        let indexed = IndexedMaps {
            primary: &primary,
            by_id: &by_id,
        };
        let a = Note::new("ns.a", "");
        let b = Note::new("ns.b", "");

        let txn = manager.begin();
        let mut batch = DescriptionMutations::new(&txn);
        batch.create(indexed, a.clone()).create(indexed, b);
        batch.apply().unwrap();
        txn.commit().unwrap();

        let txn = manager.begin();
        let mut moved = a.clone();
        moved.set_name(QualifiedName::parse("ns.b").unwrap());
        let mut batch = DescriptionMutations::new(&txn);
        batch.rename(indexed, "ns.a", moved);
        assert!(matches!(
            batch.apply().unwrap_err(),
            strata_core::StrataError::AlreadyExists { .. }
        ));
        assert_eq!(batch.failed_at(), Some(1));
    }

    #[test]
    fn test_delete_removes_index() {
        let manager = Arc::new(TransactionManager::new());
        let (primary, by_id) = maps(&manager);
        let indexed = IndexedMaps {
            primary: &primary,
            by_id: &by_id,
        };
        let note = Note::new("ns.a", "");

        let txn = manager.begin();
        DescriptionMutations::new(&txn)
            .create(indexed, note.clone())
            .apply()
            .unwrap();
        txn.commit().unwrap();

        let txn = manager.begin();
        DescriptionMutations::new(&txn)
            .delete(indexed, &note)
            .apply()
            .unwrap();
        let version = txn.commit().unwrap();
        assert!(by_id
            .get_at(&note.id.to_string(), ReadView::committed(version))
            .is_none());
    }
}
