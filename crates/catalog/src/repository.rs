//! Described repository
//!
//! Generic CRUD over a [`Described`] entity kind stored in one
//! transaction-managed map keyed by qualified name. Every operation runs
//! under a caller-supplied transaction except [`create`] and
//! [`get_latest`], which open an implicit one.
//!
//! ## Error translation
//!
//! Map-level `NotFound` / `AlreadyExists` become entity-level errors naming
//! the entity kind. `Conflict` and `InvalidState` pass through untouched.
//!
//! [`create`]: DescribedRepository::create
//! [`get_latest`]: DescribedRepository::get_latest

use std::fmt;
use std::sync::Arc;
use strata_concurrency::{SnapshotPin, Transaction, TransactionManager, TxnMap};
use strata_core::{ReadView, StrataError, StrataResult};
use strata_storage::{Range, StoreStats};

use crate::described::Described;

/// Run `f` in a fresh transaction
///
/// Commits when `f` returns `Ok`, rolls back when it returns `Err`. A
/// commit conflict is returned as is; nothing is retried.
pub fn with_transaction<T, F>(manager: &Arc<TransactionManager>, f: F) -> StrataResult<T>
where
    F: FnOnce(&Transaction) -> StrataResult<T>,
{
    let txn = manager.begin();
    match f(&txn) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(err) => {
            txn.rollback();
            Err(err)
        }
    }
}

/// Rewrite key-level errors in terms of entity kind `E`
pub(crate) fn entity_error<E: Described>(err: StrataError, name: &str) -> StrataError {
    match err {
        StrataError::NotFound { .. } => StrataError::not_found(E::KIND, name),
        StrataError::AlreadyExists { .. } => StrataError::already_exists(E::KIND, name),
        other => other,
    }
}

/// Lazy, restartable listing of entities in qualified-name order
///
/// A listing at an explicit snapshot pins that snapshot until it is
/// dropped, so garbage collection never prunes a page it has yet to read.
pub struct Listing<'a, E> {
    range: Range<'a, E>,
    pin: Option<SnapshotPin>,
}

impl<'a, E> Listing<'a, E> {
    pub(crate) fn new(range: Range<'a, E>) -> Self {
        Listing { range, pin: None }
    }

    pub(crate) fn pinned(range: Range<'a, E>, pin: SnapshotPin) -> Self {
        Listing {
            range,
            pin: Some(pin),
        }
    }

    /// Snapshot held for this listing, if it runs outside a transaction
    pub fn pinned_snapshot(&self) -> Option<u64> {
        self.pin.as_ref().map(SnapshotPin::snapshot)
    }

    /// Prefix being listed
    pub fn prefix(&self) -> &str {
        self.range.prefix()
    }

    /// Start over from the first entity
    pub fn restart(&mut self) {
        self.range.restart();
    }
}

impl<'a, E> Iterator for Listing<'a, E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        self.range.next().map(|(_, entity)| entity)
    }
}

impl<'a, E> fmt::Debug for Listing<'a, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listing")
            .field("range", &self.range)
            .field("pin", &self.pin)
            .finish()
    }
}

/// CRUD over one entity kind
pub struct DescribedRepository<E> {
    map: TxnMap<E>,
}

impl<E: Described> DescribedRepository<E> {
    /// Repository over `map`
    pub fn new(map: TxnMap<E>) -> Self {
        DescribedRepository { map }
    }

    /// Underlying map
    pub fn map(&self) -> &TxnMap<E> {
        &self.map
    }

    /// Manager the map is registered with
    pub fn manager(&self) -> &Arc<TransactionManager> {
        self.map.manager()
    }

    /// Create `entity` in its own transaction
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if an entity with the same name is visible
    /// - `Conflict` if another transaction created it concurrently
    pub fn create(&self, entity: E) -> StrataResult<E> {
        with_transaction(self.manager(), |txn| self.create_in(txn, entity))
    }

    /// Create `entity` under `txn`
    pub fn create_in(&self, txn: &Transaction, entity: E) -> StrataResult<E> {
        E::validate_name(entity.name())?;
        let name = entity.name().as_str().to_string();
        self.map
            .insert(txn, &name, entity.clone())
            .map_err(|err| entity_error::<E>(err, &name))?;
        Ok(entity)
    }

    /// Entity visible at committed `snapshot`
    ///
    /// # Errors
    ///
    /// - `NotFound` if nothing is visible at `snapshot`
    /// - `InvalidInput` if `snapshot` is older than the GC horizon or newer
    ///   than the last commit
    pub fn get(&self, name: &str, snapshot: u64) -> StrataResult<E> {
        let _pin = self.manager().pin(snapshot)?;
        self.map
            .get_at(name, ReadView::committed(snapshot))
            .ok_or_else(|| StrataError::not_found(E::KIND, name))
    }

    /// Entity visible to `txn`
    pub fn get_in(&self, txn: &Transaction, name: &str) -> StrataResult<E> {
        self.find_in(txn, name)?
            .ok_or_else(|| StrataError::not_found(E::KIND, name))
    }

    /// Entity visible to `txn`, `None` if absent
    pub fn find_in(&self, txn: &Transaction, name: &str) -> StrataResult<Option<E>> {
        self.map.get(txn, name)
    }

    /// Latest committed entity
    pub fn get_latest(&self, name: &str) -> StrataResult<E> {
        with_transaction(self.manager(), |txn| self.get_in(txn, name))
    }

    /// Whether `txn` can see `name`
    pub fn exists_in(&self, txn: &Transaction, name: &str) -> StrataResult<bool> {
        self.map.contains(txn, name)
    }

    /// Resolve a reference from another entity
    ///
    /// Records a read dependency, so `txn` fails to commit if the
    /// referenced entity changes or disappears after its snapshot.
    ///
    /// # Errors
    ///
    /// `ReferenceNotFound` if `txn` cannot see `name`.
    pub fn require(&self, txn: &Transaction, name: &str) -> StrataResult<E> {
        self.map
            .get_tracked(txn, name)?
            .ok_or_else(|| StrataError::reference_not_found(E::KIND, name))
    }

    /// Apply `mutator` to the entity and stage the result
    ///
    /// # Errors
    ///
    /// - `NotFound` if `txn` cannot see `name`
    /// - `Conflict` if the entity was changed or deleted after `txn`'s
    ///   snapshot
    /// - `InvalidInput` if the mutator renamed the entity
    pub fn update<F>(&self, txn: &Transaction, name: &str, mutator: F) -> StrataResult<E>
    where
        F: FnOnce(&mut E) -> StrataResult<()>,
    {
        let mut entity = self.get_in(txn, name)?;
        self.map.modified_since(txn, name)?;
        mutator(&mut entity)?;
        if entity.name().as_str() != name {
            return Err(StrataError::invalid_input(format!(
                "update cannot rename {} '{}'",
                E::KIND,
                name
            )));
        }
        entity.touch();
        self.map.put(txn, name, entity.clone())?;
        Ok(entity)
    }

    /// Replace the description
    pub fn update_description(
        &self,
        txn: &Transaction,
        name: &str,
        description: impl Into<String>,
    ) -> StrataResult<E> {
        let description = description.into();
        self.update(txn, name, |entity| {
            entity.set_description(description);
            Ok(())
        })
    }

    /// Stage the removal of `name`, returning the removed entity
    pub fn delete(&self, txn: &Transaction, name: &str) -> StrataResult<E> {
        self.get_in(txn, name)?;
        self.map.modified_since(txn, name)?;
        self.map
            .remove(txn, name)
            .map_err(|err| entity_error::<E>(err, name))
    }

    /// Entities under `prefix` at committed `snapshot`
    ///
    /// The listing keeps `snapshot` pinned until it is dropped.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `snapshot` is older than the GC horizon or newer
    /// than the last commit.
    pub fn list(&self, prefix: &str, snapshot: u64) -> StrataResult<Listing<'_, E>> {
        let pin = self.manager().pin(snapshot)?;
        let range = self.map.range_at(prefix, ReadView::committed(snapshot));
        Ok(Listing::pinned(range, pin))
    }

    /// Entities under `prefix` visible to `txn`
    pub fn list_in(&self, txn: &Transaction, prefix: &str) -> StrataResult<Listing<'_, E>> {
        Ok(Listing::new(self.map.range(txn, prefix)?))
    }

    /// Shape counters of the underlying structure
    pub fn stats(&self) -> StoreStats {
        self.map.stats()
    }
}

impl<E> Clone for DescribedRepository<E> {
    fn clone(&self) -> Self {
        DescribedRepository {
            map: self.map.clone(),
        }
    }
}

impl<E> fmt::Debug for DescribedRepository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescribedRepository")
            .field("map", &self.map)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use strata_core::{KeyOrder, QualifiedName};
    use strata_storage::{Allocators, BurstTrie, TxnFlatMap};
    use uuid::Uuid;

    use crate::described::Identified;

    /// Minimal entity for exercising the generic layer
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Note {
        pub(crate) id: Uuid,
        pub(crate) name: QualifiedName,
        pub(crate) description: String,
        pub(crate) revision: u32,
    }

    impl Note {
        pub(crate) fn new(name: &str, description: &str) -> Self {
            Note {
                id: Uuid::new_v4(),
                name: QualifiedName::parse(name).unwrap(),
                description: description.to_string(),
                revision: 0,
            }
        }
    }

    impl Described for Note {
        const KIND: &'static str = "note";

        fn name(&self) -> &QualifiedName {
            &self.name
        }
        fn description(&self) -> &str {
            &self.description
        }
        fn set_description(&mut self, description: String) {
            self.description = description;
        }
        fn set_name(&mut self, name: QualifiedName) {
            self.name = name;
        }
        fn touch(&mut self) {
            self.revision += 1;
        }
    }

    impl Identified for Note {
        fn id(&self) -> Uuid {
            self.id
        }
    }

    fn repos() -> Vec<DescribedRepository<Note>> {
        let manager = Arc::new(TransactionManager::new());
        vec![
            DescribedRepository::new(TxnMap::new(
                &manager,
                "flat",
                Box::new(TxnFlatMap::new(
                    Allocators::default(),
                    KeyOrder::Qualified.comparator(),
                )),
            )),
            DescribedRepository::new(TxnMap::new(
                &manager,
                "trie",
                Box::new(BurstTrie::new(Allocators::default(), 2)),
            )),
        ]
    }

    #[test]
    fn test_round_trip() {
        for repo in repos() {
            repo.create(Note::new("ns1.ds1", "d1")).unwrap();
            assert_eq!(repo.get_latest("ns1.ds1").unwrap().description, "d1");

            let txn = repo.manager().begin();
            let updated = repo.update_description(&txn, "ns1.ds1", "d2").unwrap();
            assert_eq!(updated.revision, 1);
            txn.commit().unwrap();
            assert_eq!(repo.get_latest("ns1.ds1").unwrap().description, "d2");

            let txn = repo.manager().begin();
            assert_eq!(repo.delete(&txn, "ns1.ds1").unwrap().description, "d2");
            txn.commit().unwrap();
            let err = repo.get_latest("ns1.ds1").unwrap_err();
            assert_eq!(err, StrataError::not_found("note", "ns1.ds1"));
        }
    }

    #[test]
    fn test_create_duplicate() {
        for repo in repos() {
            repo.create(Note::new("ns.a", "x")).unwrap();
            let err = repo.create(Note::new("ns.a", "y")).unwrap_err();
            assert_eq!(err, StrataError::already_exists("note", "ns.a"));
            assert_eq!(repo.get_latest("ns.a").unwrap().description, "x");
        }
    }

    #[test]
    fn test_concurrent_update_conflicts() {
        for repo in repos() {
            repo.create(Note::new("ns1.ds1", "d1")).unwrap();
            let t2 = repo.manager().begin();
            let t3 = repo.manager().begin();

            repo.update_description(&t2, "ns1.ds1", "d2").unwrap();
            t2.commit().unwrap();

            let err = repo.update_description(&t3, "ns1.ds1", "d3").unwrap_err();
            assert!(err.is_conflict());
            t3.rollback();

            let t4 = repo.manager().begin();
            assert_eq!(repo.get_in(&t4, "ns1.ds1").unwrap().description, "d2");
        }
    }

    #[test]
    fn test_update_or_delete_missing() {
        for repo in repos() {
            let txn = repo.manager().begin();
            assert!(repo
                .update_description(&txn, "ns.none", "x")
                .unwrap_err()
                .is_not_found());
            assert!(repo.delete(&txn, "ns.none").unwrap_err().is_not_found());
        }
    }

    #[test]
    fn test_update_cannot_rename() {
        for repo in repos() {
            repo.create(Note::new("ns.a", "x")).unwrap();
            let txn = repo.manager().begin();
            let err = repo
                .update(&txn, "ns.a", |note| {
                    note.set_name(QualifiedName::parse("ns.b")?);
                    Ok(())
                })
                .unwrap_err();
            assert!(matches!(err, StrataError::InvalidInput { .. }));
        }
    }

    #[test]
    fn test_list_prefix() {
        for repo in repos() {
            for name in ["ns1.a", "ns2.c", "ns1.b"] {
                repo.create(Note::new(name, "")).unwrap();
            }
            let snapshot = repo.manager().current_version();
            let names: Vec<String> = repo
                .list("ns1.", snapshot)
                .unwrap()
                .map(|note| note.name.to_string())
                .collect();
            assert_eq!(names, vec!["ns1.a", "ns1.b"]);

            let mut listing = repo.list("ns", snapshot).unwrap();
            assert_eq!(listing.pinned_snapshot(), Some(snapshot));
            assert_eq!(listing.by_ref().count(), 3);
            listing.restart();
            assert_eq!(listing.count(), 3);
            assert_eq!(repo.manager().pinned_count(), 0);
        }
    }

    fn paged_repo() -> DescribedRepository<Note> {
        let manager = Arc::new(TransactionManager::new());
        DescribedRepository::new(
            TxnMap::new(
                &manager,
                "paged",
                Box::new(BurstTrie::new(Allocators::default(), 2)),
            )
            .with_page_size(1),
        )
    }

    #[test]
    fn test_listing_survives_gc_between_pages() {
        let repo = paged_repo();
        for name in ["ns.a", "ns.b", "ns.c"] {
            repo.create(Note::new(name, "")).unwrap();
        }
        let snapshot = repo.manager().current_version();

        let mut listing = repo.list("ns.", snapshot).unwrap();
        assert_eq!(listing.next().unwrap().name.as_str(), "ns.a");

        let txn = repo.manager().begin();
        repo.delete(&txn, "ns.c").unwrap();
        txn.commit().unwrap();
        let report = repo.manager().collect_garbage();
        assert_eq!(report.horizon, snapshot);

        // The open listing still holds the snapshot
        assert_eq!(repo.get("ns.c", snapshot).unwrap().name.as_str(), "ns.c");
        let rest: Vec<String> = listing.map(|note| note.name.to_string()).collect();
        assert_eq!(rest, vec!["ns.b", "ns.c"]);
        assert!(repo.get("ns.c", snapshot).is_err());
    }

    #[test]
    fn test_snapshot_reads_reject_collected_snapshots() {
        let repo = paged_repo();
        repo.create(Note::new("ns.a", "")).unwrap();
        let old = repo.manager().current_version();
        let txn = repo.manager().begin();
        repo.delete(&txn, "ns.a").unwrap();
        txn.commit().unwrap();
        repo.manager().collect_garbage();

        let err = repo.list("ns.", old).unwrap_err();
        assert!(matches!(err, StrataError::InvalidInput { .. }));
        let err = repo.get("ns.a", old).unwrap_err();
        assert!(matches!(err, StrataError::InvalidInput { .. }));

        let ahead = repo.manager().current_version() + 1;
        assert!(repo.list("ns.", ahead).is_err());
        assert_eq!(repo.manager().pinned_count(), 0);
    }

    #[test]
    fn test_require_missing_reference() {
        for repo in repos() {
            let txn = repo.manager().begin();
            let err = repo.require(&txn, "ns.parent").unwrap_err();
            assert_eq!(err, StrataError::reference_not_found("note", "ns.parent"));
            assert_eq!(txn.read_dependencies(), 1);
        }
    }

    #[test]
    fn test_closure_error_rolls_back() {
        let repo = repos().remove(0);
        let result: StrataResult<()> = with_transaction(repo.manager(), |txn| {
            repo.create_in(txn, Note::new("ns.a", ""))?;
            Err(StrataError::invalid_input("abort"))
        });
        assert!(result.is_err());
        assert!(repo.get_latest("ns.a").unwrap_err().is_not_found());
    }
}
