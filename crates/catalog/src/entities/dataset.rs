//! Datasets
//!
//! A dataset is named `<namespace>.<leaf>` and can be renamed, including
//! into another namespace. Creating or renaming a dataset resolves the
//! owning namespace under the caller's transaction; the lookup is recorded
//! as a read dependency, so a concurrent namespace delete makes one of the
//! two transactions fail to commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_concurrency::{Transaction, TransactionManager};
use strata_core::{QualifiedName, StrataError, StrataResult};
use uuid::Uuid;

use crate::described::{Described, Identified};
use crate::entities::namespace::NamespaceStore;
use crate::multi::MultiDescribedRepository;
use crate::repository::{with_transaction, Listing};

/// A dataset record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Stable identifier
    pub id: Uuid,
    /// `<namespace>.<leaf>`
    pub name: QualifiedName,
    /// Free-form description
    pub description: String,
    /// Storage format ("parquet", "csv", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// User-defined properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Dataset {
    /// New dataset with a fresh id
    pub fn new(name: QualifiedName, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Dataset {
            id: Uuid::new_v4(),
            name,
            description: description.into(),
            format: None,
            properties: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Same dataset with a storage format
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Same dataset with one more property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Owning namespace
    pub fn namespace(&self) -> StrataResult<QualifiedName> {
        owning_namespace::<Self>(&self.name)
    }
}

/// The namespace part of a `<namespace>.<leaf>` name
pub(crate) fn owning_namespace<E: Described>(name: &QualifiedName) -> StrataResult<QualifiedName> {
    name.parent().ok_or_else(|| {
        StrataError::invalid_input(format!(
            "{} name '{}' must be qualified by a namespace",
            E::KIND,
            name
        ))
    })
}

impl Described for Dataset {
    const KIND: &'static str = "dataset";

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
        self.updated_at = Utc::now();
    }

    fn validate_name(name: &QualifiedName) -> StrataResult<()> {
        owning_namespace::<Self>(name).map(|_| ())
    }
}

impl Identified for Dataset {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Store of datasets, checked against the namespace store
#[derive(Debug, Clone)]
pub struct DatasetStore {
    datasets: MultiDescribedRepository<Dataset>,
    namespaces: NamespaceStore,
}

impl DatasetStore {
    /// Store over `datasets`, resolving namespaces in `namespaces`
    pub fn new(datasets: MultiDescribedRepository<Dataset>, namespaces: NamespaceStore) -> Self {
        DatasetStore {
            datasets,
            namespaces,
        }
    }

    /// Generic repository underneath
    pub fn repository(&self) -> &MultiDescribedRepository<Dataset> {
        &self.datasets
    }

    /// Manager the store is registered with
    pub fn manager(&self) -> &Arc<TransactionManager> {
        self.datasets.manager()
    }

    /// Create `dataset` in its own transaction
    pub fn create(&self, dataset: Dataset) -> StrataResult<Dataset> {
        with_transaction(self.manager(), |txn| self.create_in(txn, dataset))
    }

    /// Create `dataset` under `txn`
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the name has no namespace part
    /// - `ReferenceNotFound` if the namespace is not visible to `txn`
    /// - `AlreadyExists` if the name is taken
    pub fn create_in(&self, txn: &Transaction, dataset: Dataset) -> StrataResult<Dataset> {
        let namespace = dataset.namespace()?;
        self.namespaces.require(txn, namespace.as_str())?;
        self.datasets.create_in(txn, dataset)
    }

    /// Dataset visible at committed `snapshot`
    pub fn get(&self, name: &str, snapshot: u64) -> StrataResult<Dataset> {
        self.datasets.get(name, snapshot)
    }

    /// Dataset visible to `txn`
    pub fn get_in(&self, txn: &Transaction, name: &str) -> StrataResult<Dataset> {
        self.datasets.get_in(txn, name)
    }

    /// Latest committed dataset
    pub fn get_latest(&self, name: &str) -> StrataResult<Dataset> {
        self.datasets.get_latest(name)
    }

    /// Dataset with identifier `id`
    pub fn get_by_id(&self, txn: &Transaction, id: Uuid) -> StrataResult<Dataset> {
        self.datasets.get_by_id(txn, id)
    }

    /// Resolve a dataset reference, recording a read dependency
    pub fn require(&self, txn: &Transaction, name: &str) -> StrataResult<Dataset> {
        self.datasets.require(txn, name)
    }

    /// Replace the description
    pub fn update_description(
        &self,
        txn: &Transaction,
        name: &str,
        description: impl Into<String>,
    ) -> StrataResult<Dataset> {
        self.datasets.update_description(txn, name, description)
    }

    /// Apply `mutator`; renames go through [`rename`](Self::rename)
    pub fn update<F>(&self, txn: &Transaction, name: &str, mutator: F) -> StrataResult<Dataset>
    where
        F: FnOnce(&mut Dataset) -> StrataResult<()>,
    {
        self.datasets.update(txn, name, mutator)
    }

    /// Stage the removal of a dataset
    pub fn delete(&self, txn: &Transaction, name: &str) -> StrataResult<Dataset> {
        self.datasets.delete(txn, name)
    }

    /// Move a dataset to `new_name`, possibly into another namespace
    pub fn rename(&self, txn: &Transaction, old_name: &str, new_name: &str) -> StrataResult<Dataset> {
        let target = QualifiedName::parse(new_name)?;
        let namespace = owning_namespace::<Dataset>(&target)?;
        self.namespaces.require(txn, namespace.as_str())?;
        self.datasets.rename(txn, old_name, new_name)
    }

    /// Datasets under `prefix` at committed `snapshot`
    pub fn list(&self, prefix: &str, snapshot: u64) -> StrataResult<Listing<'_, Dataset>> {
        self.datasets.list(prefix, snapshot)
    }

    /// Datasets under `prefix` visible to `txn`
    pub fn list_in(&self, txn: &Transaction, prefix: &str) -> StrataResult<Listing<'_, Dataset>> {
        self.datasets.list_in(txn, prefix)
    }

    /// Datasets directly or transitively under `namespace`
    pub fn list_namespace(
        &self,
        txn: &Transaction,
        namespace: &QualifiedName,
    ) -> StrataResult<Listing<'_, Dataset>> {
        self.datasets.list_in(txn, &namespace.nested_prefix())
    }
}
