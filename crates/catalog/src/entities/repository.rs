//! Repositories of datasets
//!
//! A repository groups datasets under an owning user. Its name is
//! `<namespace>.<leaf>` like a dataset's. Create, rename and
//! [`RepositoryStore::set_datasets`] resolve every reference (namespace,
//! owner, datasets) under the caller's transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strata_concurrency::{Transaction, TransactionManager};
use strata_core::{QualifiedName, StrataResult};
use uuid::Uuid;

use crate::described::{Described, Identified};
use crate::entities::dataset::{owning_namespace, DatasetStore};
use crate::entities::namespace::NamespaceStore;
use crate::entities::user::UserStore;
use crate::multi::MultiDescribedRepository;
use crate::repository::{with_transaction, Listing};

/// A repository record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Stable identifier
    pub id: Uuid,
    /// `<namespace>.<leaf>`
    pub name: QualifiedName,
    /// Free-form description
    pub description: String,
    /// Name of the owning user
    pub owner: QualifiedName,
    /// Member datasets, by qualified name
    #[serde(default)]
    pub datasets: Vec<QualifiedName>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    /// New, empty repository with a fresh id
    pub fn new(name: QualifiedName, owner: QualifiedName, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Repository {
            id: Uuid::new_v4(),
            name,
            description: description.into(),
            owner,
            datasets: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Same repository with one more member dataset
    pub fn with_dataset(mut self, dataset: QualifiedName) -> Self {
        self.datasets.push(dataset);
        self
    }

    /// Owning namespace
    pub fn namespace(&self) -> StrataResult<QualifiedName> {
        owning_namespace::<Self>(&self.name)
    }
}

impl Described for Repository {
    const KIND: &'static str = "repository";

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

impl Identified for Repository {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Store of repositories, checked against the other three stores
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    repositories: MultiDescribedRepository<Repository>,
    namespaces: NamespaceStore,
    users: UserStore,
    datasets: DatasetStore,
}

impl RepositoryStore {
    /// Store over `repositories`, resolving references in the other stores
    pub fn new(
        repositories: MultiDescribedRepository<Repository>,
        namespaces: NamespaceStore,
        users: UserStore,
        datasets: DatasetStore,
    ) -> Self {
        RepositoryStore {
            repositories,
            namespaces,
            users,
            datasets,
        }
    }

    /// Generic repository underneath
    pub fn repository(&self) -> &MultiDescribedRepository<Repository> {
        &self.repositories
    }

    /// Manager the store is registered with
    pub fn manager(&self) -> &Arc<TransactionManager> {
        self.repositories.manager()
    }

    fn require_members(&self, txn: &Transaction, datasets: &[QualifiedName]) -> StrataResult<()> {
        for dataset in datasets {
            self.datasets.require(txn, dataset.as_str())?;
        }
        Ok(())
    }

    /// Create `repository` in its own transaction
    pub fn create(&self, repository: Repository) -> StrataResult<Repository> {
        with_transaction(self.manager(), |txn| self.create_in(txn, repository))
    }

    /// Create `repository` under `txn`
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the name has no namespace part
    /// - `ReferenceNotFound` if the namespace, the owner or a member
    ///   dataset is not visible to `txn`
    /// - `AlreadyExists` if the name is taken
    pub fn create_in(&self, txn: &Transaction, repository: Repository) -> StrataResult<Repository> {
        let namespace = repository.namespace()?;
        self.namespaces.require(txn, namespace.as_str())?;
        self.users.require(txn, repository.owner.as_str())?;
        self.require_members(txn, &repository.datasets)?;
        self.repositories.create_in(txn, repository)
    }

    /// Repository visible at committed `snapshot`
    pub fn get(&self, name: &str, snapshot: u64) -> StrataResult<Repository> {
        self.repositories.get(name, snapshot)
    }

    /// Repository visible to `txn`
    pub fn get_in(&self, txn: &Transaction, name: &str) -> StrataResult<Repository> {
        self.repositories.get_in(txn, name)
    }

    /// Latest committed repository
    pub fn get_latest(&self, name: &str) -> StrataResult<Repository> {
        self.repositories.get_latest(name)
    }

    /// Repository with identifier `id`
    pub fn get_by_id(&self, txn: &Transaction, id: Uuid) -> StrataResult<Repository> {
        self.repositories.get_by_id(txn, id)
    }

    /// Replace the description
    pub fn update_description(
        &self,
        txn: &Transaction,
        name: &str,
        description: impl Into<String>,
    ) -> StrataResult<Repository> {
        self.repositories.update_description(txn, name, description)
    }

    /// Replace the member datasets
    pub fn set_datasets(
        &self,
        txn: &Transaction,
        name: &str,
        datasets: Vec<QualifiedName>,
    ) -> StrataResult<Repository> {
        self.require_members(txn, &datasets)?;
        self.repositories.update(txn, name, |repository| {
            repository.datasets = datasets;
            Ok(())
        })
    }

    /// Hand the repository to another user
    pub fn transfer(&self, txn: &Transaction, name: &str, owner: &str) -> StrataResult<Repository> {
        let user = self.users.require(txn, owner)?;
        self.repositories.update(txn, name, |repository| {
            repository.owner = user.name;
            Ok(())
        })
    }

    /// Stage the removal of a repository; member datasets are untouched
    pub fn delete(&self, txn: &Transaction, name: &str) -> StrataResult<Repository> {
        self.repositories.delete(txn, name)
    }

    /// Move a repository to `new_name`
    pub fn rename(
        &self,
        txn: &Transaction,
        old_name: &str,
        new_name: &str,
    ) -> StrataResult<Repository> {
        let target = QualifiedName::parse(new_name)?;
        let namespace = owning_namespace::<Repository>(&target)?;
        self.namespaces.require(txn, namespace.as_str())?;
        self.repositories.rename(txn, old_name, new_name)
    }

    /// Repositories under `prefix` at committed `snapshot`
    pub fn list(&self, prefix: &str, snapshot: u64) -> StrataResult<Listing<'_, Repository>> {
        self.repositories.list(prefix, snapshot)
    }

    /// Repositories under `prefix` visible to `txn`
    pub fn list_in(
        &self,
        txn: &Transaction,
        prefix: &str,
    ) -> StrataResult<Listing<'_, Repository>> {
        self.repositories.list_in(txn, prefix)
    }
}
