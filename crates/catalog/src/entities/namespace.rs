//! Namespaces
//!
//! Top of the naming hierarchy. A namespace name may itself be nested
//! (`analytics.raw`); datasets and repositories live one segment below it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_core::QualifiedName;

use crate::described::Described;
use crate::repository::DescribedRepository;

/// Store of namespaces: a burst trie in qualified-name order
pub type NamespaceStore = DescribedRepository<Namespace>;

/// A namespace record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    /// Qualified name
    pub name: QualifiedName,
    /// Free-form description
    pub description: String,
    /// User-defined properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Namespace {
    /// New namespace stamped with the current time
    pub fn new(name: QualifiedName, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Namespace {
            name,
            description: description.into(),
            properties: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Same namespace with one more property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl Described for Namespace {
    const KIND: &'static str = "namespace";

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
}
