//! Users

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_core::{QualifiedName, StrataError, StrataResult};

use crate::described::Described;
use crate::repository::DescribedRepository;

/// Store of users: a flat map in raw byte order
pub type UserStore = DescribedRepository<User>;

/// A user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Login name, a single segment
    pub name: QualifiedName,
    /// Free-form description
    pub description: String,
    /// Contact address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// New user stamped with the current time
    pub fn new(name: QualifiedName, description: impl Into<String>) -> Self {
        let now = Utc::now();
        User {
            name,
            description: description.into(),
            email: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Same user with a contact address
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl Described for User {
    const KIND: &'static str = "user";

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
        if name.depth() != 1 {
            return Err(StrataError::invalid_input(format!(
                "user name '{}' must be a single segment",
                name
            )));
        }
        Ok(())
    }
}
