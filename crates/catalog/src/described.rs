//! Entity capabilities
//!
//! Every catalog entity is *described*: it has a qualified name, unique
//! within its repository, and a free-form description. Entities that live
//! in a multi-described repository are also *identified* by a stable id
//! that survives renames.

use strata_core::{QualifiedName, StrataResult};
use uuid::Uuid;

/// Named, described entity
pub trait Described: Clone + Send + Sync + 'static {
    /// Kind used in error messages ("namespace", "dataset", ...)
    const KIND: &'static str;

    /// Qualified name, the repository key
    fn name(&self) -> &QualifiedName;

    /// Description text
    fn description(&self) -> &str;

    /// Replace the description
    fn set_description(&mut self, description: String);

    /// Replace the name
    fn set_name(&mut self, name: QualifiedName);

    /// Record a modification (bump `updated_at` and the like)
    fn touch(&mut self) {}

    /// Shape check for names of this kind
    fn validate_name(_name: &QualifiedName) -> StrataResult<()> {
        Ok(())
    }
}

/// Described entity with a stable identifier
pub trait Identified: Described {
    /// Identifier, unchanged by renames
    fn id(&self) -> Uuid;
}
