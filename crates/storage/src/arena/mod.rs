//! Arena allocators
//!
//! - [`StringArena`]: chunked storage for key bytes
//! - [`ObjectArena`]: generational slab for entries and nodes
//!
//! One [`Allocators`] pair is shared by every structure of a repository,
//! so keys interned for the primary map are reused by its indices.

mod objects;
mod strings;

pub use objects::{ObjectArena, ObjectArenaStats, ObjectsWriter, Slab, SlotId};
pub use strings::{
    StrRef, StringArena, StringArenaStats, StringsReader, DEFAULT_STRING_CHUNK_BYTES,
    MIN_STRING_CHUNK_BYTES,
};

use std::sync::Arc;

use crate::version::Entry;

/// Arena sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaLimits {
    /// Chunk size of the string arena
    pub string_chunk_bytes: usize,
    /// Upper bound on stored key bytes
    pub max_string_bytes: Option<usize>,
    /// Upper bound on live entries
    pub max_objects: Option<usize>,
}

impl Default for ArenaLimits {
    fn default() -> Self {
        ArenaLimits {
            string_chunk_bytes: DEFAULT_STRING_CHUNK_BYTES,
            max_string_bytes: None,
            max_objects: None,
        }
    }
}

/// String arena plus entry arena shared by a repository's structures
pub struct Allocators<V> {
    /// Key bytes
    pub strings: Arc<StringArena>,
    /// Index entries with their version chains
    pub entries: Arc<ObjectArena<Entry<V>>>,
}

impl<V> Allocators<V> {
    /// Fresh arenas sized by `limits`
    pub fn new(limits: ArenaLimits) -> Self {
        Allocators {
            strings: Arc::new(StringArena::with_limits(
                limits.string_chunk_bytes,
                limits.max_string_bytes,
            )),
            entries: Arc::new(ObjectArena::with_limit("entry", limits.max_objects)),
        }
    }

    /// Fresh entry arena drawing keys from an existing string arena
    pub fn with_strings(strings: Arc<StringArena>, max_objects: Option<usize>) -> Self {
        Allocators {
            strings,
            entries: Arc::new(ObjectArena::with_limit("entry", max_objects)),
        }
    }
}

impl<V> Clone for Allocators<V> {
    fn clone(&self) -> Self {
        Allocators {
            strings: Arc::clone(&self.strings),
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for Allocators<V> {
    fn default() -> Self {
        Allocators::new(ArenaLimits::default())
    }
}

impl<V> std::fmt::Debug for Allocators<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocators")
            .field("strings", &self.strings.stats())
            .field("entries", &self.entries.stats())
            .finish()
    }
}
