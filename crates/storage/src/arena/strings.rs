//! Chunked string arena
//!
//! Key bytes are appended into large chunks and addressed by a small
//! [`StrRef`] handle. Chunks are never moved or freed while the arena
//! lives, so a handle stays valid for the arena's lifetime.
//!
//! Interning is best-effort deduplicated: a fingerprint table maps the
//! FxHash of the bytes to the last handle stored for them. A fingerprint
//! collision just stores the bytes again.

use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard};
use rustc_hash::FxHasher;
use std::hash::{BuildHasherDefault, Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use strata_core::{StrataError, StrataResult};
use tracing::warn;

/// Default chunk size (64 KB)
pub const DEFAULT_STRING_CHUNK_BYTES: usize = 64 * 1024;

/// Smallest accepted chunk size
pub const MIN_STRING_CHUNK_BYTES: usize = 256;

/// Handle to bytes stored in a [`StringArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrRef {
    chunk: u32,
    offset: u32,
    len: u32,
}

impl StrRef {
    /// Length of the referenced bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the referenced string is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Usage counters for a string arena
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringArenaStats {
    /// Number of chunks allocated
    pub chunks: usize,
    /// Bytes of string data stored
    pub bytes_used: usize,
    /// Bytes reserved across all chunks
    pub bytes_reserved: usize,
    /// Successful intern calls
    pub interned: u64,
    /// Intern calls answered from the fingerprint table
    pub dedup_hits: u64,
}

/// Append-only, chunked byte storage for keys
#[derive(Debug)]
pub struct StringArena {
    chunks: RwLock<Vec<Vec<u8>>>,
    fingerprints: DashMap<u64, StrRef, BuildHasherDefault<FxHasher>>,
    chunk_bytes: usize,
    limit: Option<usize>,
    bytes_used: AtomicUsize,
    interned: AtomicU64,
    dedup_hits: AtomicU64,
}

impl StringArena {
    /// Arena with default chunk size and no limit
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_STRING_CHUNK_BYTES, None)
    }

    /// Arena with an explicit chunk size and optional byte limit
    ///
    /// Chunk sizes below [`MIN_STRING_CHUNK_BYTES`] are raised to it.
    pub fn with_limits(chunk_bytes: usize, limit: Option<usize>) -> Self {
        StringArena {
            chunks: RwLock::new(Vec::new()),
            fingerprints: DashMap::with_hasher(BuildHasherDefault::default()),
            chunk_bytes: chunk_bytes.max(MIN_STRING_CHUNK_BYTES),
            limit,
            bytes_used: AtomicUsize::new(0),
            interned: AtomicU64::new(0),
            dedup_hits: AtomicU64::new(0),
        }
    }

    /// Store `bytes` and return a handle to them
    ///
    /// Must not be called while holding a [`StringsReader`] of this arena.
    ///
    /// # Errors
    ///
    /// `ArenaExhausted` when the byte limit would be exceeded.
    pub fn intern(&self, bytes: &[u8]) -> StrataResult<StrRef> {
        let fingerprint = fingerprint(bytes);
        if let Some(candidate) = self.fingerprints.get(&fingerprint).map(|entry| *entry) {
            if self.read().bytes(candidate) == bytes {
                self.interned.fetch_add(1, Ordering::Relaxed);
                self.dedup_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(candidate);
            }
        }

        let handle = self.append(bytes)?;
        self.fingerprints.insert(fingerprint, handle);
        self.interned.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    fn append(&self, bytes: &[u8]) -> StrataResult<StrRef> {
        let len = u32::try_from(bytes.len()).map_err(|_| {
            StrataError::invalid_input(format!("key of {} bytes is too large", bytes.len()))
        })?;

        let mut chunks = self.chunks.write();
        let used = self.bytes_used.load(Ordering::Relaxed);
        if let Some(limit) = self.limit {
            if used + bytes.len() > limit {
                warn!(requested = bytes.len(), used, limit, "string arena exhausted");
                return Err(StrataError::ArenaExhausted {
                    arena: "string",
                    requested: bytes.len(),
                    limit,
                });
            }
        }

        let index = match chunks.last() {
            Some(chunk) if chunk.capacity() - chunk.len() >= bytes.len() => chunks.len() - 1,
            _ => {
                chunks.push(Vec::with_capacity(self.chunk_bytes.max(bytes.len())));
                chunks.len() - 1
            }
        };
        let chunk = &mut chunks[index];
        let offset = chunk.len();
        chunk.extend_from_slice(bytes);
        self.bytes_used.store(used + bytes.len(), Ordering::Relaxed);

        let chunk = u32::try_from(index)
            .map_err(|_| StrataError::internal("string arena chunk index overflow"))?;
        let offset = u32::try_from(offset)
            .map_err(|_| StrataError::internal("string arena offset overflow"))?;
        Ok(StrRef { chunk, offset, len })
    }

    /// Acquire a reader for resolving handles
    ///
    /// Readers are recursive and never block each other.
    #[inline]
    pub fn read(&self) -> StringsReader<'_> {
        StringsReader {
            chunks: self.chunks.read_recursive(),
        }
    }

    /// Copy the string behind `handle`
    pub fn resolve(&self, handle: StrRef) -> String {
        self.read().to_string(handle)
    }

    /// Usage counters
    pub fn stats(&self) -> StringArenaStats {
        let chunks = self.chunks.read_recursive();
        StringArenaStats {
            chunks: chunks.len(),
            bytes_used: self.bytes_used.load(Ordering::Relaxed),
            bytes_reserved: chunks.iter().map(Vec::capacity).sum(),
            interned: self.interned.load(Ordering::Relaxed),
            dedup_hits: self.dedup_hits.load(Ordering::Relaxed),
        }
    }
}

impl Default for StringArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Read access to a string arena's chunks
pub struct StringsReader<'a> {
    chunks: RwLockReadGuard<'a, Vec<Vec<u8>>>,
}

impl<'a> StringsReader<'a> {
    /// Bytes behind `handle`
    ///
    /// A handle from a different arena resolves to an empty slice.
    #[inline]
    pub fn bytes(&self, handle: StrRef) -> &[u8] {
        let start = handle.offset as usize;
        let end = start + handle.len as usize;
        self.chunks
            .get(handle.chunk as usize)
            .and_then(|chunk| chunk.get(start..end))
            .unwrap_or_default()
    }

    /// Owned copy of the string behind `handle`
    pub fn to_string(&self, handle: StrRef) -> String {
        String::from_utf8_lossy(self.bytes(handle)).into_owned()
    }
}

fn fingerprint(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    bytes.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_intern_and_resolve() {
        let arena = StringArena::new();
        let a = arena.intern(b"ns1.ds1").unwrap();
        let b = arena.intern(b"ns1.ds2").unwrap();
        assert_eq!(arena.resolve(a), "ns1.ds1");
        assert_eq!(arena.resolve(b), "ns1.ds2");
        assert_eq!(a.len(), 7);
    }

    #[test]
    fn test_intern_deduplicates() {
        let arena = StringArena::new();
        let a = arena.intern(b"same").unwrap();
        let b = arena.intern(b"same").unwrap();
        assert_eq!(a, b);
        let stats = arena.stats();
        assert_eq!(stats.bytes_used, 4);
        assert_eq!(stats.dedup_hits, 1);
        assert_eq!(stats.interned, 2);
    }

    #[test]
    fn test_empty_string() {
        let arena = StringArena::new();
        let handle = arena.intern(b"").unwrap();
        assert!(handle.is_empty());
        assert_eq!(arena.resolve(handle), "");
    }

    #[test]
    fn test_spills_into_new_chunks() {
        let arena = StringArena::with_limits(MIN_STRING_CHUNK_BYTES, None);
        let handles: Vec<_> = (0..100)
            .map(|i| arena.intern(format!("key-{:05}", i).as_bytes()).unwrap())
            .collect();
        assert!(arena.stats().chunks > 1);
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(arena.resolve(handle), format!("key-{:05}", i));
        }
    }

    #[test]
    fn test_oversized_string_gets_own_chunk() {
        let arena = StringArena::with_limits(MIN_STRING_CHUNK_BYTES, None);
        let big = "x".repeat(MIN_STRING_CHUNK_BYTES * 3);
        let handle = arena.intern(big.as_bytes()).unwrap();
        assert_eq!(arena.resolve(handle), big);
    }

    #[test]
    fn test_limit_reports_exhaustion() {
        let arena = StringArena::with_limits(MIN_STRING_CHUNK_BYTES, Some(10));
        arena.intern(b"12345678").unwrap();
        let err = arena.intern(b"abc").unwrap_err();
        assert!(matches!(
            err,
            StrataError::ArenaExhausted {
                arena: "string",
                requested: 3,
                limit: 10
            }
        ));
        // Existing strings still dedup without allocating
        assert!(arena.intern(b"12345678").is_ok());
    }

    #[test]
    fn test_concurrent_intern() {
        let arena = Arc::new(StringArena::with_limits(MIN_STRING_CHUNK_BYTES, None));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let arena = Arc::clone(&arena);
                thread::spawn(move || {
                    (0..200)
                        .map(|i| {
                            let key = format!("t{}.k{}", t, i);
                            (arena.intern(key.as_bytes()).unwrap(), key)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            for (handle, key) in handle.join().unwrap() {
                assert_eq!(arena.resolve(handle), key);
            }
        }
    }
}
