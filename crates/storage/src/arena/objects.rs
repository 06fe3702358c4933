//! Generational slab for index entries and trie nodes
//!
//! Objects are addressed by [`SlotId`] (index plus generation). Freed slots
//! go on a free list and bump their generation, so a stale id never
//! resolves to the object that later reuses the slot.
//!
//! Freeing is deferred: [`ObjectArena::retire`] records the version at
//! which a slot became unreachable, and [`ObjectArena::reclaim`] frees it
//! only once the GC horizon has reached that version.
//!
//! The structures in this crate unlink slots under their exclusive latch,
//! which no reader holds a slot id across. They retire at the pass's
//! horizon and reclaim in the same pass; the latch, not the deferral, is
//! what keeps those slots from being reused under a reader.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use strata_core::{StrataError, StrataResult};
use tracing::{debug, warn};

/// Handle to an object in an [`ObjectArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    /// Position in the slab
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Generation of the slot when this id was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

#[derive(Debug)]
struct Retired {
    slot: SlotId,
    at: u64,
}

/// Slab storage behind the arena lock
#[derive(Debug)]
pub struct Slab<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    live: usize,
    retired: Vec<Retired>,
}

impl<T> Slab<T> {
    fn new() -> Self {
        Slab {
            slots: Vec::new(),
            free_head: None,
            live: 0,
            retired: Vec::new(),
        }
    }

    fn allocate(&mut self, value: T, limit: Option<usize>, name: &'static str) -> StrataResult<SlotId> {
        if let Some(limit) = limit {
            if self.live >= limit {
                warn!(arena = name, live = self.live, limit, "object arena exhausted");
                return Err(StrataError::ArenaExhausted {
                    arena: name,
                    requested: 1,
                    limit,
                });
            }
        }

        if let Some(index) = self.free_head {
            if let Some(slot) = self.slots.get_mut(index as usize) {
                if let Slot::Vacant {
                    generation,
                    next_free,
                } = *slot
                {
                    *slot = Slot::Occupied { generation, value };
                    self.free_head = next_free;
                    self.live += 1;
                    return Ok(SlotId { index, generation });
                }
            }
            return Err(StrataError::internal(format!(
                "{} arena free list points at an occupied slot",
                name
            )));
        }

        let index = u32::try_from(self.slots.len())
            .map_err(|_| StrataError::internal(format!("{} arena slot index overflow", name)))?;
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        self.live += 1;
        Ok(SlotId {
            index,
            generation: 0,
        })
    }

    /// Object behind `id`, if the id is current
    pub fn get(&self, id: SlotId) -> Option<&T> {
        match self.slots.get(id.index as usize) {
            Some(Slot::Occupied { generation, value }) if *generation == id.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Mutable object behind `id`, if the id is current
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        match self.slots.get_mut(id.index as usize) {
            Some(Slot::Occupied { generation, value }) if *generation == id.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    fn free(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == id.generation => {
                let next = Slot::Vacant {
                    generation: generation.wrapping_add(1),
                    next_free: self.free_head,
                };
                let old = std::mem::replace(slot, next);
                self.free_head = Some(id.index);
                self.live -= 1;
                match old {
                    Slot::Occupied { value, .. } => Some(value),
                    Slot::Vacant { .. } => None,
                }
            }
            _ => None,
        }
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the slab holds no live objects
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

/// Usage counters for an object arena
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectArenaStats {
    /// Live objects, retired ones included
    pub live: usize,
    /// Slots ever created
    pub capacity: usize,
    /// Objects waiting for reclamation
    pub retired: usize,
    /// Total allocations
    pub allocations: u64,
    /// Total reclaimed objects
    pub reclaimed: u64,
}

/// Thread-safe generational slab
#[derive(Debug)]
pub struct ObjectArena<T> {
    slab: RwLock<Slab<T>>,
    name: &'static str,
    limit: Option<usize>,
    allocations: AtomicU64,
    reclaimed: AtomicU64,
}

impl<T> ObjectArena<T> {
    /// Unbounded arena
    pub fn new(name: &'static str) -> Self {
        Self::with_limit(name, None)
    }

    /// Arena holding at most `limit` live objects
    pub fn with_limit(name: &'static str, limit: Option<usize>) -> Self {
        ObjectArena {
            slab: RwLock::new(Slab::new()),
            name,
            limit,
            allocations: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
        }
    }

    /// Store `value` in a free slot
    ///
    /// # Errors
    ///
    /// `ArenaExhausted` when the live-object limit is reached.
    pub fn allocate(&self, value: T) -> StrataResult<SlotId> {
        self.write().allocate(value)
    }

    /// Shared access to the slab
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Slab<T>> {
        self.slab.read_recursive()
    }

    /// Exclusive access to the slab
    #[inline]
    pub fn write(&self) -> ObjectsWriter<'_, T> {
        ObjectsWriter {
            slab: self.slab.write(),
            arena: self,
        }
    }

    /// Mark `id` unreachable as of version `at`
    pub fn retire(&self, id: SlotId, at: u64) {
        self.slab.write().retired.push(Retired { slot: id, at });
    }

    /// Free every retired slot whose retirement is at or before `horizon`
    ///
    /// Returns the number of slots freed.
    pub fn reclaim(&self, horizon: u64) -> usize {
        let mut slab = self.slab.write();
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut slab.retired)
            .into_iter()
            .partition(|retired| retired.at <= horizon);
        slab.retired = pending;

        let freed = due
            .into_iter()
            .filter(|retired| slab.free(retired.slot).is_some())
            .count();
        if freed > 0 {
            self.reclaimed.fetch_add(freed as u64, Ordering::Relaxed);
            debug!(arena = self.name, freed, horizon, "reclaimed slots");
        }
        freed
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.read().live
    }

    /// Whether the arena holds no live objects
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usage counters
    pub fn stats(&self) -> ObjectArenaStats {
        let slab = self.read();
        ObjectArenaStats {
            live: slab.live,
            capacity: slab.slots.len(),
            retired: slab.retired.len(),
            allocations: self.allocations.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive access to an arena's slab that can also allocate
pub struct ObjectsWriter<'a, T> {
    slab: RwLockWriteGuard<'a, Slab<T>>,
    arena: &'a ObjectArena<T>,
}

impl<'a, T> ObjectsWriter<'a, T> {
    /// Store `value` in a free slot
    ///
    /// # Errors
    ///
    /// `ArenaExhausted` when the live-object limit is reached.
    pub fn allocate(&mut self, value: T) -> StrataResult<SlotId> {
        let id = self
            .slab
            .allocate(value, self.arena.limit, self.arena.name)?;
        self.arena.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }
}

impl<'a, T> std::ops::Deref for ObjectsWriter<'a, T> {
    type Target = Slab<T>;

    fn deref(&self) -> &Slab<T> {
        &self.slab
    }
}

impl<'a, T> std::ops::DerefMut for ObjectsWriter<'a, T> {
    fn deref_mut(&mut self) -> &mut Slab<T> {
        &mut self.slab
    }
}
