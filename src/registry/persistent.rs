//! Chunked, generation-versioned storage for persistent resources.
//!
//! Grounded on `engine/src/graphics/allocator.rs` (`Chunk`/`ChunkInner`,
//! free-list coalescing on drop) and `engine/src/graphics/destroyer.rs`
//! (`DeferredDestroyer`, frame-counter-gated retain-based drain). The source
//! sub-allocates byte ranges inside a chunk; this registry instead hands out
//! fixed-size generational slots, one per resource, since a resource handle
//! is a slot index rather than a byte offset.

use std::collections::VecDeque;

use log::trace;
use parking_lot::{Mutex, RwLock};

use crate::error::StaleHandleError;
use crate::handle::{HandleFlags, ResourceHandle, ResourceType};
use crate::limits::{PERSISTENT_CHUNK_ITEMS, PERSISTENT_MAX_CHUNKS};

/// Per-queue GPU command indices that must complete before the CPU may read
/// or write a resource.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueCommandIndices(pub [u64; crate::limits::MAX_QUEUES]);

struct Slot<T> {
    descriptor: Option<T>,
    generation: u8,
    label: Option<String>,
    read_wait: QueueCommandIndices,
    write_wait: QueueCommandIndices,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot {
            descriptor: None,
            generation: 0,
            label: None,
            read_wait: QueueCommandIndices::default(),
            write_wait: QueueCommandIndices::default(),
        }
    }
}

type Chunk<T> = Box<[RwLock<Slot<T>>]>;

fn new_chunk<T>() -> Chunk<T> {
    let mut v = Vec::with_capacity(PERSISTENT_CHUNK_ITEMS);
    for _ in 0..PERSISTENT_CHUNK_ITEMS {
        v.push(RwLock::new(Slot::default()));
    }
    v.into_boxed_slice()
}

/// Structural state: growing the chunk list, the free list, and the pending
/// disposal queue. Guarded by a single lock (the "spinlock" of the design);
/// individual slot contents have their own lock so a validated read does not
/// contend with allocation of unrelated slots, matching the source's
/// lock-free-once-validated intent (traded here for a per-slot `RwLock`
/// rather than raw unsynchronised reads, since chunk pointers being stable
/// is not by itself enough to make concurrent field reads/writes safe).
struct Inner<T> {
    chunks: Vec<Chunk<T>>,
    free_list: VecDeque<u32>,
    disposals: Vec<(u64, u32)>,
}

pub struct PersistentRegistry<T> {
    resource_type: ResourceType,
    inner: Mutex<Inner<T>>,
}

impl<T> PersistentRegistry<T> {
    pub fn new(resource_type: ResourceType) -> Self {
        PersistentRegistry {
            resource_type,
            inner: Mutex::new(Inner {
                chunks: Vec::new(),
                free_list: VecDeque::new(),
                disposals: Vec::new(),
            }),
        }
    }

    fn chunk_and_local(index: u32) -> (usize, usize) {
        let chunk = index as usize / PERSISTENT_CHUNK_ITEMS;
        let local = index as usize % PERSISTENT_CHUNK_ITEMS;
        (chunk, local)
    }

    pub fn allocate(&self, descriptor: T, label: Option<String>) -> ResourceHandle {
        let mut inner = self.inner.lock();
        let index = if let Some(reused) = inner.free_list.pop_front() {
            reused
        } else {
            if inner.chunks.len() >= PERSISTENT_MAX_CHUNKS {
                panic!("persistent registry exhausted all {PERSISTENT_MAX_CHUNKS} chunks");
            }
            let chunk_index = inner.chunks.len();
            inner.chunks.push(new_chunk());
            trace!("persistent registry grew to {} chunks", inner.chunks.len());
            (chunk_index * PERSISTENT_CHUNK_ITEMS) as u32
        };

        let (chunk_idx, local) = Self::chunk_and_local(index);
        let generation = {
            let mut slot = inner.chunks[chunk_idx][local].write();
            slot.descriptor = Some(descriptor);
            slot.label = label;
            slot.read_wait = QueueCommandIndices::default();
            slot.write_wait = QueueCommandIndices::default();
            slot.generation
        };

        ResourceHandle::new(index, generation, self.resource_type, HandleFlags::PERSISTENT)
    }

    fn slot_for(&self, handle: ResourceHandle) -> Result<(usize, usize), StaleHandleError> {
        if handle.resource_type() != self.resource_type {
            return Err(StaleHandleError {});
        }
        Ok(Self::chunk_and_local(handle.index()))
    }

    /// Looks up a resource by handle, failing if the handle is stale (its
    /// generation no longer matches the slot's current occupant).
    pub fn try_with<R>(&self, handle: ResourceHandle, f: impl FnOnce(&T) -> R) -> Result<R, StaleHandleError> {
        let (chunk_idx, local) = self.slot_for(handle)?;
        let inner = self.inner.lock();
        let chunk = inner.chunks.get(chunk_idx).ok_or(StaleHandleError {})?;
        let slot = chunk[local].read();
        if slot.generation != handle.generation() {
            return Err(StaleHandleError {});
        }
        let descriptor = slot.descriptor.as_ref().ok_or(StaleHandleError {})?;
        Ok(f(descriptor))
    }

    pub fn set_wait_indices(&self, handle: ResourceHandle, read: Option<QueueCommandIndices>, write: Option<QueueCommandIndices>) {
        let Ok((chunk_idx, local)) = self.slot_for(handle) else { return };
        let inner = self.inner.lock();
        if let Some(chunk) = inner.chunks.get(chunk_idx) {
            let mut slot = chunk[local].write();
            if slot.generation == handle.generation() {
                if let Some(r) = read {
                    slot.read_wait = r;
                }
                if let Some(w) = write {
                    slot.write_wait = w;
                }
            }
        }
    }

    /// Queues `handle` for destruction once `clear(current_frame)` is next
    /// called with a frame far enough ahead that no in-flight command can
    /// still reference it. Matches `DeferredDestroyer::destroy_*`.
    pub fn dispose(&self, handle: ResourceHandle, frame_counter: u64) {
        let mut inner = self.inner.lock();
        inner.disposals.push((frame_counter, handle.index()));
    }

    /// Disposes `handle` immediately, bypassing the deferred queue. Used when
    /// the backend already guarantees no in-flight usage (the `atEndOfFrame =
    /// false` variant from the design).
    pub fn dispose_immediate(&self, handle: ResourceHandle) {
        let (chunk_idx, local) = match self.slot_for(handle) {
            Ok(v) => v,
            Err(_) => return,
        };
        let mut inner = self.inner.lock();
        if let Some(chunk) = inner.chunks.get(chunk_idx) {
            let mut slot = chunk[local].write();
            if slot.generation == handle.generation() {
                slot.descriptor = None;
                slot.generation = slot.generation.wrapping_add(1);
                drop(slot);
                inner.free_list.push_back(handle.index());
            }
        }
    }

    /// Drains every disposal whose frame has fully completed (`completed_frame
    /// >= frame_counter`), bumping each freed slot's generation so any handle
    /// referencing it becomes stale, then returns the freed slots to the pool.
    pub fn clear(&self, completed_frame: u64) {
        let mut inner = self.inner.lock();
        let mut remaining = Vec::with_capacity(inner.disposals.len());
        let due: Vec<u32> = inner
            .disposals
            .drain(..)
            .filter_map(|(frame, index)| {
                if frame <= completed_frame {
                    Some(index)
                } else {
                    remaining.push((frame, index));
                    None
                }
            })
            .collect();
        inner.disposals = remaining;

        for index in due {
            let (chunk_idx, local) = Self::chunk_and_local(index);
            if let Some(chunk) = inner.chunks.get(chunk_idx) {
                let mut slot = chunk[local].write();
                slot.descriptor = None;
                slot.generation = slot.generation.wrapping_add(1);
                drop(slot);
                inner.free_list.push_back(index);
                trace!("persistent slot {index} disposed at frame {completed_frame}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_generation_reuse_invalidates_stale_handles() {
        let registry: PersistentRegistry<u32> = PersistentRegistry::new(ResourceType::Buffer);
        let h1 = registry.allocate(42, None);
        registry.dispose_immediate(h1);
        let h2 = registry.allocate(43, None);

        assert!(registry.try_with(h1, |v| *v).is_err());
        assert_eq!(registry.try_with(h2, |v| *v).unwrap(), 43);
        assert_ne!(h1.generation(), h2.generation());
    }

    #[test]
    fn deferred_dispose_waits_for_frame() {
        let registry: PersistentRegistry<u32> = PersistentRegistry::new(ResourceType::Buffer);
        let h1 = registry.allocate(1, None);
        registry.dispose(h1, 5);
        registry.clear(4);
        assert!(registry.try_with(h1, |v| *v).is_ok(), "not due yet");
        registry.clear(5);
        assert!(registry.try_with(h1, |v| *v).is_err(), "due, should be gone");
    }
}
