//! Bump-allocated storage for transient (single-frame) resources.
//!
//! Grounded on `engine/src/graphics/context.rs`'s `FrameContext`/`begin_frame`
//! cursor-reset pattern: a per-frame arena whose allocation cursor resets
//! wholesale rather than via individual frees.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::error::TransientExhaustedError;
use crate::handle::{HandleFlags, ResourceHandle, ResourceType};
use crate::limits::TRANSIENT_CAPACITY;

pub struct TransientRegistry<T> {
    resource_type: ResourceType,
    storage: Box<[RwLock<Option<T>>]>,
    cursor: AtomicU32,
    high_water: AtomicU32,
}

impl<T> TransientRegistry<T> {
    pub fn new(resource_type: ResourceType) -> Self {
        debug_assert!(TRANSIENT_CAPACITY.is_power_of_two());
        let mut storage = Vec::with_capacity(TRANSIENT_CAPACITY as usize);
        for _ in 0..TRANSIENT_CAPACITY {
            storage.push(RwLock::new(None));
        }
        TransientRegistry {
            resource_type,
            storage: storage.into_boxed_slice(),
            cursor: AtomicU32::new(0),
            high_water: AtomicU32::new(0),
        }
    }

    /// Lock-free bump allocation. `frame_generation` (the current frame index,
    /// truncated) is stamped into the handle so a transient handle from a
    /// previous frame can never alias this frame's slot semantically, even
    /// though the underlying slot index is reused every frame.
    pub fn allocate(&self, descriptor: T, frame_generation: u8) -> Result<ResourceHandle, TransientExhaustedError> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        if index >= TRANSIENT_CAPACITY {
            return Err(TransientExhaustedError {});
        }
        *self.storage[index as usize].write() = Some(descriptor);

        let mut observed = self.high_water.load(Ordering::Relaxed);
        while observed < index + 1 {
            match self
                .high_water
                .compare_exchange_weak(observed, index + 1, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => observed = actual,
            }
        }

        Ok(ResourceHandle::new(index, frame_generation, self.resource_type, HandleFlags::empty()))
    }

    pub fn with<R>(&self, handle: ResourceHandle, frame_generation: u8, f: impl FnOnce(&T) -> R) -> Option<R> {
        if handle.resource_type() != self.resource_type || handle.generation() != frame_generation {
            return None;
        }
        let slot = self.storage.get(handle.index() as usize)?.read();
        slot.as_ref().map(f)
    }

    /// Single-threaded: drops every slot allocated this frame and resets the
    /// cursor. Must only be called once no recording work for the frame is
    /// still in flight.
    pub fn clear(&mut self) {
        let used = self.high_water.swap(0, Ordering::Relaxed);
        for slot in self.storage[..used as usize].iter() {
            *slot.write() = None;
        }
        self.cursor.store(0, Ordering::Relaxed);
    }

    pub fn capacity(&self) -> u32 {
        TRANSIENT_CAPACITY
    }
}
