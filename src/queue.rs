//! Queue and frame completion coordination (component E).
//!
//! Grounded on `core/src/gpu/sync.rs` (`Fence`/`FenceValuePair`, the
//! value/await_value monotonic-counter idea) and the queue struct shape of
//! `engine/src/graphics/queue.rs`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::limits::MAX_QUEUES;

/// One GPU submission lane. `last_submitted`/`last_completed` are both
/// monotonic and read/written with relaxed ordering: callers only ever
/// compare them (`completed >= x`), never use them to order unrelated memory
/// accesses, so acquire/release is unnecessary here.
pub struct Queue {
    index: usize,
    last_submitted: AtomicU64,
    last_completed: AtomicU64,
}

impl Queue {
    fn new(index: usize) -> Self {
        Queue {
            index,
            last_submitted: AtomicU64::new(0),
            last_completed: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn last_submitted_command(&self) -> u64 {
        self.last_submitted.load(Ordering::Relaxed)
    }

    pub fn last_completed_command(&self) -> u64 {
        self.last_completed.load(Ordering::Relaxed)
    }

    /// Called by the backend when it submits work; the caller is responsible
    /// for only ever advancing this monotonically.
    pub fn mark_submitted(&self, command_index: u64) {
        debug_assert!(command_index >= self.last_submitted.load(Ordering::Relaxed));
        self.last_submitted.store(command_index, Ordering::Relaxed);
    }

    /// Called by the backend when the GPU reports a command index complete.
    pub fn mark_completed(&self, command_index: u64) {
        debug_assert!(command_index <= self.last_submitted.load(Ordering::Relaxed));
        self.last_completed.store(command_index, Ordering::Relaxed);
    }

    /// Busy-waits (yielding between polls) until `command_index` has
    /// completed. The only blocking primitive this crate exposes; there is no
    /// interrupt/timeout facility, matching the source.
    pub fn wait_for_command(&self, command_index: u64) {
        while self.last_completed_command() < command_index {
            std::thread::yield_now();
        }
    }
}

/// A fixed-cardinality table of GPU queues (at most `MAX_QUEUES`), plus the
/// process-wide frame-completion ratchet.
pub struct QueueTable {
    queues: Vec<Queue>,
    allocated: std::sync::atomic::AtomicU8,
}

impl QueueTable {
    pub fn new() -> Self {
        let queues = (0..MAX_QUEUES).map(Queue::new).collect();
        QueueTable {
            queues,
            allocated: std::sync::atomic::AtomicU8::new(0),
        }
    }

    /// Allocates a queue slot via a bitmask scan; `None` once all
    /// `MAX_QUEUES` slots are taken.
    pub fn allocate(&self) -> Option<usize> {
        loop {
            let mask = self.allocated.load(Ordering::Relaxed);
            let free_bit = (!mask).trailing_zeros() as usize;
            if free_bit >= MAX_QUEUES {
                return None;
            }
            let new_mask = mask | (1 << free_bit);
            if self
                .allocated
                .compare_exchange_weak(mask, new_mask, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Some(free_bit);
            }
        }
    }

    pub fn free(&self, index: usize) {
        self.allocated.fetch_and(!(1 << index), Ordering::Relaxed);
    }

    pub fn get(&self, index: usize) -> &Queue {
        &self.queues[index]
    }
}

impl Default for QueueTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Single canonical frame-completion tracker (see DESIGN.md open question 4):
/// a CAS-lifted `AtomicU64` rather than a condvar or fence-backed variant.
#[derive(Default)]
pub struct AtomicFrameCompletion {
    last_completed_frame: AtomicU64,
}

impl AtomicFrameCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_completed_frame(&self) -> u64 {
        self.last_completed_frame.load(Ordering::Relaxed)
    }

    /// Monotonically lifts the completed-frame counter to at least `frame`.
    /// A CAS loop rather than a plain store because completions may be
    /// reported out of order across queues.
    pub fn mark_frame_complete(&self, frame: u64) {
        let mut observed = self.last_completed_frame.load(Ordering::Relaxed);
        while observed < frame {
            match self
                .last_completed_frame
                .compare_exchange_weak(observed, frame, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => observed = actual,
            }
        }
    }

    pub fn wait_for_frame(&self, frame: u64) {
        while self.last_completed_frame() < frame {
            std::thread::yield_now();
        }
    }
}
