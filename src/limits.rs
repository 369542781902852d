//! Compile-time capacity constants shared across the crate.

/// Maximum number of GPU queues tracked for frame completion.
pub const MAX_QUEUES: usize = 8;

/// Maximum number of argument buffer slots a single binding can target.
pub const MAX_ARGUMENT_BUFFER_SLOTS: usize = 8;

/// Number of slots per persistent registry chunk.
pub const PERSISTENT_CHUNK_ITEMS: usize = 4096;

/// Maximum number of chunks a persistent registry may grow to.
pub const PERSISTENT_MAX_CHUNKS: usize = 256;

/// Fixed capacity of the transient resource registry (must be a power of two).
pub const TRANSIENT_CAPACITY: u32 = 16384;

/// Number of bits in a resource handle's generation counter.
pub const HANDLE_GENERATION_BITS: u32 = 8;

/// Number of bits in a resource handle's index field.
pub const HANDLE_INDEX_BITS: u32 = 29;
