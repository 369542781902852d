//! Resource registries (component C): persistent (chunked, generational) and
//! transient (bump-allocated, cleared per frame) storage.

pub mod persistent;
pub mod transient;

pub use persistent::{PersistentRegistry, QueueCommandIndices};
pub use transient::TransientRegistry;
