//! Opaque resource handles.
//!
//! Packed 64-bit layout, low bit to high bit:
//! `index: 29 | generation: 8 | type_tag: 3 | flags: 8 | (16 reserved)`.
//!
//! No precedent for a generational handle exists anywhere in the reference
//! engine (it keeps resources alive via `Arc`), so this layout is new; it
//! follows the engine's habit of wrapping small integers in dedicated newtypes
//! (`TextureSubresource`, `BarrierTextureRange`) rather than passing raw `u64`s
//! at API boundaries.

use bitflags::bitflags;

const INDEX_BITS: u32 = crate::limits::HANDLE_INDEX_BITS;
const GENERATION_BITS: u32 = crate::limits::HANDLE_GENERATION_BITS;
const TYPE_TAG_BITS: u32 = 3;

const INDEX_SHIFT: u32 = 0;
const GENERATION_SHIFT: u32 = INDEX_SHIFT + INDEX_BITS;
const TYPE_TAG_SHIFT: u32 = GENERATION_SHIFT + GENERATION_BITS;
const FLAGS_SHIFT: u32 = TYPE_TAG_SHIFT + TYPE_TAG_BITS;

const INDEX_MASK: u64 = (1u64 << INDEX_BITS) - 1;
const GENERATION_MASK: u64 = (1u64 << GENERATION_BITS) - 1;
const TYPE_TAG_MASK: u64 = (1u64 << TYPE_TAG_BITS) - 1;
const FLAGS_MASK: u64 = 0xFF;

/// The generation field is a plain `u8`, bumped with `wrapping_add` on every
/// dispose. Known wraparound hazard: a handle from 256 allocations ago at the
/// same slot will alias the current occupant. Widening past 8 bits narrows
/// the index space; kept at 8 bits to match the documented layout.

/// What kind of resource a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResourceType {
    Buffer = 0,
    Texture = 1,
    ArgumentBuffer = 2,
    ArgumentBufferArray = 3,
    Heap = 4,
}

impl ResourceType {
    fn from_tag(tag: u64) -> Self {
        match tag {
            0 => ResourceType::Buffer,
            1 => ResourceType::Texture,
            2 => ResourceType::ArgumentBuffer,
            3 => ResourceType::ArgumentBufferArray,
            4 => ResourceType::Heap,
            _ => panic!("invalid resource type tag {tag}"),
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct HandleFlags: u8 {
        const PERSISTENT     = 0b0001;
        const WINDOW_HANDLE  = 0b0010;
        const HISTORY_BUFFER = 0b0100;
        const EXTERNAL       = 0b1000;
    }
}

/// An opaque, copyable reference to a resource slot in some registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ResourceHandle(u64);

impl ResourceHandle {
    pub fn new(index: u32, generation: u8, ty: ResourceType, flags: HandleFlags) -> Self {
        debug_assert!((index as u64) <= INDEX_MASK, "resource index overflows handle");
        let bits = ((index as u64 & INDEX_MASK) << INDEX_SHIFT)
            | ((generation as u64 & GENERATION_MASK) << GENERATION_SHIFT)
            | (((ty as u64) & TYPE_TAG_MASK) << TYPE_TAG_SHIFT)
            | ((flags.bits() as u64 & FLAGS_MASK) << FLAGS_SHIFT);
        ResourceHandle(bits)
    }

    pub fn index(&self) -> u32 {
        ((self.0 >> INDEX_SHIFT) & INDEX_MASK) as u32
    }

    pub fn generation(&self) -> u8 {
        ((self.0 >> GENERATION_SHIFT) & GENERATION_MASK) as u8
    }

    pub fn resource_type(&self) -> ResourceType {
        ResourceType::from_tag((self.0 >> TYPE_TAG_SHIFT) & TYPE_TAG_MASK)
    }

    pub fn flags(&self) -> HandleFlags {
        HandleFlags::from_bits_truncate(((self.0 >> FLAGS_SHIFT) & FLAGS_MASK) as u8)
    }

    pub fn is_persistent(&self) -> bool {
        self.flags().contains(HandleFlags::PERSISTENT)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        ResourceHandle(bits)
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("index", &self.index())
            .field("generation", &self.generation())
            .field("type", &self.resource_type())
            .field("flags", &self.flags())
            .finish()
    }
}

/// A typed newtype over an opaque backend binding path, never a bare integer
/// at API boundaries.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct ResourceBindingPath(pub u64);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct ArgumentBufferPath(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_fields() {
        let h = ResourceHandle::new(123, 7, ResourceType::Texture, HandleFlags::PERSISTENT);
        assert_eq!(h.index(), 123);
        assert_eq!(h.generation(), 7);
        assert_eq!(h.resource_type(), ResourceType::Texture);
        assert!(h.is_persistent());
    }

    #[test]
    fn distinct_generations_are_distinct_handles() {
        let a = ResourceHandle::new(5, 0, ResourceType::Buffer, HandleFlags::empty());
        let b = ResourceHandle::new(5, 1, ResourceType::Buffer, HandleFlags::empty());
        assert_ne!(a, b);
    }
}
