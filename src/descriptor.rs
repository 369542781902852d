//! Resource descriptors. Immutable once a resource has been allocated.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct BufferUsage: u32 {
        const VERTEX       = 0b1;
        const INDEX        = 0b10;
        const STORAGE      = 0b100;
        const CONSTANT     = 0b1000;
        const COPY_SRC     = 0b100000;
        const COPY_DST     = 0b1000000;
        const INDIRECT     = 0b10000000;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageMode {
    Shared,
    Managed,
    Private,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheMode {
    DefaultCache,
    WriteCombined,
}

#[derive(Clone, Debug)]
pub struct BufferDescriptor {
    pub length: u64,
    pub storage_mode: StorageMode,
    pub cache_mode: CacheMode,
    pub usage: BufferUsage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureType {
    Texture1D,
    Texture2D,
    Texture2DArray,
    Texture2DMultisample,
    TextureCube,
    TextureCubeArray,
    Texture3D,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct TextureUsage: u32 {
        const SAMPLED       = 0b1;
        const RENDER_TARGET = 0b10;
        const STORAGE       = 0b100;
        const COPY_SRC      = 0b1000;
        const COPY_DST      = 0b10000;
        const RESOLVE_SRC   = 0b100000;
        const RESOLVE_DST   = 0b1000000;
    }
}

#[derive(Clone, Debug)]
pub struct TextureDescriptor {
    pub ty: TextureType,
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub array_length: u32,
    pub storage_mode: StorageMode,
    pub cache_mode: CacheMode,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Number of array slices per mip level: `arrayLength * depth * (6 if cube else 1)`.
    pub fn slices_per_level(&self) -> u32 {
        let cube_faces = match self.ty {
            TextureType::TextureCube | TextureType::TextureCubeArray => 6,
            _ => 1,
        };
        self.array_length * self.depth.max(1) * cube_faces
    }

    /// Total addressable (slice, level) cells: `slicesPerLevel * mipLevelCount`.
    pub fn subresource_count(&self) -> u32 {
        self.slices_per_level() * self.mip_levels.max(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureSubresource {
    pub array_layer: u32,
    pub mip_level: u32,
}

#[derive(Clone, Debug)]
pub struct HeapDescriptor {
    pub size: u64,
    pub memory_type_index: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Clone, Copy, Debug)]
pub struct SamplerDescriptor {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
}
