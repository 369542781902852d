//! The recorded command stream: a tagged union over every verb an encoder
//! can emit, stored by index rather than by raw pointer so the binding state
//! machine can mutate an already-recorded command (per SPEC_FULL.md's
//! redesign note — the source mutates command payloads through retained
//! pointers, which does not translate to safe Rust).
//!
//! Grounded on the verb surface of `core/src/gpu/command.rs`
//! (`CommandBuffer<B>`'s draw/dispatch/copy/barrier/debug-group methods).
//!
//! Payloads are owned (`Box<str>`/`Vec<u8>`/`SmallVec`) rather than borrowed
//! from the pass's scratch arena: a command can be rewritten in place after
//! recording (`set_buffer_offset`), and a stream built this frame must be
//! able to outlive the arena once the frame graph moves on to compiling and
//! submitting it. Descriptor/data creation through `FramePassResourceCreator`
//! still uses the arena; only recorded command payloads are owned here.

use smallvec::SmallVec;

use crate::descriptor::TextureSubresource;
use crate::handle::{ArgumentBufferPath, ResourceBindingPath, ResourceHandle};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scissor {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// How a pending bind is addressed before it is resolved through reflection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BindingKey {
    Named { name: Box<str>, array_index: u32 },
    Path(ResourceBindingPath),
    InArgumentBuffer { buffer: ArgumentBufferPath, name: Box<str> },
}

impl BindingKey {
    pub fn named(name: impl Into<Box<str>>, array_index: u32) -> Self {
        BindingKey::Named { name: name.into(), array_index }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineId(pub u32);

#[derive(Clone, Debug)]
pub enum Command {
    SetBytes { binding: BindingKey, data: Vec<u8> },
    SetBuffer { binding: BindingKey, buffer: ResourceHandle, offset: u64 },
    SetBufferOffset { binding: BindingKey, offset: u64 },
    SetTexture { binding: BindingKey, texture: ResourceHandle },
    SetSamplerState { binding: BindingKey, sampler: ResourceHandle },
    SetArgumentBuffer { binding: BindingKey, buffer: ResourceHandle },
    SetArgumentBufferArray { binding: BindingKey, buffers: SmallVec<[ResourceHandle; 8]> },
    SetVertexBuffer { slot: u32, buffer: ResourceHandle, offset: u64 },
    SetVertexBufferOffset { slot: u32, offset: u64 },
    SetViewport(Viewport),
    SetScissorRect(Scissor),
    SetRenderPipeline(PipelineId),
    SetComputePipeline(PipelineId),
    DrawPrimitives { vertex_start: u32, vertex_count: u32, instance_count: u32, base_instance: u32 },
    DrawIndexedPrimitives { index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32, base_instance: u32 },
    DispatchThreads { width: u32, height: u32, depth: u32 },
    DispatchThreadgroups { groups_x: u32, groups_y: u32, groups_z: u32 },
    DispatchThreadgroupsIndirect { indirect_buffer: ResourceHandle, offset: u64 },
    CopyBufferToBuffer { src: ResourceHandle, src_offset: u64, dst: ResourceHandle, dst_offset: u64, size: u64 },
    CopyBufferToTexture { src: ResourceHandle, src_offset: u64, dst: ResourceHandle, dst_subresource: TextureSubresource },
    CopyTextureToBuffer { src: ResourceHandle, src_subresource: TextureSubresource, dst: ResourceHandle, dst_offset: u64 },
    CopyTextureToTexture { src: ResourceHandle, src_subresource: TextureSubresource, dst: ResourceHandle, dst_subresource: TextureSubresource },
    FillBuffer { buffer: ResourceHandle, offset: u64, size: u64, value: u8 },
    GenerateMipmaps { texture: ResourceHandle },
    SynchroniseBuffer { buffer: ResourceHandle },
    SynchroniseTexture { texture: ResourceHandle },
    SynchroniseTextureSlice { texture: ResourceHandle, subresource: TextureSubresource },
    ClearRenderTargets,
    EncodeExternalCommand(u32),
    PushDebugGroup(Box<str>),
    PopDebugGroup,
    InsertDebugSignpost(Box<str>),
}

/// An index into a `CommandStream`. Mutating an already-recorded command
/// (the deferred path-resolution rewrite) goes through this index rather
/// than a retained pointer into the stream's backing storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommandIndex(pub u32);

/// The ordered sequence of commands recorded for one pass.
#[derive(Debug, Default)]
pub struct CommandStream {
    commands: Vec<Command>,
}

impl CommandStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) -> CommandIndex {
        let index = CommandIndex(self.commands.len() as u32);
        self.commands.push(command);
        index
    }

    pub fn get(&self, index: CommandIndex) -> &Command {
        &self.commands[index.0 as usize]
    }

    pub fn get_mut(&mut self, index: CommandIndex) -> &mut Command {
        &mut self.commands[index.0 as usize]
    }

    pub fn len(&self) -> u32 {
        self.commands.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn last_index(&self) -> Option<CommandIndex> {
        if self.commands.is_empty() {
            None
        } else {
            Some(CommandIndex(self.commands.len() as u32 - 1))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// Appends `other`'s commands to the end of this stream, returning the
    /// offset they were shifted by (used when compiling per-pass streams
    /// into one global stream).
    pub fn append(&mut self, other: CommandStream) -> u32 {
        let base = self.len();
        self.commands.extend(other.commands);
        base
    }
}
