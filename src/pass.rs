//! Pass records and the pass-authoring interface.
//!
//! Grounded on `engine/src/renderer/frame_graph/mod.rs`: `RenderPass`,
//! `ResourceDescription<T>`, `FramePassResourceCreator`, `HistoryResourceEntry`.

use std::collections::HashMap;

use bumpalo::Bump;
use smallvec::SmallVec;

use crate::descriptor::{BufferDescriptor, TextureDescriptor};
use crate::handle::ResourceHandle;
use crate::registry::{PersistentRegistry, TransientRegistry};
use crate::usage::CommandRange;

/// Identifies a pass within a single frame. Stable only for the lifetime of
/// that frame; passes are re-declared every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PassId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassType {
    Graphics,
    Compute,
    Copy,
    External,
}

/// Whether a transient resource addresses the current frame's data or last
/// frame's, for resources declared with history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryResourceEntry {
    Current,
    Past,
}

impl HistoryResourceEntry {
    pub fn invert(self) -> Self {
        match self {
            HistoryResourceEntry::Current => HistoryResourceEntry::Past,
            HistoryResourceEntry::Past => HistoryResourceEntry::Current,
        }
    }
}

/// A named, typed description of a resource a pass wants created for it.
#[derive(Clone, Debug)]
pub struct ResourceDescription<T> {
    pub name: &'static str,
    pub info: T,
    pub has_history: bool,
}

/// Bookkeeping for one declared pass across its lifecycle: created, recorded,
/// frozen at compile time, cleared at frame end.
#[derive(Debug)]
pub struct PassRecord {
    pub id: PassId,
    pub name: String,
    pub pass_type: PassType,
    pub is_active: bool,
    pub command_range: CommandRange,
    pub read_resources: SmallVec<[ResourceHandle; 8]>,
    pub written_resources: SmallVec<[ResourceHandle; 8]>,
    pub unmanaged_references: SmallVec<[ResourceHandle; 4]>,
}

impl PassRecord {
    pub fn new(id: PassId, name: impl Into<String>, pass_type: PassType) -> Self {
        PassRecord {
            id,
            name: name.into(),
            pass_type,
            is_active: true,
            command_range: CommandRange { lo: 0, hi: 0 },
            read_resources: SmallVec::new(),
            written_resources: SmallVec::new(),
            unmanaged_references: SmallVec::new(),
        }
    }

    pub fn declares(&self, handle: ResourceHandle) -> bool {
        self.read_resources.contains(&handle) || self.written_resources.contains(&handle)
    }
}

/// Resource creation surface handed to `RenderPass::create_resources`.
/// `create_data` hands out scratch memory from the pass's arena, released in
/// bulk at pass end; `create_texture`/`create_buffer` materialise an actual
/// resource immediately (transient storage, or the ping-ponged persistent
/// slots backing a history resource) and hand back the handle the pass uses
/// to record commands against it.
pub struct FramePassResourceCreator<'a> {
    arena: &'a Bump,
    transient_buffers: &'a TransientRegistry<BufferDescriptor>,
    transient_textures: &'a TransientRegistry<TextureDescriptor>,
    persistent_buffers: &'a PersistentRegistry<BufferDescriptor>,
    persistent_textures: &'a PersistentRegistry<TextureDescriptor>,
    history_buffers: &'a mut HashMap<String, [ResourceHandle; 2]>,
    history_textures: &'a mut HashMap<String, [ResourceHandle; 2]>,
    frame_generation: u8,
    frame_parity: usize,
}

impl<'a> FramePassResourceCreator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        arena: &'a Bump,
        transient_buffers: &'a TransientRegistry<BufferDescriptor>,
        transient_textures: &'a TransientRegistry<TextureDescriptor>,
        persistent_buffers: &'a PersistentRegistry<BufferDescriptor>,
        persistent_textures: &'a PersistentRegistry<TextureDescriptor>,
        history_buffers: &'a mut HashMap<String, [ResourceHandle; 2]>,
        history_textures: &'a mut HashMap<String, [ResourceHandle; 2]>,
        frame_generation: u8,
        frame_parity: usize,
    ) -> Self {
        FramePassResourceCreator {
            arena,
            transient_buffers,
            transient_textures,
            persistent_buffers,
            persistent_textures,
            history_buffers,
            history_textures,
            frame_generation,
            frame_parity,
        }
    }

    pub fn create_texture(&mut self, desc: ResourceDescription<TextureDescriptor>) -> ResourceHandle {
        if desc.has_history {
            let slots = self.history_textures.entry(desc.name.to_string()).or_insert_with(|| {
                [
                    self.persistent_textures.allocate(desc.info.clone(), Some(desc.name.to_string())),
                    self.persistent_textures.allocate(desc.info, Some(desc.name.to_string())),
                ]
            });
            slots[self.frame_parity]
        } else {
            self.transient_textures
                .allocate(desc.info, self.frame_generation)
                .expect("transient texture registry exhausted for this frame")
        }
    }

    pub fn create_buffer(&mut self, desc: ResourceDescription<BufferDescriptor>) -> ResourceHandle {
        if desc.has_history {
            let slots = self.history_buffers.entry(desc.name.to_string()).or_insert_with(|| {
                [
                    self.persistent_buffers.allocate(desc.info.clone(), Some(desc.name.to_string())),
                    self.persistent_buffers.allocate(desc.info, Some(desc.name.to_string())),
                ]
            });
            slots[self.frame_parity]
        } else {
            self.transient_buffers
                .allocate(desc.info, self.frame_generation)
                .expect("transient buffer registry exhausted for this frame")
        }
    }

    /// The same history resource's slot from the other half of the ping-pong
    /// pair (last frame's contents), for a pass that reads its own history.
    pub fn history_counterpart_texture(&self, name: &str) -> Option<ResourceHandle> {
        self.history_textures.get(name).map(|slots| slots[1 - self.frame_parity])
    }

    pub fn history_counterpart_buffer(&self, name: &str) -> Option<ResourceHandle> {
        self.history_buffers.get(name).map(|slots| slots[1 - self.frame_parity])
    }

    pub fn create_data<T: 'a>(&self, value: T) -> &'a T {
        self.arena.alloc(value)
    }
}

/// User-authored unit of GPU work. Implementors declare what resources they
/// need, which of those they read/write, and record commands against an
/// encoder; the frame graph drives all three phases.
pub trait RenderPass {
    fn create_resources<'a>(&self, _creator: &mut FramePassResourceCreator<'a>) {}

    fn register_resource_accesses(&self, _record: &mut PassRecord) {}

    fn execute(&self, encoder: &mut crate::command::encoder::CommandEncoder<'_>);
}
