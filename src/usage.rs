//! Per-resource usage lists and their merge/promotion rules (component B).
//!
//! Grounded on `engine/src/renderer/frame_graph/mod.rs`'s `TextureAccessKind`
//! (the `is_write`/`can_discard`/`to_access`/`to_layout` predicate family) and
//! on the older per-pass tracker in `graphics/vulkan/src/graph_template.rs`
//! (`ResourceAccess`, `ResourceMetadata`), which tracks essentially the same
//! read/write/render-target lattice at pass granularity rather than per
//! command.

use smallvec::SmallVec;

use crate::pass::PassId;
use crate::subresource::ActiveResourceRange;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ShaderStages: u16 {
        const VERTEX   = 0b0001;
        const FRAGMENT = 0b0010;
        const COMPUTE  = 0b0100;
        const CPU_BEFORE_RENDER = 0b1000;
    }
}

/// How a resource is accessed by a single usage record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageType {
    Read,
    Write,
    ReadWrite,
    UnusedRenderTarget,
    WriteOnlyRenderTarget,
    ReadWriteRenderTarget,
    InputAttachmentRenderTarget,
    Sampler,
    InputAttachment,
    ConstantBuffer,
    BlitSource,
    BlitDestination,
    BlitSynchronisation,
    MipGeneration,
    VertexBuffer,
    IndexBuffer,
    IndirectBuffer,
    UnusedArgumentBuffer,
    PreviousFrame,
}

impl UsageType {
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            UsageType::Read
                | UsageType::ReadWrite
                | UsageType::ReadWriteRenderTarget
                | UsageType::InputAttachmentRenderTarget
                | UsageType::Sampler
                | UsageType::InputAttachment
                | UsageType::ConstantBuffer
                | UsageType::BlitSource
                | UsageType::VertexBuffer
                | UsageType::IndexBuffer
                | UsageType::IndirectBuffer
        )
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            UsageType::Write
                | UsageType::ReadWrite
                | UsageType::WriteOnlyRenderTarget
                | UsageType::ReadWriteRenderTarget
                | UsageType::BlitDestination
                | UsageType::MipGeneration
        )
    }

    pub fn is_render_target(&self) -> bool {
        matches!(
            self,
            UsageType::UnusedRenderTarget
                | UsageType::WriteOnlyRenderTarget
                | UsageType::ReadWriteRenderTarget
                | UsageType::InputAttachmentRenderTarget
        )
    }

    /// Least-upper-bound in the `{read <= readWrite >= write}` lattice, used
    /// when two overlapping usages with matching stages need a single
    /// promoted type rather than two separate records.
    fn lattice_join(a: UsageType, b: UsageType) -> Option<UsageType> {
        use UsageType::*;
        if a == b {
            return Some(a);
        }
        match (a, b) {
            (Read, Write) | (Write, Read) | (Read, ReadWrite) | (ReadWrite, Read) | (Write, ReadWrite) | (ReadWrite, Write) => {
                Some(ReadWrite)
            }
            (UnusedRenderTarget, WriteOnlyRenderTarget) | (WriteOnlyRenderTarget, UnusedRenderTarget) => Some(WriteOnlyRenderTarget),
            (WriteOnlyRenderTarget, ReadWriteRenderTarget) | (ReadWriteRenderTarget, WriteOnlyRenderTarget) => {
                Some(ReadWriteRenderTarget)
            }
            (UnusedRenderTarget, ReadWriteRenderTarget) | (ReadWriteRenderTarget, UnusedRenderTarget) => Some(ReadWriteRenderTarget),
            _ => None,
        }
    }
}

/// A half-open `[lo, hi)` range of command indices within a pass (or, after
/// compilation, within the whole frame).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandRange {
    pub lo: u32,
    pub hi: u32,
}

impl CommandRange {
    pub fn point(at: u32) -> Self {
        CommandRange { lo: at, hi: at + 1 }
    }

    fn union(&self, other: &Self) -> Self {
        CommandRange {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    pub fn contains(&self, index: u32) -> bool {
        index >= self.lo && index < self.hi
    }
}

/// One record of how a single resource was used during one pass.
#[derive(Clone, Debug)]
pub struct Usage {
    pub ty: UsageType,
    pub stages: ShaderStages,
    pub in_argument_buffer: bool,
    pub owning_pass: PassId,
    pub command_range: CommandRange,
    pub active_range: ActiveResourceRange,
}

impl Usage {
    pub fn is_active(&self) -> bool {
        !matches!(self.ty, UsageType::UnusedRenderTarget | UsageType::UnusedArgumentBuffer)
    }

    pub fn affects_gpu_barriers(&self, pass_is_active: bool, pass_is_external: bool) -> bool {
        pass_is_active
            && !pass_is_external
            && !self.stages.contains(ShaderStages::CPU_BEFORE_RENDER)
            && self.ty != UsageType::UnusedRenderTarget
    }
}

/// The ordered usage history of a single resource across a frame.
#[derive(Clone, Debug, Default)]
pub struct UsageList {
    entries: SmallVec<[Usage; 4]>,
}

impl UsageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Usage> {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Usage> {
        self.entries.iter_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_active_usage(&self) -> Option<&Usage> {
        self.entries.iter().find(|u| u.is_active())
    }

    /// Attempts to merge `next` into the tail entry; appends a new entry
    /// otherwise. `subresource_count`/`buffer_len` are needed to canonicalise
    /// the combined active range.
    pub fn append(&mut self, next: Usage, subresource_count: u32, buffer_len: u64) {
        debug_assert!(
            self.entries.last().map_or(true, |tail| tail.owning_pass != next.owning_pass
                || next.command_range.lo >= tail.command_range.lo),
            "usage recorded out of order within a pass"
        );

        if let Some(tail) = self.entries.last_mut() {
            if tail.owning_pass != next.owning_pass {
                self.entries.push(next);
                return;
            }

            // Rule 2: render-target + overlapping-or-adjacent read promotes to
            // an input attachment, or truncates and starts a fresh record.
            // Adjacency (`next.lo == tail.hi`) still counts: half-open ranges
            // mean a read recorded immediately after the render-target write,
            // with nothing else touching this resource in between, is the
            // same logical span.
            if tail.ty.is_render_target()
                && (next.ty == UsageType::InputAttachment || next.ty == UsageType::Read)
                && next.command_range.lo <= tail.command_range.hi
            {
                tail.ty = UsageType::InputAttachmentRenderTarget;
                tail.stages = tail.stages.union(next.stages);
                tail.in_argument_buffer = tail.in_argument_buffer || next.in_argument_buffer;
                tail.active_range = tail.active_range.union(&next.active_range, subresource_count, buffer_len);
                tail.command_range = tail.command_range.union(&next.command_range);
                return;
            }
            if tail.ty.is_render_target() && next.ty.is_render_target() {
                // literal source behaviour: truncate tail, start a fresh node
                // for `next` rather than merging into one wider record (see
                // DESIGN.md open question #3).
                tail.command_range.hi = next.command_range.lo.max(tail.command_range.lo);
                let mut promoted = next;
                promoted.ty = UsageType::InputAttachmentRenderTarget;
                self.entries.push(promoted);
                return;
            }

            // Rule 3: overlapping ranges, same stages, promotable type lattice.
            if tail.stages == next.stages
                && tail.in_argument_buffer == next.in_argument_buffer
                && tail
                    .active_range
                    .intersects(&next.active_range, subresource_count, buffer_len)
            {
                if let Some(joined) = UsageType::lattice_join(tail.ty, next.ty) {
                    debug_assert!(
                        !(tail.ty.is_write() && next.ty.is_write() && tail.ty != next.ty),
                        "conflicting writes to the same resource range within a pass"
                    );
                    tail.ty = joined;
                    tail.active_range = tail.active_range.union(&next.active_range, subresource_count, buffer_len);
                    tail.command_range = tail.command_range.union(&next.command_range);
                    return;
                }
            }

            // Rule 4: plain mergeable — equal non-write types (or render
            // target), matching argument-buffer placement.
            let mergeable = tail.ty == next.ty
                && tail.in_argument_buffer == next.in_argument_buffer
                && (!tail.ty.is_write() || tail.ty.is_render_target());
            if mergeable {
                tail.stages = tail.stages.union(next.stages);
                tail.active_range = tail.active_range.union(&next.active_range, subresource_count, buffer_len);
                tail.command_range = tail.command_range.union(&next.command_range);
                return;
            }
        }

        self.entries.push(next);
    }

    /// Remaps every record's command range from per-pass-local offsets to
    /// global frame offsets, by adding `base` (the sum of command-stream
    /// lengths of all passes submitted before this one).
    pub fn remap_to_global(&mut self, base: u32) {
        for entry in self.entries.iter_mut() {
            entry.command_range.lo += base;
            entry.command_range.hi += base;
        }
    }
}
