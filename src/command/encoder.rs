//! The command-encoder binding state machine (component D).
//!
//! Grounded on `engine/src/graphics/command.rs` (`CommandBuffer`'s
//! bind_*/set_*/draw/dispatch/copy/blit methods, `split_render_pass`) and on
//! the dedup concept behind `graphics/vulkan/src/descriptor.rs`'s
//! `DirtyDescriptorSets`. The source resolves binding paths against the
//! active pipeline's reflection either immediately (fast path) or, when the
//! pipeline itself is changing, retroactively over everything bound so far
//! (deferred path); both paths are implemented below, along with the
//! render-target attachment side map and the argument-buffer-array
//! isBound-flips-once rule.

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;

use crate::descriptor::TextureSubresource;
use crate::handle::{ResourceBindingPath, ResourceHandle};
use crate::pass::PassId;
use crate::usage::{CommandRange, ShaderStages, Usage, UsageList, UsageType};

use super::stream::{BindingKey, Command, CommandIndex, CommandStream, PipelineId, Scissor, Viewport};
use crate::subresource::ActiveResourceRange;

/// What a backend's pipeline reflection tells the encoder about one binding.
#[derive(Clone, Copy, Debug)]
pub struct ArgumentReflection {
    pub binding_path: ResourceBindingPath,
    pub usage_type: UsageType,
    pub stages: ShaderStages,
}

/// Backend-supplied metadata for the currently bound pipeline. See
/// SPEC_FULL.md §6.
pub trait PipelineReflection {
    fn binding_path(&self, name: &str, array_index: u32) -> Option<ResourceBindingPath>;
    fn argument_reflection(&self, path: ResourceBindingPath) -> Option<ArgumentReflection>;
    fn binding_is_active(&self, path: ResourceBindingPath) -> bool;
}

/// Gives the encoder the per-resource shape it needs to canonicalise active
/// ranges (subresource count for textures, length for buffers), without
/// requiring the encoder to hold a registry reference directly.
pub trait ResourceShapeLookup {
    fn shape(&self, handle: ResourceHandle) -> (u32, u64);
}

/// Resolves a pipeline id to the backend's reflection for it, boxed so the
/// encoder does not need to be generic over a concrete backend type. A
/// `RenderBackend` implementor gets this for free (see `backend.rs`).
pub trait ReflectionProvider {
    fn reflection_for(&self, pipeline: PipelineId, is_compute: bool) -> Box<dyn PipelineReflection>;
}

struct PendingBind {
    key: BindingKey,
    resource: ResourceHandle,
    in_argument_buffer: bool,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum CurrentBindingKey {
    Buffer(BindingKey),
    Texture(BindingKey),
    Sampler(BindingKey),
    ArgumentBuffer(BindingKey),
}

impl CurrentBindingKey {
    fn key(&self) -> &BindingKey {
        match self {
            CurrentBindingKey::Buffer(k) | CurrentBindingKey::Texture(k) | CurrentBindingKey::Sampler(k) | CurrentBindingKey::ArgumentBuffer(k) => k,
        }
    }

    fn in_argument_buffer(&self) -> bool {
        matches!(self, CurrentBindingKey::ArgumentBuffer(_))
    }
}

struct CurrentBinding {
    resource: ResourceHandle,
    offset: u64,
    command_index: CommandIndex,
}

/// Which render-pass attachment slot a bound render target occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttachmentSlot {
    Color(u8),
    Depth,
    Stencil,
}

struct AttachmentBinding {
    texture: ResourceHandle,
    resolve_texture: Option<ResourceHandle>,
}

/// Records commands for a single pass and tracks resource usage as it goes.
/// `'b` is the lifetime of the (read-only) shape lookup and reflection
/// provider it borrows.
pub struct CommandEncoder<'b> {
    pass_id: PassId,
    stream: CommandStream,
    shapes: &'b dyn ResourceShapeLookup,
    reflection_provider: &'b dyn ReflectionProvider,
    current_reflection: Option<Box<dyn PipelineReflection>>,
    usages: HashMap<ResourceHandle, UsageList>,
    current_bindings: HashMap<CurrentBindingKey, CurrentBinding>,
    pending: Vec<PendingBind>,
    bound_argument_buffer_arrays: HashSet<BindingKey>,
    pending_argument_buffer_arrays: Vec<(BindingKey, SmallVec<[ResourceHandle; 8]>)>,
    vertex_buffers: HashMap<u32, CurrentBinding>,
    attachments: HashMap<AttachmentSlot, AttachmentBinding>,
    bound_uav_resources: HashSet<ResourceHandle>,
    has_pipeline: bool,
}

impl<'b> CommandEncoder<'b> {
    pub fn new(pass_id: PassId, shapes: &'b dyn ResourceShapeLookup, reflection_provider: &'b dyn ReflectionProvider) -> Self {
        CommandEncoder {
            pass_id,
            stream: CommandStream::new(),
            shapes,
            reflection_provider,
            current_reflection: None,
            usages: HashMap::new(),
            current_bindings: HashMap::new(),
            pending: Vec::new(),
            bound_argument_buffer_arrays: HashSet::new(),
            pending_argument_buffer_arrays: Vec::new(),
            vertex_buffers: HashMap::new(),
            attachments: HashMap::new(),
            bound_uav_resources: HashSet::new(),
            has_pipeline: false,
        }
    }

    fn next_index(&self) -> CommandIndex {
        CommandIndex(self.stream.len())
    }

    fn record_usage(&mut self, resource: ResourceHandle, ty: UsageType, stages: ShaderStages, at: CommandIndex, in_argument_buffer: bool) {
        let (subresource_count, buffer_len) = self.shapes.shape(resource);
        let entry = self.usages.entry(resource).or_default();
        entry.append(
            Usage {
                ty,
                stages,
                in_argument_buffer,
                owning_pass: self.pass_id,
                command_range: CommandRange::point(at.0),
                active_range: ActiveResourceRange::FullResource,
            },
            subresource_count,
            buffer_len,
        );
        if ty.is_write() && ty.is_read() {
            self.bound_uav_resources.insert(resource);
        }
    }

    fn refresh_uav_usages(&mut self, at: CommandIndex) {
        let uavs: Vec<ResourceHandle> = self.bound_uav_resources.iter().copied().collect();
        for resource in uavs {
            self.record_usage(resource, UsageType::ReadWrite, ShaderStages::COMPUTE, at, false);
        }
    }

    /// Binds a buffer at `key`. Deduplicates against the currently bound
    /// buffer+offset for the same key regardless of pipeline state; resolves
    /// the binding path immediately if a pipeline is already active,
    /// otherwise queues it for the next `set_pipeline` reconciliation pass.
    pub fn set_buffer(&mut self, key: BindingKey, buffer: ResourceHandle, offset: u64) {
        let dedup_key = CurrentBindingKey::Buffer(key.clone());
        if let Some(existing) = self.current_bindings.get(&dedup_key) {
            if existing.resource == buffer && existing.offset == offset {
                return;
            }
        }

        let index = self.next_index();
        self.stream.push(Command::SetBuffer { binding: key.clone(), buffer, offset });
        self.current_bindings.insert(dedup_key, CurrentBinding { resource: buffer, offset, command_index: index });
        self.resolve_or_defer(key, buffer, false);
    }

    /// Rewrites the offset of a previously recorded `SetBuffer` in place
    /// rather than emitting a new command, matching the source's "mutate the
    /// buffered args and mark dynamic" dedup behaviour.
    pub fn set_buffer_offset(&mut self, key: BindingKey, offset: u64) {
        let dedup_key = CurrentBindingKey::Buffer(key);
        if let Some(binding) = self.current_bindings.get_mut(&dedup_key) {
            binding.offset = offset;
            if let Command::SetBuffer { offset: o, .. } = self.stream.get_mut(binding.command_index) {
                *o = offset;
            }
        }
    }

    pub fn set_texture(&mut self, key: BindingKey, texture: ResourceHandle) {
        let dedup_key = CurrentBindingKey::Texture(key.clone());
        if let Some(existing) = self.current_bindings.get(&dedup_key) {
            if existing.resource == texture {
                return;
            }
        }

        let index = self.next_index();
        self.stream.push(Command::SetTexture { binding: key.clone(), texture });
        self.current_bindings.insert(dedup_key, CurrentBinding { resource: texture, offset: 0, command_index: index });
        self.resolve_or_defer(key, texture, false);
    }

    pub fn set_sampler(&mut self, key: BindingKey, sampler: ResourceHandle) {
        let dedup_key = CurrentBindingKey::Sampler(key.clone());
        if let Some(existing) = self.current_bindings.get(&dedup_key) {
            if existing.resource == sampler {
                return;
            }
        }

        let index = self.next_index();
        self.stream.push(Command::SetSamplerState { binding: key.clone(), sampler });
        self.current_bindings.insert(dedup_key, CurrentBinding { resource: sampler, offset: 0, command_index: index });
        self.resolve_or_defer(key, sampler, false);
    }

    /// Sets a single argument buffer at `key`, deduplicated like `set_buffer`.
    /// See `set_argument_buffer_array` for the array form's isBound rule.
    pub fn set_argument_buffer(&mut self, key: BindingKey, buffer: ResourceHandle) {
        let dedup_key = CurrentBindingKey::ArgumentBuffer(key.clone());
        if let Some(existing) = self.current_bindings.get(&dedup_key) {
            if existing.resource == buffer {
                return;
            }
        }

        let index = self.next_index();
        self.stream.push(Command::SetArgumentBuffer { binding: key.clone(), buffer });
        self.current_bindings.insert(dedup_key, CurrentBinding { resource: buffer, offset: 0, command_index: index });
        self.resolve_or_defer(key, buffer, true);
    }

    /// Binds an array of argument buffers. Unlike a scalar bind, the `set`
    /// command itself is deferred: it only enters the stream the first time
    /// any member resolves against an active pipeline reflection, and never
    /// again after that (`isBound` flips once and stays flipped for this
    /// encoder), matching §4.D-5.
    pub fn set_argument_buffer_array(&mut self, key: BindingKey, buffers: SmallVec<[ResourceHandle; 8]>) {
        if self.bound_argument_buffer_arrays.contains(&key) {
            return;
        }
        if self.current_reflection.is_some() && self.try_resolve_argument_buffer_array(&key, &buffers) {
            return;
        }
        self.pending_argument_buffer_arrays.push((key, buffers));
    }

    fn try_resolve_argument_buffer_array(&mut self, key: &BindingKey, buffers: &SmallVec<[ResourceHandle; 8]>) -> bool {
        let Some(path) = self.resolve_active_path(key) else {
            return false;
        };
        let at = self.next_index();
        self.stream.push(Command::SetArgumentBufferArray { binding: key.clone(), buffers: buffers.clone() });
        let reflection = self.current_reflection.as_deref().expect("reflection checked by resolve_active_path");
        let info = reflection.argument_reflection(path);
        let (usage_type, stages) = info.map_or((UsageType::Read, ShaderStages::empty()), |i| (i.usage_type, i.stages));
        for &buffer in buffers.iter() {
            self.record_usage(buffer, usage_type, stages, at, true);
        }
        self.bound_argument_buffer_arrays.insert(key.clone());
        true
    }

    fn resolve_active_path(&self, key: &BindingKey) -> Option<ResourceBindingPath> {
        let reflection = self.current_reflection.as_deref()?;
        let name = match key {
            BindingKey::Named { name, .. } => name.as_ref(),
            BindingKey::InArgumentBuffer { name, .. } => name.as_ref(),
            BindingKey::Path(_) => return None,
        };
        let array_index = match key {
            BindingKey::Named { array_index, .. } => *array_index,
            _ => 0,
        };
        let path = reflection.binding_path(name, array_index)?;
        reflection.binding_is_active(path).then_some(path)
    }

    /// Sets bytes directly (the push-constant-like path): not a tracked
    /// resource, so no usage node is recorded for it.
    pub fn set_bytes(&mut self, key: BindingKey, data: Vec<u8>) {
        self.stream.push(Command::SetBytes { binding: key, data });
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: ResourceHandle, offset: u64) {
        if let Some(existing) = self.vertex_buffers.get(&slot) {
            if existing.resource == buffer && existing.offset == offset {
                return;
            }
        }
        let index = self.next_index();
        self.stream.push(Command::SetVertexBuffer { slot, buffer, offset });
        self.vertex_buffers.insert(slot, CurrentBinding { resource: buffer, offset, command_index: index });
        self.record_usage(buffer, UsageType::VertexBuffer, ShaderStages::VERTEX, index, false);
    }

    pub fn set_vertex_buffer_offset(&mut self, slot: u32, offset: u64) {
        if let Some(binding) = self.vertex_buffers.get_mut(&slot) {
            binding.offset = offset;
            if let Command::SetVertexBuffer { offset: o, .. } = self.stream.get_mut(binding.command_index) {
                *o = offset;
            }
        }
    }

    fn resolve_or_defer(&mut self, key: BindingKey, resource: ResourceHandle, in_argument_buffer: bool) {
        if self.current_reflection.is_some() && self.try_resolve(&key, resource, in_argument_buffer) {
            return;
        }
        self.pending.push(PendingBind { key, resource, in_argument_buffer });
    }

    fn try_resolve(&mut self, key: &BindingKey, resource: ResourceHandle, in_argument_buffer: bool) -> bool {
        let Some(path) = self.resolve_active_path(key) else {
            return false;
        };
        let reflection = self.current_reflection.as_deref().expect("reflection checked by resolve_active_path");
        let Some(info) = reflection.argument_reflection(path) else {
            return false;
        };
        let at = self.next_index();
        self.record_usage(resource, info.usage_type, info.stages, at, in_argument_buffer);
        true
    }

    /// Sets the active pipeline, retroactively reconciles every pending bind
    /// against its reflection, and then (§4.D-4's "second pass") re-resolves
    /// every already-tracked bind under the new reflection: a path active
    /// under the old pipeline may now be inactive (or vice versa), and the
    /// UAV set is rebuilt from scratch rather than merely added to.
    pub fn set_pipeline(&mut self, pipeline: PipelineId, is_compute: bool) {
        if is_compute {
            self.stream.push(Command::SetComputePipeline(pipeline));
        } else {
            self.stream.push(Command::SetRenderPipeline(pipeline));
        }
        self.has_pipeline = true;
        self.current_reflection = Some(self.reflection_provider.reflection_for(pipeline, is_compute));

        let pending = std::mem::take(&mut self.pending);
        for bind in pending {
            if !self.try_resolve(&bind.key, bind.resource, bind.in_argument_buffer) {
                self.pending.push(bind);
            }
        }

        let pending_arrays = std::mem::take(&mut self.pending_argument_buffer_arrays);
        for (key, buffers) in pending_arrays {
            if !self.try_resolve_argument_buffer_array(&key, &buffers) {
                self.pending_argument_buffer_arrays.push((key, buffers));
            }
        }

        self.reconcile_tracked_binds_under_new_pipeline();
    }

    fn reconcile_tracked_binds_under_new_pipeline(&mut self) {
        let tracked: Vec<(BindingKey, ResourceHandle, bool)> = self
            .current_bindings
            .iter()
            .map(|(dedup_key, binding)| (dedup_key.key().clone(), binding.resource, dedup_key.in_argument_buffer()))
            .collect();

        self.bound_uav_resources.clear();
        for (key, resource, in_argument_buffer) in tracked {
            self.try_resolve(&key, resource, in_argument_buffer);
        }
    }

    pub fn draw(&mut self, vertex_start: u32, vertex_count: u32, instance_count: u32, base_instance: u32) {
        debug_assert!(self.has_pipeline, "draw recorded without an active pipeline");
        self.stream.push(Command::DrawPrimitives { vertex_start, vertex_count, instance_count, base_instance });
    }

    pub fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32, base_instance: u32) {
        debug_assert!(self.has_pipeline, "draw recorded without an active pipeline");
        self.stream.push(Command::DrawIndexedPrimitives { index_count, instance_count, first_index, base_vertex, base_instance });
    }

    /// Dispatches compute work, refreshing the usage span of every bound UAV
    /// resource to cover this dispatch, so a backend can detect
    /// read-after-write hazards between overlapping compute dispatches.
    pub fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        debug_assert!(self.has_pipeline, "dispatch recorded without an active pipeline");
        let at = self.next_index();
        self.stream.push(Command::DispatchThreadgroups { groups_x, groups_y, groups_z });
        self.refresh_uav_usages(at);
    }

    pub fn dispatch_threads(&mut self, width: u32, height: u32, depth: u32) {
        debug_assert!(self.has_pipeline, "dispatch recorded without an active pipeline");
        let at = self.next_index();
        self.stream.push(Command::DispatchThreads { width, height, depth });
        self.refresh_uav_usages(at);
    }

    pub fn dispatch_threadgroups_indirect(&mut self, indirect_buffer: ResourceHandle, offset: u64) {
        debug_assert!(self.has_pipeline, "dispatch recorded without an active pipeline");
        let at = self.next_index();
        self.stream.push(Command::DispatchThreadgroupsIndirect { indirect_buffer, offset });
        self.record_usage(indirect_buffer, UsageType::IndirectBuffer, ShaderStages::COMPUTE, at, false);
        self.refresh_uav_usages(at);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.stream.push(Command::SetViewport(viewport));
    }

    pub fn set_scissor(&mut self, scissor: Scissor) {
        self.stream.push(Command::SetScissorRect(scissor));
    }

    pub fn push_debug_group(&mut self, label: impl Into<Box<str>>) {
        self.stream.push(Command::PushDebugGroup(label.into()));
    }

    pub fn pop_debug_group(&mut self) {
        self.stream.push(Command::PopDebugGroup);
    }

    pub fn insert_debug_signpost(&mut self, label: impl Into<Box<str>>) {
        self.stream.push(Command::InsertDebugSignpost(label.into()));
    }

    pub fn copy_buffer_to_buffer(&mut self, src: ResourceHandle, src_offset: u64, dst: ResourceHandle, dst_offset: u64, size: u64) {
        let at = self.next_index();
        self.stream.push(Command::CopyBufferToBuffer { src, src_offset, dst, dst_offset, size });
        self.record_usage(src, UsageType::BlitSource, ShaderStages::empty(), at, false);
        self.record_usage(dst, UsageType::BlitDestination, ShaderStages::empty(), at, false);
    }

    pub fn copy_buffer_to_texture(&mut self, src: ResourceHandle, src_offset: u64, dst: ResourceHandle, dst_subresource: TextureSubresource) {
        let at = self.next_index();
        self.stream.push(Command::CopyBufferToTexture { src, src_offset, dst, dst_subresource });
        self.record_usage(src, UsageType::BlitSource, ShaderStages::empty(), at, false);
        self.record_usage(dst, UsageType::BlitDestination, ShaderStages::empty(), at, false);
    }

    pub fn copy_texture_to_buffer(&mut self, src: ResourceHandle, src_subresource: TextureSubresource, dst: ResourceHandle, dst_offset: u64) {
        let at = self.next_index();
        self.stream.push(Command::CopyTextureToBuffer { src, src_subresource, dst, dst_offset });
        self.record_usage(src, UsageType::BlitSource, ShaderStages::empty(), at, false);
        self.record_usage(dst, UsageType::BlitDestination, ShaderStages::empty(), at, false);
    }

    pub fn copy_texture_to_texture(&mut self, src: ResourceHandle, src_subresource: TextureSubresource, dst: ResourceHandle, dst_subresource: TextureSubresource) {
        let at = self.next_index();
        self.stream.push(Command::CopyTextureToTexture { src, src_subresource, dst, dst_subresource });
        self.record_usage(src, UsageType::BlitSource, ShaderStages::empty(), at, false);
        self.record_usage(dst, UsageType::BlitDestination, ShaderStages::empty(), at, false);
    }

    pub fn fill_buffer(&mut self, buffer: ResourceHandle, offset: u64, size: u64, value: u8) {
        let at = self.next_index();
        self.stream.push(Command::FillBuffer { buffer, offset, size, value });
        self.record_usage(buffer, UsageType::BlitDestination, ShaderStages::empty(), at, false);
    }

    pub fn generate_mipmaps(&mut self, texture: ResourceHandle) {
        let at = self.next_index();
        self.stream.push(Command::GenerateMipmaps { texture });
        self.record_usage(texture, UsageType::MipGeneration, ShaderStages::empty(), at, false);
    }

    pub fn synchronise_buffer(&mut self, buffer: ResourceHandle) {
        let at = self.next_index();
        self.stream.push(Command::SynchroniseBuffer { buffer });
        self.record_usage(buffer, UsageType::BlitSynchronisation, ShaderStages::empty(), at, false);
    }

    pub fn synchronise_texture(&mut self, texture: ResourceHandle) {
        let at = self.next_index();
        self.stream.push(Command::SynchroniseTexture { texture });
        self.record_usage(texture, UsageType::BlitSynchronisation, ShaderStages::empty(), at, false);
    }

    pub fn synchronise_texture_slice(&mut self, texture: ResourceHandle, subresource: TextureSubresource) {
        let at = self.next_index();
        self.stream.push(Command::SynchroniseTextureSlice { texture, subresource });
        self.record_usage(texture, UsageType::BlitSynchronisation, ShaderStages::empty(), at, false);
    }

    pub fn encode_external_command(&mut self, id: u32) {
        self.stream.push(Command::EncodeExternalCommand(id));
    }

    pub fn clear_render_targets(&mut self) {
        self.stream.push(Command::ClearRenderTargets);
    }

    /// Declares a color attachment at `index`, starting its usage as unused
    /// until a pipeline's write mask/blend state upgrades it.
    pub fn set_color_attachment(&mut self, index: u8, texture: ResourceHandle, resolve_texture: Option<ResourceHandle>) {
        self.attachments.insert(AttachmentSlot::Color(index), AttachmentBinding { texture, resolve_texture });
        let at = self.next_index();
        self.record_usage(texture, UsageType::UnusedRenderTarget, ShaderStages::FRAGMENT, at, false);
    }

    pub fn set_depth_attachment(&mut self, texture: ResourceHandle, resolve_texture: Option<ResourceHandle>) {
        self.attachments.insert(AttachmentSlot::Depth, AttachmentBinding { texture, resolve_texture });
        let at = self.next_index();
        self.record_usage(texture, UsageType::UnusedRenderTarget, ShaderStages::FRAGMENT, at, false);
    }

    pub fn set_stencil_attachment(&mut self, texture: ResourceHandle) {
        self.attachments.insert(AttachmentSlot::Stencil, AttachmentBinding { texture, resolve_texture: None });
        let at = self.next_index();
        self.record_usage(texture, UsageType::UnusedRenderTarget, ShaderStages::FRAGMENT, at, false);
    }

    fn upgrade_attachment(&mut self, slot: AttachmentSlot, write_enabled: bool, read_enabled: bool) {
        let Some(texture) = self.attachments.get(&slot).map(|b| b.texture) else {
            return;
        };
        let ty = match (write_enabled, read_enabled) {
            (false, false) => UsageType::UnusedRenderTarget,
            (true, false) => UsageType::WriteOnlyRenderTarget,
            (_, true) => UsageType::ReadWriteRenderTarget,
        };
        let at = self.next_index();
        self.record_usage(texture, ty, ShaderStages::FRAGMENT, at, false);
    }

    /// Called alongside `set_pipeline` with the active render pipeline's
    /// per-color-attachment write mask and blend-enabled state, upgrading
    /// each attachment's usage per §4.D-7 (unused → writeOnly → readWrite).
    pub fn upgrade_color_attachments(&mut self, write_enabled: &[bool], blend_enabled: &[bool]) {
        for (index, (&write, &blend)) in write_enabled.iter().zip(blend_enabled.iter()).enumerate() {
            self.upgrade_attachment(AttachmentSlot::Color(index as u8), write, blend);
        }
    }

    /// Called alongside `set_depth_stencil_descriptor`, using the compare
    /// functions and stencil ops to upgrade the depth/stencil attachments.
    pub fn upgrade_depth_stencil_attachment(
        &mut self,
        depth_write_enabled: bool,
        depth_test_enabled: bool,
        stencil_write_enabled: bool,
        stencil_test_enabled: bool,
    ) {
        self.upgrade_attachment(AttachmentSlot::Depth, depth_write_enabled, depth_test_enabled);
        self.upgrade_attachment(AttachmentSlot::Stencil, stencil_write_enabled, stencil_test_enabled);
    }

    /// Directly records a usage for a render-target attachment. Called by the
    /// render-pass begin/pipeline-set/depth-stencil-set logic with the type
    /// appropriate to the current attachment configuration (unused /
    /// write-only / read-write); `UsageList::append`'s rule 2 handles
    /// promoting a render-target usage to `InputAttachmentRenderTarget` when
    /// a later bind reads the same resource within the same command range.
    pub fn record_attachment_usage(&mut self, resource: ResourceHandle, ty: UsageType) {
        let at = self.next_index();
        self.record_usage(resource, ty, ShaderStages::FRAGMENT, at, false);
    }

    /// Records a fragment-stage read of `resource` (e.g. binding a prior
    /// attachment as an input attachment), which `UsageList::append` may fold
    /// into an adjacent render-target usage per rule 2.
    pub fn record_input_attachment_read(&mut self, resource: ResourceHandle) {
        let at = self.next_index();
        self.record_usage(resource, UsageType::InputAttachment, ShaderStages::FRAGMENT, at, false);
    }

    /// Closes the encoder: appends synthetic resolve usage nodes for any
    /// attachment with a resolve texture, then clamps every still-open usage
    /// to end just past the last recorded command, matching the source's
    /// end-of-encoding pass.
    pub fn finish(mut self) -> (CommandStream, HashMap<ResourceHandle, UsageList>) {
        let resolves: Vec<(ResourceHandle, ResourceHandle)> = self
            .attachments
            .values()
            .filter_map(|binding| binding.resolve_texture.map(|resolve| (binding.texture, resolve)))
            .collect();
        for (source, resolve) in resolves {
            let at = self.next_index();
            self.record_usage(source, UsageType::BlitSource, ShaderStages::FRAGMENT, at, false);
            self.record_usage(resolve, UsageType::BlitDestination, ShaderStages::FRAGMENT, at, false);
        }

        let mut usages = self.usages;
        let last = self.stream.len();
        for list in usages.values_mut() {
            for usage in list.iter_mut() {
                if usage.command_range.hi < last {
                    usage.command_range.hi = last;
                }
            }
        }
        (self.stream, usages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleFlags;
    use crate::handle::ResourceType;

    struct FixedShape;
    impl ResourceShapeLookup for FixedShape {
        fn shape(&self, _handle: ResourceHandle) -> (u32, u64) {
            (0, 1024)
        }
    }

    struct FakeReflection {
        active: bool,
        usage_type: UsageType,
    }
    impl PipelineReflection for FakeReflection {
        fn binding_path(&self, _name: &str, _array_index: u32) -> Option<ResourceBindingPath> {
            Some(ResourceBindingPath(1))
        }
        fn argument_reflection(&self, _path: ResourceBindingPath) -> Option<ArgumentReflection> {
            Some(ArgumentReflection { binding_path: ResourceBindingPath(1), usage_type: self.usage_type, stages: ShaderStages::FRAGMENT })
        }
        fn binding_is_active(&self, _path: ResourceBindingPath) -> bool {
            self.active
        }
    }

    struct FixedReflectionProvider {
        active: bool,
        usage_type: UsageType,
    }
    impl ReflectionProvider for FixedReflectionProvider {
        fn reflection_for(&self, _pipeline: PipelineId, _is_compute: bool) -> Box<dyn PipelineReflection> {
            Box::new(FakeReflection { active: self.active, usage_type: self.usage_type })
        }
    }

    fn handle(index: u32) -> ResourceHandle {
        ResourceHandle::new(index, 0, ResourceType::Buffer, HandleFlags::empty())
    }

    #[test]
    fn s4_dedup_of_redundant_set_buffer() {
        let shapes = FixedShape;
        let reflection_provider = FixedReflectionProvider { active: true, usage_type: UsageType::Read };
        let mut encoder = CommandEncoder::new(PassId(0), &shapes, &reflection_provider);
        encoder.set_pipeline(PipelineId(1), false);
        let key = BindingKey::named("buf", 0);
        let buf = handle(0);

        encoder.set_buffer(key.clone(), buf, 0);
        encoder.draw(0, 3, 1, 0);
        encoder.set_buffer(key.clone(), buf, 0);
        encoder.draw(0, 3, 1, 0);

        let (stream, _) = encoder.finish();
        let set_buffer_count = stream.iter().filter(|c| matches!(c, Command::SetBuffer { .. })).count();
        let draw_count = stream.iter().filter(|c| matches!(c, Command::DrawPrimitives { .. })).count();
        assert_eq!(set_buffer_count, 1);
        assert_eq!(draw_count, 2);
    }

    #[test]
    fn s5_pipeline_change_retroactive_bind() {
        let shapes = FixedShape;
        let reflection_provider = FixedReflectionProvider { active: true, usage_type: UsageType::Read };
        let mut encoder = CommandEncoder::new(PassId(0), &shapes, &reflection_provider);
        let key = BindingKey::named("buf", 0);
        let buf = handle(0);

        encoder.set_buffer(key, buf, 0);
        assert_eq!(encoder.pending.len(), 1);

        encoder.set_pipeline(PipelineId(1), false);
        assert!(encoder.pending.is_empty(), "bind should resolve once the pipeline reflection is active");

        encoder.draw(0, 3, 1, 0);
        let (stream, usages) = encoder.finish();
        let set_buffer_pos = stream.iter().position(|c| matches!(c, Command::SetBuffer { .. })).unwrap();
        let draw_pos = stream.iter().position(|c| matches!(c, Command::DrawPrimitives { .. })).unwrap();
        assert!(set_buffer_pos < draw_pos);
        assert!(usages.contains_key(&buf));
    }

    #[test]
    fn pipeline_change_demotes_bind_no_longer_active_and_rebuilds_uav_set() {
        let shapes = FixedShape;
        let active_readwrite = FixedReflectionProvider { active: true, usage_type: UsageType::ReadWrite };
        let inactive = FixedReflectionProvider { active: false, usage_type: UsageType::ReadWrite };
        let mut encoder = CommandEncoder::new(PassId(0), &shapes, &active_readwrite);
        let key = BindingKey::named("uav", 0);
        let buf = handle(0);

        encoder.set_pipeline(PipelineId(1), true);
        encoder.set_buffer(key.clone(), buf, 0);
        assert!(encoder.bound_uav_resources.contains(&buf));

        encoder.reflection_provider = &inactive;
        encoder.set_pipeline(PipelineId(2), true);
        assert!(!encoder.bound_uav_resources.contains(&buf), "no-longer-active bind should drop out of the UAV set");
    }

    #[test]
    fn argument_buffer_array_set_command_is_emitted_once() {
        let shapes = FixedShape;
        let reflection_provider = FixedReflectionProvider { active: true, usage_type: UsageType::Read };
        let mut encoder = CommandEncoder::new(PassId(0), &shapes, &reflection_provider);
        let key = BindingKey::named("textures", 0);
        let buffers: SmallVec<[ResourceHandle; 8]> = SmallVec::from_slice(&[handle(0), handle(1)]);

        encoder.set_pipeline(PipelineId(1), false);
        encoder.set_argument_buffer_array(key.clone(), buffers.clone());
        encoder.set_argument_buffer_array(key, buffers);

        let (stream, usages) = encoder.finish();
        let set_count = stream.iter().filter(|c| matches!(c, Command::SetArgumentBufferArray { .. })).count();
        assert_eq!(set_count, 1, "isBound should flip once and stay flipped");
        assert!(usages.contains_key(&handle(0)));
        assert!(usages.contains_key(&handle(1)));
    }

    #[test]
    fn s3_resolve_attachment_emits_synthetic_blit_nodes() {
        let shapes = FixedShape;
        let reflection_provider = FixedReflectionProvider { active: true, usage_type: UsageType::Read };
        let mut encoder = CommandEncoder::new(PassId(0), &shapes, &reflection_provider);
        let msaa = handle(0);
        let resolve = handle(1);
        encoder.set_color_attachment(0, msaa, Some(resolve));

        let (_, usages) = encoder.finish();
        let msaa_usages = &usages[&msaa];
        let resolve_usages = &usages[&resolve];
        assert!(msaa_usages.iter().any(|u| u.ty == UsageType::BlitSource));
        assert!(resolve_usages.iter().any(|u| u.ty == UsageType::BlitDestination));
    }
}
