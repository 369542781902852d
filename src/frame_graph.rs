//! The top-level frame lifecycle: `begin_frame` → `add_pass` (any number of
//! times) → `record_passes` → `compile` → `end_frame`, composing the
//! registries, queues, frame-completion ratchet, and job manager declared
//! elsewhere in this crate into the single entry point a host application
//! drives once per frame.
//!
//! Grounded on `engine/src/graphics/context.rs`'s `GraphicsContext`
//! (`begin_frame`/`end_frame`, the per-frame transient-arena reset, the
//! disposal-queue drain gated on completed-frame tracking).

use std::collections::HashMap;

use bumpalo::Bump;
use parking_lot::Mutex;

use crate::backend::RenderBackend;
use crate::command::{CommandEncoder, CommandStream, ResourceShapeLookup};
use crate::descriptor::{BufferDescriptor, HeapDescriptor, TextureDescriptor};
use crate::handle::{ResourceHandle, ResourceType};
use crate::job::{JobManager, SingleThreadedJobManager};
use crate::pass::{FramePassResourceCreator, PassId, PassRecord, PassType, RenderPass};
use crate::queue::{AtomicFrameCompletion, QueueTable};
use crate::registry::{PersistentRegistry, TransientRegistry};
use crate::usage::UsageList;

/// A fully compiled frame: one flattened command stream plus the merged,
/// globally-offset usage history of every resource touched during it. What a
/// backend walks to emit barriers and submit work.
pub struct CompiledFrame {
    pub stream: CommandStream,
    pub usages: HashMap<ResourceHandle, UsageList>,
}

/// Owns every registry, queue, and pass declared for the frame currently
/// being built, plus the backend used to resolve pipeline reflection.
pub struct FrameGraph<B: RenderBackend + Send + Sync> {
    backend: B,
    persistent_buffers: PersistentRegistry<BufferDescriptor>,
    persistent_textures: PersistentRegistry<TextureDescriptor>,
    persistent_heaps: PersistentRegistry<HeapDescriptor>,
    transient_buffers: TransientRegistry<BufferDescriptor>,
    transient_textures: TransientRegistry<TextureDescriptor>,
    history_buffers: HashMap<String, [ResourceHandle; 2]>,
    history_textures: HashMap<String, [ResourceHandle; 2]>,
    queues: QueueTable,
    completion: AtomicFrameCompletion,
    jobs: Box<dyn JobManager>,
    frame_counter: u64,
    frame_generation: u8,
    frame_parity: usize,
    passes: Vec<PassRecord>,
    pass_impls: Vec<Box<dyn RenderPass + Send + Sync>>,
    pass_streams: Vec<(CommandStream, HashMap<ResourceHandle, UsageList>)>,
    compiled: Option<CompiledFrame>,
}

impl<B: RenderBackend + Send + Sync> FrameGraph<B> {
    pub fn new(backend: B) -> Self {
        Self::with_job_manager(backend, Box::new(SingleThreadedJobManager))
    }

    pub fn with_job_manager(backend: B, jobs: Box<dyn JobManager>) -> Self {
        FrameGraph {
            backend,
            persistent_buffers: PersistentRegistry::new(ResourceType::Buffer),
            persistent_textures: PersistentRegistry::new(ResourceType::Texture),
            persistent_heaps: PersistentRegistry::new(ResourceType::Heap),
            transient_buffers: TransientRegistry::new(ResourceType::Buffer),
            transient_textures: TransientRegistry::new(ResourceType::Texture),
            history_buffers: HashMap::new(),
            history_textures: HashMap::new(),
            queues: QueueTable::new(),
            completion: AtomicFrameCompletion::new(),
            jobs,
            frame_counter: 0,
            frame_generation: 0,
            frame_parity: 0,
            passes: Vec::new(),
            pass_impls: Vec::new(),
            pass_streams: Vec::new(),
            compiled: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn queues(&self) -> &QueueTable {
        &self.queues
    }

    pub fn current_frame(&self) -> u64 {
        self.frame_counter
    }

    pub fn mark_frame_complete(&self, frame: u64) {
        self.completion.mark_frame_complete(frame);
    }

    pub fn last_completed_frame(&self) -> u64 {
        self.completion.last_completed_frame()
    }

    /// Starts a new frame: advances the frame counter and generation, and
    /// clears the previous frame's pass bookkeeping. Assumes the previous
    /// frame's `end_frame` already ran (or this is the first frame).
    pub fn begin_frame(&mut self) {
        self.frame_counter += 1;
        self.frame_generation = self.frame_generation.wrapping_add(1);
        self.frame_parity = (self.frame_counter % 2) as usize;

        self.passes.clear();
        self.pass_impls.clear();
        self.pass_streams.clear();
        self.compiled = None;
    }

    /// Closes out a compiled frame: resets the transient registries' bump
    /// cursors and drains any persistent disposal due now that the frame
    /// `max_inflight_frames` ago has completed. Call once `compile()` has run
    /// and the compiled stream has been handed to the backend for submission.
    pub fn end_frame(&mut self) {
        self.transient_buffers.clear();
        self.transient_textures.clear();

        let completed = self.completion.last_completed_frame();
        self.persistent_buffers.clear(completed);
        self.persistent_textures.clear(completed);
        self.persistent_heaps.clear(completed);
    }

    /// Declares one pass: runs its resource-creation callback against a
    /// scratch arena (dropped at the end of this call — nothing a pass
    /// returns from `create_resources` needs to outlive it, since resources
    /// are materialised into a registry immediately and handed back as plain
    /// `ResourceHandle`s) and its resource-access declaration, then retains
    /// the pass itself for `record_passes`.
    pub fn add_pass<P>(&mut self, name: impl Into<String>, pass_type: PassType, pass: P) -> PassId
    where
        P: RenderPass + Send + Sync + 'static,
    {
        let id = PassId(self.passes.len() as u32);
        let arena = Bump::new();
        {
            let mut creator = FramePassResourceCreator::new(
                &arena,
                &self.transient_buffers,
                &self.transient_textures,
                &self.persistent_buffers,
                &self.persistent_textures,
                &mut self.history_buffers,
                &mut self.history_textures,
                self.frame_generation,
                self.frame_parity,
            );
            pass.create_resources(&mut creator);
        }

        let mut record = PassRecord::new(id, name, pass_type);
        pass.register_resource_accesses(&mut record);
        self.passes.push(record);
        self.pass_impls.push(Box::new(pass));
        id
    }

    /// Runs every declared pass's `execute` through the job manager (in
    /// parallel when a multi-threaded manager is configured) and collects
    /// each pass's command stream and usage map. Passes only ever read
    /// shared frame-graph state (registries, reflection) during this phase;
    /// each pass writes to its own slot, so no cross-pass synchronisation
    /// beyond that is required.
    pub fn record_passes(&mut self) {
        let count = self.pass_impls.len();
        let results: Vec<Mutex<Option<(CommandStream, HashMap<ResourceHandle, UsageList>)>>> = (0..count).map(|_| Mutex::new(None)).collect();

        {
            let this: &Self = self;
            this.jobs.dispatch_pass_jobs(count, &|i| {
                let pass_id = this.passes[i].id;
                let mut encoder = CommandEncoder::new(pass_id, this, &this.backend);
                this.pass_impls[i].execute(&mut encoder);
                let (stream, usages) = encoder.finish();
                *results[i].lock() = Some((stream, usages));
            });
        }

        self.pass_streams = results
            .into_iter()
            .map(|slot| slot.into_inner().expect("a pass job did not run"))
            .collect();
    }

    /// Flattens every pass's command stream into one global stream (in
    /// declaration order) and merges per-resource usage histories, remapped
    /// from per-pass-local command indices to global ones. `UsageList::append`
    /// drives the merge, so cross-pass promotion/lattice rules apply exactly
    /// as they do within a single pass's own recording.
    pub fn compile(&mut self) {
        let mut stream = CommandStream::new();
        let mut usages: HashMap<ResourceHandle, UsageList> = HashMap::new();

        for (i, (pass_stream, pass_usages)) in std::mem::take(&mut self.pass_streams).into_iter().enumerate() {
            let base = stream.append(pass_stream);
            for (handle, mut list) in pass_usages {
                list.remap_to_global(base);
                let (subresource_count, buffer_len) = self.shape(handle);
                let target = usages.entry(handle).or_default();
                for usage in list.iter() {
                    target.append(usage.clone(), subresource_count, buffer_len);
                }
            }
            self.passes[i].command_range.lo = base;
            self.passes[i].command_range.hi = stream.len();
        }

        self.compiled = Some(CompiledFrame { stream, usages });
    }

    pub fn compiled_frame(&self) -> Option<&CompiledFrame> {
        self.compiled.as_ref()
    }

    pub fn passes(&self) -> &[PassRecord] {
        &self.passes
    }

    pub fn persistent_buffers(&self) -> &PersistentRegistry<BufferDescriptor> {
        &self.persistent_buffers
    }

    pub fn persistent_textures(&self) -> &PersistentRegistry<TextureDescriptor> {
        &self.persistent_textures
    }

    pub fn persistent_heaps(&self) -> &PersistentRegistry<HeapDescriptor> {
        &self.persistent_heaps
    }

    pub fn transient_buffers(&self) -> &TransientRegistry<BufferDescriptor> {
        &self.transient_buffers
    }

    pub fn transient_textures(&self) -> &TransientRegistry<TextureDescriptor> {
        &self.transient_textures
    }
}

impl<B: RenderBackend + Send + Sync> ResourceShapeLookup for FrameGraph<B> {
    fn shape(&self, handle: ResourceHandle) -> (u32, u64) {
        match handle.resource_type() {
            ResourceType::Buffer => {
                if handle.is_persistent() {
                    self.persistent_buffers.try_with(handle, |d| (0, d.length)).unwrap_or((0, 0))
                } else {
                    self.transient_buffers.with(handle, self.frame_generation, |d| (0, d.length)).unwrap_or((0, 0))
                }
            }
            ResourceType::Texture => {
                if handle.is_persistent() {
                    self.persistent_textures
                        .try_with(handle, |d| (d.subresource_count(), 0))
                        .unwrap_or((0, 0))
                } else {
                    self.transient_textures
                        .with(handle, self.frame_generation, |d| (d.subresource_count(), 0))
                        .unwrap_or((0, 0))
                }
            }
            _ => (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ArgumentReflection, PipelineId, PipelineReflection};
    use crate::descriptor::{BufferUsage, CacheMode, StorageMode};
    use crate::error::OutOfMemoryError;
    use crate::usage::{ShaderStages, UsageType};

    struct NullReflection;
    impl PipelineReflection for NullReflection {
        fn binding_path(&self, _name: &str, _array_index: u32) -> Option<ResourceBindingPath> {
            None
        }
        fn argument_reflection(&self, _path: ResourceBindingPath) -> Option<ArgumentReflection> {
            None
        }
        fn binding_is_active(&self, _path: ResourceBindingPath) -> bool {
            false
        }
    }

    use crate::handle::ResourceBindingPath;

    struct NullBackend;
    impl RenderBackend for NullBackend {
        type BackingResource = ();
        type Reflection = NullReflection;

        fn materialise_persistent_texture(&self, _descriptor: &TextureDescriptor) -> Result<(), OutOfMemoryError> {
            Ok(())
        }
        fn materialise_persistent_buffer(&self, _descriptor: &BufferDescriptor) -> Result<(), OutOfMemoryError> {
            Ok(())
        }
        fn materialise_transient_texture(&self, _descriptor: &TextureDescriptor) -> Result<(), OutOfMemoryError> {
            Ok(())
        }
        fn materialise_transient_buffer(&self, _descriptor: &BufferDescriptor) -> Result<(), OutOfMemoryError> {
            Ok(())
        }
        fn materialise_heap(&self, _descriptor: &HeapDescriptor) -> Result<(), OutOfMemoryError> {
            Ok(())
        }
        fn materialise_sampler(&self, _descriptor: &crate::descriptor::SamplerDescriptor) -> Result<(), OutOfMemoryError> {
            Ok(())
        }
        fn register_external_resource(&self, _resource: ()) -> ResourceHandle {
            ResourceHandle::new(0, 0, ResourceType::Buffer, crate::handle::HandleFlags::EXTERNAL)
        }
        fn register_window_texture(&self, _resource: ()) -> ResourceHandle {
            ResourceHandle::new(0, 0, ResourceType::Texture, crate::handle::HandleFlags::WINDOW_HANDLE)
        }
        unsafe fn buffer_contents(&self, _handle: ResourceHandle, _offset: u64, _len: u64) -> Option<*mut u8> {
            None
        }
        fn buffer_did_modify_range(&self, _handle: ResourceHandle, _offset: u64, _len: u64) {}
        fn render_pipeline_reflection(&self, _pipeline: PipelineId) -> NullReflection {
            NullReflection
        }
        fn compute_pipeline_reflection(&self, _pipeline: PipelineId) -> NullReflection {
            NullReflection
        }
        fn dispose_buffer(&self, _handle: ResourceHandle) {}
        fn dispose_texture(&self, _handle: ResourceHandle) {}
        fn dispose_argument_buffer(&self, _handle: ResourceHandle) {}
        fn dispose_argument_buffer_array(&self, _handle: ResourceHandle) {}
        fn dispose_heap(&self, _handle: ResourceHandle) {}
        fn backing_resource(&self, _handle: ResourceHandle) -> Option<&()> {
            None
        }
        fn is_depth24_stencil8_supported(&self) -> bool {
            true
        }
        fn thread_execution_width(&self) -> u32 {
            32
        }
        fn max_inflight_frames(&self) -> u32 {
            2
        }
        fn argument_buffer_path(&self, _index: u32, _stages: ShaderStages) -> crate::handle::ArgumentBufferPath {
            crate::handle::ArgumentBufferPath(0)
        }
        fn push_constant_path(&self) -> ResourceBindingPath {
            ResourceBindingPath(0)
        }
    }

    struct UploadThenCopyPass;
    impl RenderPass for UploadThenCopyPass {
        fn execute(&self, encoder: &mut CommandEncoder<'_>) {
            let src = ResourceHandle::new(1, 0, ResourceType::Buffer, crate::handle::HandleFlags::empty());
            let dst = ResourceHandle::new(2, 0, ResourceType::Buffer, crate::handle::HandleFlags::empty());
            encoder.record_attachment_usage(src, UsageType::Read);
            encoder.record_attachment_usage(dst, UsageType::Write);
        }
    }

    #[test]
    fn end_frame_resets_transient_state_and_begin_frame_advances_counters() {
        let mut graph = FrameGraph::new(NullBackend);
        graph.begin_frame();
        assert_eq!(graph.current_frame(), 1);
        let h = graph
            .transient_buffers()
            .allocate(
                BufferDescriptor { length: 16, storage_mode: StorageMode::Shared, cache_mode: CacheMode::DefaultCache, usage: BufferUsage::STORAGE },
                1,
            )
            .unwrap();
        assert!(h.index() == 0);
        graph.end_frame();
        graph.begin_frame();
        assert_eq!(graph.current_frame(), 2);
        let h2 = graph
            .transient_buffers()
            .allocate(
                BufferDescriptor { length: 16, storage_mode: StorageMode::Shared, cache_mode: CacheMode::DefaultCache, usage: BufferUsage::STORAGE },
                2,
            )
            .unwrap();
        assert_eq!(h2.index(), 0, "end_frame should have reset the bump cursor");
    }

    #[test]
    fn add_pass_and_compile_produce_one_flattened_stream() {
        let mut graph = FrameGraph::new(NullBackend);
        graph.begin_frame();
        graph.add_pass("upload", PassType::Copy, UploadThenCopyPass);
        graph.add_pass("upload2", PassType::Copy, UploadThenCopyPass);
        graph.record_passes();
        graph.compile();

        let compiled = graph.compiled_frame().expect("frame should be compiled");
        assert_eq!(compiled.stream.len(), 4);
        assert_eq!(graph.passes().len(), 2);
        assert_eq!(graph.passes()[1].command_range.lo, 2);
        assert_eq!(graph.passes()[1].command_range.hi, 4);
    }
}
