//! The backend boundary: the one seam where Metal/Vulkan/D3D12 specifics are
//! excluded from this crate and consumed only as a trait.
//!
//! Grounded on `core/src/gpu/backend.rs` (`GPUBackend`, associated-type style
//! rather than a boxed trait object) and `core/src/gpu/device.rs` (`Device`'s
//! large capability-flag/creation-method surface).

use crate::command::{PipelineId, PipelineReflection, ReflectionProvider};
use crate::descriptor::{BufferDescriptor, HeapDescriptor, SamplerDescriptor, TextureDescriptor};
use crate::error::OutOfMemoryError;
use crate::handle::{ArgumentBufferPath, ResourceBindingPath, ResourceHandle};

/// What the frame graph core needs from a concrete GPU backend. Materialising
/// a resource, resolving reflection, and disposal are all backend calls; the
/// core never talks to the driver directly.
pub trait RenderBackend {
    type BackingResource;
    type Reflection: PipelineReflection + 'static;

    fn materialise_persistent_texture(&self, descriptor: &TextureDescriptor) -> Result<Self::BackingResource, OutOfMemoryError>;
    fn materialise_persistent_buffer(&self, descriptor: &BufferDescriptor) -> Result<Self::BackingResource, OutOfMemoryError>;
    fn materialise_transient_texture(&self, descriptor: &TextureDescriptor) -> Result<Self::BackingResource, OutOfMemoryError>;
    fn materialise_transient_buffer(&self, descriptor: &BufferDescriptor) -> Result<Self::BackingResource, OutOfMemoryError>;
    fn materialise_heap(&self, descriptor: &HeapDescriptor) -> Result<Self::BackingResource, OutOfMemoryError>;
    fn materialise_sampler(&self, descriptor: &SamplerDescriptor) -> Result<Self::BackingResource, OutOfMemoryError>;

    fn register_external_resource(&self, resource: Self::BackingResource) -> ResourceHandle;
    fn register_window_texture(&self, resource: Self::BackingResource) -> ResourceHandle;

    /// Raw host pointer into a mapped buffer's contents, `[offset, offset+len)`.
    /// # Safety
    /// The caller must not read/write outside a CPU-visible range already
    /// synchronised by the matching queue's wait indices.
    unsafe fn buffer_contents(&self, handle: ResourceHandle, offset: u64, len: u64) -> Option<*mut u8>;
    fn buffer_did_modify_range(&self, handle: ResourceHandle, offset: u64, len: u64);

    fn render_pipeline_reflection(&self, pipeline: PipelineId) -> Self::Reflection;
    fn compute_pipeline_reflection(&self, pipeline: PipelineId) -> Self::Reflection;

    fn dispose_buffer(&self, handle: ResourceHandle);
    fn dispose_texture(&self, handle: ResourceHandle);
    fn dispose_argument_buffer(&self, handle: ResourceHandle);
    fn dispose_argument_buffer_array(&self, handle: ResourceHandle);
    fn dispose_heap(&self, handle: ResourceHandle);

    fn backing_resource(&self, handle: ResourceHandle) -> Option<&Self::BackingResource>;

    fn is_depth24_stencil8_supported(&self) -> bool;
    fn thread_execution_width(&self) -> u32;
    fn max_inflight_frames(&self) -> u32;

    fn argument_buffer_path(&self, index: u32, stages: crate::usage::ShaderStages) -> ArgumentBufferPath;
    fn push_constant_path(&self) -> ResourceBindingPath;
}

/// Every `RenderBackend` is automatically a `ReflectionProvider`: the encoder
/// only ever needs reflection, never the rest of the backend surface, so this
/// is the one place a backend's associated `Reflection` type gets boxed into
/// a trait object for it.
impl<B: RenderBackend> ReflectionProvider for B {
    fn reflection_for(&self, pipeline: PipelineId, is_compute: bool) -> Box<dyn PipelineReflection> {
        if is_compute {
            Box::new(self.compute_pipeline_reflection(pipeline))
        } else {
            Box::new(self.render_pipeline_reflection(pipeline))
        }
    }
}
