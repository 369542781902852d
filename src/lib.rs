//! A backend-agnostic, per-frame GPU render-graph core: sub-resource usage
//! tracking, persistent/transient resource registries, a command-encoder
//! binding state machine, and queue/frame-completion coordination, all driven
//! through a single [`frame_graph::FrameGraph`] per frame.
//!
//! Concrete GPU backends (Metal/Vulkan/D3D12) plug in through
//! [`backend::RenderBackend`]; this crate never talks to a driver directly.

pub mod backend;
pub mod command;
pub mod descriptor;
pub mod error;
pub mod frame_graph;
pub mod handle;
pub mod job;
pub mod limits;
pub mod pass;
pub mod queue;
pub mod registry;
pub mod subresource;
pub mod usage;

pub use backend::RenderBackend;
pub use command::{
    ArgumentReflection, AttachmentSlot, BindingKey, Command, CommandEncoder, CommandIndex, CommandStream, PipelineId, PipelineReflection,
    ReflectionProvider, ResourceShapeLookup, Scissor, Viewport,
};
pub use descriptor::{
    AddressMode, BufferDescriptor, BufferUsage, CacheMode, Filter, HeapDescriptor, SamplerDescriptor, StorageMode, TextureDescriptor,
    TextureSubresource, TextureType, TextureUsage,
};
pub use error::{IncompatibleRangeError, OutOfMemoryError, StaleHandleError, TransientExhaustedError};
pub use frame_graph::{CompiledFrame, FrameGraph};
pub use handle::{ArgumentBufferPath, HandleFlags, ResourceBindingPath, ResourceHandle, ResourceType};
pub use job::{JobManager, SingleThreadedJobManager};
#[cfg(feature = "parallel")]
pub use job::RayonJobManager;
pub use pass::{FramePassResourceCreator, HistoryResourceEntry, PassId, PassRecord, PassType, RenderPass, ResourceDescription};
pub use queue::{AtomicFrameCompletion, Queue, QueueTable};
pub use registry::{PersistentRegistry, QueueCommandIndices, TransientRegistry};
pub use subresource::{ActiveResourceRange, ByteRange, SubresourceMask};
pub use usage::{CommandRange, ShaderStages, Usage, UsageList, UsageType};
