//! Command recording: the arena-backed command stream and the binding state
//! machine that appends to it (component D).

pub mod encoder;
pub mod stream;

pub use encoder::{ArgumentReflection, AttachmentSlot, CommandEncoder, PipelineReflection, ReflectionProvider, ResourceShapeLookup};
pub use stream::{BindingKey, Command, CommandIndex, CommandStream, PipelineId, Scissor, Viewport};
