pub use ash::vk;

pub use crate::core::context::Context;
pub use crate::core::error::{CompileError, Error};

pub use crate::allocator::traits::*;
pub use crate::command_buffer::traits::*;
pub use crate::command_buffer::render_pass::{RenderPassBegin, RenderPassDesc, RenderPassInfo};
pub use crate::command_buffer::CommandBuffer;

pub use crate::graph::access::{Access, ResourceUse};
pub use crate::graph::attachment::{Buffer, Clear, ImageAttachment, Subrange, Swapchain, SwapchainRef};
pub use crate::graph::compiler::{CompileOptions, Compiler};
pub use crate::graph::executable::ExecutableRenderGraph;
pub use crate::graph::inference;
pub use crate::graph::name::{Name, QualifiedName};
pub use crate::graph::pass::{EmptyPassExecutor, Pass, PassBuilder, PassExecutor};
pub use crate::graph::render_graph::RenderGraph;
pub use crate::graph::resource::Resource;

pub use crate::sync::barrier::Dependency;
pub use crate::sync::domain::Domain;
pub use crate::sync::future::{Future, FutureStatus, FutureValue};
pub use crate::sync::submit_batch::{submit_bundle, DeviceQueues, QueueSubmit, SubmitBundle};
