//! The allocator module defines the [`Allocator`](traits::Allocator) trait, the single source of images, buffers,
//! command buffers and render passes for a render graph execution.
//!
//! Deimos never talks to a Vulkan device directly. Anything that needs a device object goes through this trait,
//! which is implemented by the device layer of the application.

pub mod traits;
