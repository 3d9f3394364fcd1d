use anyhow::Result;
use ash::vk;

use crate::command_buffer::render_pass::RenderPassDesc;
use crate::command_buffer::traits::CommandRecorder;
use crate::graph::attachment::{Buffer, ImageAttachment};
use crate::sync::domain::Domain;

/// Source of every object a render graph needs while executing. Implemented by the device layer.
pub trait Allocator {
    /// Allocate an image. Every property of `info` is known when this is called. The returned attachment must have
    /// its image and image view handles set.
    /// # Errors
    /// Fails if the device is out of memory or rejects the image.
    fn allocate_image(&mut self, name: &str, info: &ImageAttachment) -> Result<ImageAttachment>;
    /// Allocate a buffer with the given usage. The size of `info` is known when this is called.
    /// # Errors
    /// Fails if the device is out of memory or rejects the buffer.
    fn allocate_buffer(&mut self, name: &str, info: &Buffer, usage: vk::BufferUsageFlags) -> Result<Buffer>;
    /// Allocate a command buffer in the initial recording state for a domain.
    /// # Errors
    /// Fails if no command buffer could be allocated.
    fn allocate_command_buffer(&mut self, domain: Domain) -> Result<Box<dyn CommandRecorder>>;
    /// Create a render pass object.
    /// # Errors
    /// Fails if the device rejects the render pass.
    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<vk::RenderPass>;
    /// Destroy a render pass object that is no longer in use.
    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass);
}
