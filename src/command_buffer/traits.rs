use anyhow::Result;
use ash::vk;

use crate::command_buffer::render_pass::RenderPassBegin;
use crate::graph::attachment::{Buffer, Clear, ImageAttachment};
use crate::sync::barrier::Dependency;

/// Low-level recording interface bound to one command buffer. Implemented by the device layer, which
/// translates each call into the matching `vkCmd*` command.
pub trait CommandRecorder {
    /// Handle of the underlying command buffer.
    fn handle(&self) -> vk::CommandBuffer;
    /// Record a pipeline barrier. Equivalent of `vkCmdPipelineBarrier2`.
    fn pipeline_barrier(&mut self, dependency: &Dependency) -> Result<()>;
    /// Begin a render pass instance. Equivalent of `vkCmdBeginRenderPass2`.
    fn begin_render_pass(&mut self, info: &RenderPassBegin) -> Result<()>;
    /// Advance to the next subpass. Equivalent of `vkCmdNextSubpass2`.
    fn next_subpass(&mut self) -> Result<()>;
    /// End the current render pass instance. Equivalent of `vkCmdEndRenderPass2`.
    fn end_render_pass(&mut self) -> Result<()>;
    /// Clear an image outside of a render pass. Equivalent of `vkCmdClearColorImage` or `vkCmdClearDepthStencilImage`.
    fn clear_image(
        &mut self,
        image: &ImageAttachment,
        layout: vk::ImageLayout,
        clear: &Clear,
        range: vk::ImageSubresourceRange,
    ) -> Result<()>;
    /// Resolve a multisampled image. Equivalent of `vkCmdResolveImage`.
    fn resolve_image(
        &mut self,
        src: &ImageAttachment,
        src_layout: vk::ImageLayout,
        dst: &ImageAttachment,
        dst_layout: vk::ImageLayout,
    ) -> Result<()>;
    /// Record a single drawcall. Equivalent of `vkCmdDraw`.
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()>;
    /// Dispatch compute work. Equivalent of `vkCmdDispatch`.
    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()>;
    /// Copy `size` bytes between buffers. Equivalent of `vkCmdCopyBuffer`.
    fn copy_buffer(&mut self, src: &Buffer, dst: &Buffer, size: vk::DeviceSize) -> Result<()>;
    /// Open a debug label region. Equivalent of `vkCmdBeginDebugUtilsLabelEXT`.
    fn begin_label(&mut self, name: &str, color: [f32; 4]) -> Result<()>;
    /// Close the last debug label region. Equivalent of `vkCmdEndDebugUtilsLabelEXT`.
    fn end_label(&mut self) -> Result<()>;
    /// Finish recording. Equivalent of `vkEndCommandBuffer`.
    fn finish(&mut self) -> Result<vk::CommandBuffer>;
}
