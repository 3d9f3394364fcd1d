//! Render pass descriptions handed to the recording layer.
//!
//! A [`RenderPassDesc`] is built for every render unit when the graph executes. Descriptions are hashable so identical
//! render passes are only created once and then reused through the [`Context`](crate::Context).

use ash::vk;

/// One attachment of a render pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentDescription {
    /// Attachment format
    pub format: vk::Format,
    /// Sample count
    pub samples: vk::SampleCountFlags,
    /// Load operation at render pass begin
    pub load_op: vk::AttachmentLoadOp,
    /// Store operation at render pass end
    pub store_op: vk::AttachmentStoreOp,
    /// Layout the attachment is in when the render pass begins
    pub initial_layout: vk::ImageLayout,
    /// Layout the attachment is left in when the render pass ends
    pub final_layout: vk::ImageLayout,
}

/// Reference to an attachment inside a subpass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentReference {
    /// Index into [`RenderPassDesc::attachments`]
    pub attachment: u32,
    /// Layout during the subpass
    pub layout: vk::ImageLayout,
}

/// A subpass. Each pass inside a render unit becomes one subpass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct SubpassDescription {
    /// Color attachments
    pub color_attachments: Vec<AttachmentReference>,
    /// Depth/stencil attachment
    pub depth_stencil_attachment: Option<AttachmentReference>,
}

/// Execution and memory dependency between subpasses. `None` refers to work outside of the render pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubpassDependency {
    /// Source subpass, `None` for `VK_SUBPASS_EXTERNAL`
    pub src_subpass: Option<u32>,
    /// Destination subpass
    pub dst_subpass: u32,
    /// Source stages
    pub src_stages: vk::PipelineStageFlags2,
    /// Source access
    pub src_access: vk::AccessFlags2,
    /// Destination stages
    pub dst_stages: vk::PipelineStageFlags2,
    /// Destination access
    pub dst_access: vk::AccessFlags2,
}

/// Full description of a render pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassDesc {
    /// All attachments
    pub attachments: Vec<AttachmentDescription>,
    /// All subpasses, in execution order
    pub subpasses: Vec<SubpassDescription>,
    /// Dependencies between subpasses
    pub dependencies: Vec<SubpassDependency>,
}

/// Everything needed to begin a render pass instance.
#[derive(Debug, Clone)]
pub struct RenderPassBegin {
    /// The render pass object
    pub render_pass: vk::RenderPass,
    /// Description the render pass was created from
    pub desc: RenderPassDesc,
    /// Image views for each attachment, in order
    pub image_views: Vec<vk::ImageView>,
    /// Render area
    pub extent: vk::Extent2D,
    /// Amount of array layers rendered to
    pub layers: u32,
}

/// Render pass state visible to a pass while it records.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderPassInfo {
    /// The render pass object
    pub render_pass: vk::RenderPass,
    /// Index of the current subpass
    pub subpass: u32,
    /// Render area
    pub extent: vk::Extent2D,
}
