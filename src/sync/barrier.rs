//! Pipeline barriers emitted by the executor. These map one-to-one onto `vkCmdPipelineBarrier2`.

use ash::vk;

use crate::sync::domain::Domain;

/// Image memory barrier, optionally transferring queue ownership between two domains.
#[derive(Debug, Copy, Clone)]
pub struct ImageBarrier {
    /// Image to transition
    pub image: vk::Image,
    /// Subresources to transition
    pub subresource_range: vk::ImageSubresourceRange,
    /// Source stage mask
    pub src_stages: vk::PipelineStageFlags2,
    /// Source access mask
    pub src_access: vk::AccessFlags2,
    /// Destination stage mask
    pub dst_stages: vk::PipelineStageFlags2,
    /// Destination access mask
    pub dst_access: vk::AccessFlags2,
    /// Layout before the barrier
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
    /// Domain releasing ownership, if this is a queue ownership transfer.
    pub src_domain: Option<Domain>,
    /// Domain acquiring ownership, if this is a queue ownership transfer.
    pub dst_domain: Option<Domain>,
}

/// Global memory barrier. Buffers are always synchronized with these.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryBarrier {
    /// Source stage mask
    pub src_stages: vk::PipelineStageFlags2,
    /// Source access mask
    pub src_access: vk::AccessFlags2,
    /// Destination stage mask
    pub dst_stages: vk::PipelineStageFlags2,
    /// Destination access mask
    pub dst_access: vk::AccessFlags2,
}

/// A set of barriers recorded together with one pipeline barrier command.
#[derive(Debug, Default, Clone)]
pub struct Dependency {
    /// Global memory barriers
    pub memory_barriers: Vec<MemoryBarrier>,
    /// Image memory barriers
    pub image_barriers: Vec<ImageBarrier>,
}

impl Dependency {
    /// Whether this dependency contains no barriers at all.
    pub fn is_empty(&self) -> bool {
        self.memory_barriers.is_empty() && self.image_barriers.is_empty()
    }

    /// Total amount of barriers in this dependency.
    pub fn len(&self) -> usize {
        self.memory_barriers.len() + self.image_barriers.len()
    }
}
