//! Concrete backing descriptions for graph resources.
//!
//! An [`ImageAttachment`] or [`Buffer`] describes the value bound to a resource name. Fields that are not known
//! when the graph is built can be left empty and are filled in by attachment inference before allocation,
//! see the [`inference`](crate::graph::inference) module.

use std::sync::Arc;

use ash::vk;

use crate::graph::access::{Access, ResourceUse};
use crate::graph::name::QualifiedName;
use crate::sync::domain::Domain;
use crate::sync::future::Future;

/// A range of mip levels and array layers of an image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Subrange {
    /// First mip level
    pub base_level: u32,
    /// Amount of mip levels, or [`Subrange::REMAINING`].
    pub level_count: u32,
    /// First array layer
    pub base_layer: u32,
    /// Amount of array layers, or [`Subrange::REMAINING`].
    pub layer_count: u32,
}

impl Subrange {
    /// Refers to all remaining levels or layers, starting from the base.
    pub const REMAINING: u32 = vk::REMAINING_MIP_LEVELS;

    /// The whole image.
    pub fn whole() -> Self {
        Self {
            base_level: 0,
            level_count: Self::REMAINING,
            base_layer: 0,
            layer_count: Self::REMAINING,
        }
    }

    /// A single mip level, covering all layers.
    pub fn level(level: u32) -> Self {
        Self {
            base_level: level,
            level_count: 1,
            base_layer: 0,
            layer_count: Self::REMAINING,
        }
    }

    /// A single array layer, covering all mip levels.
    pub fn layer(layer: u32) -> Self {
        Self {
            base_level: 0,
            level_count: Self::REMAINING,
            base_layer: layer,
            layer_count: 1,
        }
    }

    /// Convert to a Vulkan subresource range for the given aspect.
    pub fn to_vk(&self, aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: self.base_level,
            level_count: self.level_count,
            base_array_layer: self.base_layer,
            layer_count: self.layer_count,
        }
    }
}

impl Default for Subrange {
    fn default() -> Self {
        Self::whole()
    }
}

/// A clear value for an image.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Clear {
    /// Float color clear value
    Color([f32; 4]),
    /// Unsigned integer color clear value
    ColorUint([u32; 4]),
    /// Signed integer color clear value
    ColorInt([i32; 4]),
    /// Depth/stencil clear value
    DepthStencil {
        /// Depth value
        depth: f32,
        /// Stencil value
        stencil: u32,
    },
}

impl From<Clear> for vk::ClearValue {
    fn from(value: Clear) -> Self {
        match value {
            Clear::Color(values) => vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: values,
                },
            },
            Clear::ColorUint(values) => vk::ClearValue {
                color: vk::ClearColorValue {
                    uint32: values,
                },
            },
            Clear::ColorInt(values) => vk::ClearValue {
                color: vk::ClearColorValue {
                    int32: values,
                },
            },
            Clear::DepthStencil {
                depth,
                stencil,
            } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth,
                    stencil,
                },
            },
        }
    }
}

/// Description of an image bound to a resource name. Unknown properties are `None` and will be inferred.
/// An attachment with a null `image` handle is allocated by the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    /// Image handle, null if not yet allocated.
    pub image: vk::Image,
    /// Image view handle, null if not yet allocated.
    pub image_view: vk::ImageView,
    /// Image extent.
    pub extent: Option<vk::Extent3D>,
    /// Image format.
    pub format: Option<vk::Format>,
    /// Sample count.
    pub sample_count: Option<vk::SampleCountFlags>,
    /// Usage flags. If `None`, the union of all accesses in the graph is used.
    pub usage: Option<vk::ImageUsageFlags>,
    /// Amount of mip levels.
    pub level_count: u32,
    /// Amount of array layers.
    pub layer_count: u32,
}

impl Default for ImageAttachment {
    fn default() -> Self {
        Self {
            image: vk::Image::null(),
            image_view: vk::ImageView::null(),
            extent: None,
            format: None,
            sample_count: None,
            usage: None,
            level_count: 1,
            layer_count: 1,
        }
    }
}

impl ImageAttachment {
    /// Create an image description where every property is inferred.
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe an existing image. Images described this way are never allocated by the graph.
    pub fn from_image(image: vk::Image, image_view: vk::ImageView, extent: vk::Extent3D, format: vk::Format) -> Self {
        Self {
            image,
            image_view,
            extent: Some(extent),
            format: Some(format),
            sample_count: Some(vk::SampleCountFlags::TYPE_1),
            ..Default::default()
        }
    }

    /// Set the extent of the image
    pub fn with_extent(mut self, width: u32, height: u32, depth: u32) -> Self {
        self.extent = Some(vk::Extent3D {
            width,
            height,
            depth,
        });
        self
    }

    /// Set the format of the image
    pub fn with_format(mut self, format: vk::Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the sample count of the image
    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.sample_count = Some(samples);
        self
    }

    /// Set the usage of the image, disabling usage inference for it.
    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Set the amount of mip levels and array layers
    pub fn with_levels_and_layers(mut self, level_count: u32, layer_count: u32) -> Self {
        self.level_count = level_count;
        self.layer_count = layer_count;
        self
    }

    /// Whether this image is backed by an actual `VkImage` yet.
    pub fn is_allocated(&self) -> bool {
        self.image != vk::Image::null()
    }

    /// Names of the properties that are still unknown.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.extent.is_none() {
            missing.push("extent");
        }
        if self.format.is_none() {
            missing.push("format");
        }
        if self.sample_count.is_none() {
            missing.push("sample count");
        }
        missing
    }

    /// The aspect implied by the format of this image. Unknown formats are assumed to be color.
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        match self.format {
            Some(vk::Format::D16_UNORM) | Some(vk::Format::D32_SFLOAT) | Some(vk::Format::X8_D24_UNORM_PACK32) => {
                vk::ImageAspectFlags::DEPTH
            }
            Some(vk::Format::D16_UNORM_S8_UINT) | Some(vk::Format::D24_UNORM_S8_UINT) | Some(vk::Format::D32_SFLOAT_S8_UINT) => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            Some(vk::Format::S8_UINT) => vk::ImageAspectFlags::STENCIL,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

/// Description of a buffer bound to a resource name. A buffer with a null handle is allocated by the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    /// Buffer handle, null if not yet allocated.
    pub buffer: vk::Buffer,
    /// Offset into the buffer handle.
    pub offset: vk::DeviceSize,
    /// Size of the buffer in bytes. `None` if it is inferred.
    pub size: Option<vk::DeviceSize>,
}

impl Default for Buffer {
    fn default() -> Self {
        Self {
            buffer: vk::Buffer::null(),
            offset: 0,
            size: None,
        }
    }
}

impl Buffer {
    /// Describe a buffer of a known size that will be allocated by the graph.
    pub fn new(size: vk::DeviceSize) -> Self {
        Self {
            size: Some(size),
            ..Default::default()
        }
    }

    /// Describe a buffer whose size is inferred.
    pub fn inferred() -> Self {
        Self::default()
    }

    /// Describe a range of an existing buffer.
    pub fn from_raw(buffer: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        Self {
            buffer,
            offset,
            size: Some(size),
        }
    }

    /// Whether this buffer is backed by an actual `VkBuffer` yet.
    pub fn is_allocated(&self) -> bool {
        self.buffer != vk::Buffer::null()
    }
}

/// A swapchain whose images can be attached to a graph. The actual image is chosen when the graph is executed.
#[derive(Debug)]
pub struct Swapchain {
    /// The swapchain handle.
    pub handle: vk::SwapchainKHR,
    /// All images of the swapchain.
    pub images: Vec<ImageAttachment>,
}

/// Shared reference to a swapchain.
pub type SwapchainRef = Arc<Swapchain>;

/// Where the value of a bound image comes from.
#[derive(Debug, Clone)]
pub enum AttachmentKind {
    /// Allocated by the graph.
    Internal,
    /// Supplied by the caller.
    External,
    /// An image of a swapchain, chosen at execution.
    Swapchain(SwapchainRef),
}

/// An image bound to a root resource name in a compiled graph.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct AttachmentInfo {
    /// Name the image was bound under.
    pub name: QualifiedName,
    /// The bound value.
    pub attachment: ImageAttachment,
    /// State the image is in before the graph executes.
    pub initial: ResourceUse,
    /// Domain that last accessed the image, if any.
    pub initial_domain: Option<Domain>,
    /// Where the image comes from.
    pub kind: AttachmentKind,
    /// Future this image was received from.
    #[derivative(Debug = "ignore")]
    pub future: Option<Future>,
    pub(crate) wait: Option<(Domain, u64)>,
    pub(crate) chain: usize,
}

impl AttachmentInfo {
    pub(crate) fn new(name: QualifiedName, attachment: ImageAttachment, initial: Access, kind: AttachmentKind) -> Self {
        Self {
            name,
            attachment,
            initial: initial.to_use(),
            initial_domain: None,
            kind,
            future: None,
            wait: None,
            chain: 0,
        }
    }
}

/// A buffer bound to a root resource name in a compiled graph.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct BufferInfo {
    /// Name the buffer was bound under.
    pub name: QualifiedName,
    /// The bound value.
    pub buffer: Buffer,
    /// State the buffer is in before the graph executes.
    pub initial: ResourceUse,
    /// Domain that last accessed the buffer, if any.
    pub initial_domain: Option<Domain>,
    /// Whether the buffer was supplied by the caller.
    pub external: bool,
    /// Future this buffer was received from.
    #[derivative(Debug = "ignore")]
    pub future: Option<Future>,
    pub(crate) wait: Option<(Domain, u64)>,
    pub(crate) chain: usize,
}

impl BufferInfo {
    pub(crate) fn new(name: QualifiedName, buffer: Buffer, initial: Access) -> Self {
        Self {
            name,
            external: buffer.is_allocated(),
            buffer,
            initial: initial.to_use(),
            initial_domain: None,
            future: None,
            wait: None,
            chain: 0,
        }
    }
}
