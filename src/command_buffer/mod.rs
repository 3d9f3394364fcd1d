//! The command buffer handle given to pass executors.
//!
//! While a pass records, it receives a [`CommandBuffer`] scoped to that pass. Through it, the pass can look up the
//! concrete images and buffers bound to the names it declared, query the layout they are in, and record commands
//! through the underlying [`CommandRecorder`](traits::CommandRecorder).
//!
//! All synchronization is already recorded by the time a pass executes, so passes never need to insert barriers themselves.
//!
//! # Example
//! ```
//! use deimos::prelude::*;
//!
//! let pass = PassBuilder::new("blur")
//!     .image("input", Access::ComputeSampled)
//!     .image_into("output", Access::ComputeWrite, "blurred")
//!     .execute_fn(|cmd| {
//!         let input = cmd.image("input")?;
//!         let extent = input.extent.unwrap_or_default();
//!         cmd.dispatch((extent.width + 7) / 8, (extent.height + 7) / 8, 1)
//!     })
//!     .build();
//! ```

use anyhow::Result;
use ash::vk;

use crate::command_buffer::render_pass::RenderPassInfo;
use crate::command_buffer::traits::CommandRecorder;
use crate::graph::attachment::{Buffer, Clear, ImageAttachment, Subrange};
use crate::graph::name::Name;
use crate::sync::domain::Domain;
use crate::Error;

pub mod render_pass;
pub mod traits;

#[derive(Debug, Copy, Clone)]
pub(crate) enum BoundValue<'a> {
    Image(&'a ImageAttachment),
    Buffer(&'a Buffer),
}

/// A resource as seen by the pass that declared it.
#[derive(Debug)]
pub(crate) struct BoundResource<'a> {
    pub name: &'a Name,
    pub out_name: Option<&'a Name>,
    pub value: BoundValue<'a>,
    pub layout: vk::ImageLayout,
    pub subrange: Option<Subrange>,
    pub general: bool,
}

/// Recording handle for a single pass. Only valid for the duration of the pass callback.
pub struct CommandBuffer<'a> {
    pass: &'a Name,
    domain: Domain,
    resources: Vec<BoundResource<'a>>,
    render_pass: Option<RenderPassInfo>,
    recorder: &'a mut dyn CommandRecorder,
}

impl<'a> CommandBuffer<'a> {
    pub(crate) fn new(
        pass: &'a Name,
        domain: Domain,
        resources: Vec<BoundResource<'a>>,
        render_pass: Option<RenderPassInfo>,
        recorder: &'a mut dyn CommandRecorder,
    ) -> Self {
        Self {
            pass,
            domain,
            resources,
            render_pass,
            recorder,
        }
    }

    fn find(&self, name: &Name) -> Result<&BoundResource<'a>> {
        self.resources
            .iter()
            .find(|resource| resource.name == name || resource.out_name == Some(name))
            .ok_or_else(|| {
                anyhow::Error::from(Error::UndeclaredResource {
                    pass: self.pass.to_string(),
                    name: name.to_string(),
                })
            })
    }

    /// Name of the recording pass.
    pub fn pass_name(&self) -> &Name {
        self.pass
    }

    /// Domain the pass executes on.
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Render pass the pass is recorded in, if it renders to attachments.
    pub fn render_pass(&self) -> Option<&RenderPassInfo> {
        self.render_pass.as_ref()
    }

    /// Look up the image bound to a name declared by this pass. Both the input name and the produced name can be used.
    /// # Errors
    /// * Fails if the pass did not declare `name`.
    /// * Fails if `name` is a buffer.
    pub fn image(&self, name: impl Into<Name>) -> Result<&'a ImageAttachment> {
        let name = name.into();
        match self.find(&name)?.value {
            BoundValue::Image(image) => Ok(image),
            BoundValue::Buffer(_) => Err(Error::WrongResourceType(name.to_string()).into()),
        }
    }

    /// Look up the buffer bound to a name declared by this pass.
    /// # Errors
    /// * Fails if the pass did not declare `name`.
    /// * Fails if `name` is an image.
    pub fn buffer(&self, name: impl Into<Name>) -> Result<&'a Buffer> {
        let name = name.into();
        match self.find(&name)?.value {
            BoundValue::Buffer(buffer) => Ok(buffer),
            BoundValue::Image(_) => Err(Error::WrongResourceType(name.to_string()).into()),
        }
    }

    /// Layout an image is in while this pass executes.
    /// # Errors
    /// Fails if the pass did not declare `name`.
    pub fn layout(&self, name: impl Into<Name>) -> Result<vk::ImageLayout> {
        Ok(self.find(&name.into())?.layout)
    }

    /// Returns true if the compiler moved this access to `VK_IMAGE_LAYOUT_GENERAL` instead of the optimal layout
    /// for the declared access. Descriptors written for this image must use the general layout in that case.
    /// # Errors
    /// Fails if the pass did not declare `name`.
    pub fn is_general_layout(&self, name: impl Into<Name>) -> Result<bool> {
        Ok(self.find(&name.into())?.general)
    }

    /// Subresource range the pass sees, if it accesses a diverged part of an image.
    /// # Errors
    /// Fails if the pass did not declare `name`.
    pub fn subrange(&self, name: impl Into<Name>) -> Result<Subrange> {
        Ok(self.find(&name.into())?.subrange.unwrap_or_default())
    }

    /// Access the raw recorder to record commands not covered by this handle.
    pub fn recorder(&mut self) -> &mut dyn CommandRecorder {
        &mut *self.recorder
    }

    /// Record a single drawcall.
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        self.recorder.draw(vertex_count, instance_count, first_vertex, first_instance)
    }

    /// Dispatch compute work.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.recorder.dispatch(x, y, z)
    }

    /// Copy `size` bytes between two buffers declared by this pass.
    /// # Errors
    /// Fails if either name was not declared, or is not a buffer.
    pub fn copy_buffer(&mut self, src: impl Into<Name>, dst: impl Into<Name>, size: vk::DeviceSize) -> Result<()> {
        let src = self.buffer(src)?;
        let dst = self.buffer(dst)?;
        self.recorder.copy_buffer(src, dst, size)
    }

    /// Clear an image declared by this pass, in the layout it is in.
    /// # Errors
    /// Fails if `name` was not declared, or is not an image.
    pub fn clear_image(&mut self, name: impl Into<Name>, clear: &Clear) -> Result<()> {
        let name = name.into();
        let image = self.image(name.clone())?;
        let resource = self.find(&name)?;
        let range = resource.subrange.unwrap_or_default().to_vk(image.aspect());
        let layout = resource.layout;
        self.recorder.clear_image(image, layout, clear, range)
    }

    /// Resolve one multisampled image declared by this pass into another.
    /// # Errors
    /// Fails if either name was not declared, or is not an image.
    pub fn resolve_image(&mut self, src: impl Into<Name>, dst: impl Into<Name>) -> Result<()> {
        let src = src.into();
        let dst = dst.into();
        let src_image = self.image(src.clone())?;
        let dst_image = self.image(dst.clone())?;
        let src_layout = self.layout(src)?;
        let dst_layout = self.layout(dst)?;
        self.recorder.resolve_image(src_image, src_layout, dst_image, dst_layout)
    }
}
