//! Attachment inference fills in unknown image and buffer properties when a graph is executed.
//!
//! Internal images and buffers do not need to be fully described when they are attached. Before allocation, the executor
//! repeatedly applies two sources of information until nothing changes anymore:
//! - Images rendered to in the same render pass share their extent and sample count.
//! - Inference rules added with [`RenderGraph::inference_rule()`](crate::RenderGraph::inference_rule) copy properties
//!   from another resource. Rules see resources by the names of the graph they were declared in.
//!
//! A rule that changes a property that was already known is an error, as is an attachment that still has unknown
//! properties once no more progress is made.
//!
//! # Example
//! ```
//! use deimos::prelude::*;
//! use deimos::graph::inference::same_extent_as;
//!
//! let ctx = Context::new();
//! let mut graph = RenderGraph::new(&ctx, "main");
//! graph.attach_image("color", ImageAttachment::new().with_extent(1920, 1080, 1), Access::None);
//! graph.attach_image("bloom", ImageAttachment::new().with_format(vk::Format::R16G16B16A16_SFLOAT), Access::None);
//! graph.inference_rule("bloom", same_extent_as("color"));
//! ```

use anyhow::Result;
use ash::vk;

use crate::graph::attachment::{AttachmentInfo, Buffer, BufferInfo, ImageAttachment};
use crate::graph::chain::{Binding, UseChain};
use crate::graph::name::{Name, QualifiedName};
use crate::graph::partition::RenderUnit;
use crate::graph::resolve::{NameTable, ScopedRule};
use crate::Error;

/// A rule inferring properties of an image.
pub type ImageRule = Box<dyn Fn(&InferenceContext, &mut ImageAttachment) -> Result<()>>;
/// A rule inferring properties of a buffer.
pub type BufferRule = Box<dyn Fn(&InferenceContext, &mut Buffer) -> Result<()>>;

/// Read access to the bound values of a compiled graph, given to inference rules.
pub struct InferenceContext<'a> {
    prefix: &'a Name,
    names: &'a NameTable,
    chains: &'a [UseChain],
    attachments: &'a [AttachmentInfo],
    buffers: &'a [BufferInfo],
}

impl<'a> InferenceContext<'a> {
    pub(crate) fn new(
        prefix: &'a Name,
        names: &'a NameTable,
        chains: &'a [UseChain],
        attachments: &'a [AttachmentInfo],
        buffers: &'a [BufferInfo],
    ) -> Self {
        Self {
            prefix,
            names,
            chains,
            attachments,
            buffers,
        }
    }

    fn binding(&self, name: Name) -> Result<Binding> {
        let qualified = QualifiedName::new(self.prefix.clone(), name);
        let info = self
            .names
            .version(&qualified)
            .ok_or_else(|| Error::InferenceFailed(format!("`{qualified}` is not bound or produced")))?;
        Ok(self.chains[info.chain].binding)
    }

    /// Get the image that `name` refers to, in its current state of inference.
    /// # Errors
    /// Fails if `name` does not exist or is not an image.
    pub fn get_image_attachment(&self, name: impl Into<Name>) -> Result<&'a ImageAttachment> {
        let name = name.into();
        match self.binding(name.clone())? {
            Binding::Image(index) => Ok(&self.attachments[index].attachment),
            Binding::Buffer(_) => Err(Error::WrongResourceType(name.to_string()).into()),
        }
    }

    /// Get the buffer that `name` refers to, in its current state of inference.
    /// # Errors
    /// Fails if `name` does not exist or is not a buffer.
    pub fn get_buffer(&self, name: impl Into<Name>) -> Result<&'a Buffer> {
        let name = name.into();
        match self.binding(name.clone())? {
            Binding::Buffer(index) => Ok(&self.buffers[index].buffer),
            Binding::Image(_) => Err(Error::WrongResourceType(name.to_string()).into()),
        }
    }
}

fn image_rule<F>(rule: F) -> ImageRule
where
    F: Fn(&InferenceContext, &mut ImageAttachment) -> Result<()> + 'static, {
    Box::new(rule)
}

/// The target has the same extent as `source`.
pub fn same_extent_as(source: impl Into<Name>) -> ImageRule {
    let source = source.into();
    image_rule(move |ctx, target| {
        let source = ctx.get_image_attachment(source.clone())?;
        if source.extent.is_some() {
            target.extent = source.extent;
        }
        Ok(())
    })
}

/// The target has the same width and height as `source`. Its depth is 1.
pub fn same_2d_extent_as(source: impl Into<Name>) -> ImageRule {
    let source = source.into();
    image_rule(move |ctx, target| {
        let source = ctx.get_image_attachment(source.clone())?;
        if let Some(extent) = source.extent {
            target.extent = Some(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });
        }
        Ok(())
    })
}

/// The target has the same format as `source`.
pub fn same_format_as(source: impl Into<Name>) -> ImageRule {
    let source = source.into();
    image_rule(move |ctx, target| {
        let source = ctx.get_image_attachment(source.clone())?;
        if source.format.is_some() {
            target.format = source.format;
        }
        Ok(())
    })
}

/// The target has the same extent, mip levels and array layers as `source`.
pub fn same_shape_as(source: impl Into<Name>) -> ImageRule {
    let source = source.into();
    image_rule(move |ctx, target| {
        let source = ctx.get_image_attachment(source.clone())?;
        if source.extent.is_some() {
            target.extent = source.extent;
        }
        target.level_count = source.level_count;
        target.layer_count = source.layer_count;
        Ok(())
    })
}

/// The target has the same shape, format and sample count as `source`.
pub fn similar_to(source: impl Into<Name>) -> ImageRule {
    let source = source.into();
    image_rule(move |ctx, target| {
        let source = ctx.get_image_attachment(source.clone())?;
        if source.extent.is_some() {
            target.extent = source.extent;
        }
        if source.format.is_some() {
            target.format = source.format;
        }
        if source.sample_count.is_some() {
            target.sample_count = source.sample_count;
        }
        target.level_count = source.level_count;
        target.layer_count = source.layer_count;
        Ok(())
    })
}

/// The target buffer has the same size as the buffer `source`.
pub fn same_size_as(source: impl Into<Name>) -> BufferRule {
    let source = source.into();
    buffer_rule(move |ctx, target| {
        let source = ctx.get_buffer(source.clone())?;
        if source.size.is_some() {
            target.size = source.size;
        }
        Ok(())
    })
}

fn buffer_rule<F>(rule: F) -> BufferRule
where
    F: Fn(&InferenceContext, &mut Buffer) -> Result<()> + 'static, {
    Box::new(rule)
}

fn check_image(name: &QualifiedName, known: &ImageAttachment, inferred: &ImageAttachment) -> Result<()> {
    let broken = |field: &str, before: String, after: String| {
        Err(anyhow::Error::from(Error::InferenceFailed(format!(
            "Rule broken for `{name}`: {field} was known to be {before}, but was set to {after}"
        ))))
    };
    if known.extent.is_some() && known.extent != inferred.extent {
        return broken("extent", format!("{:?}", known.extent), format!("{:?}", inferred.extent));
    }
    if known.format.is_some() && known.format != inferred.format {
        return broken("format", format!("{:?}", known.format), format!("{:?}", inferred.format));
    }
    if known.sample_count.is_some() && known.sample_count != inferred.sample_count {
        return broken("sample count", format!("{:?}", known.sample_count), format!("{:?}", inferred.sample_count));
    }
    Ok(())
}

/// The bound values and rules attachment inference operates on.
pub(crate) struct Inference<'a> {
    pub attachments: &'a mut [AttachmentInfo],
    pub buffers: &'a mut [BufferInfo],
    pub chains: &'a [UseChain],
    pub names: &'a NameTable,
    pub image_rules: &'a [ScopedRule<ImageRule>],
    pub buffer_rules: &'a [ScopedRule<BufferRule>],
    pub units: &'a [RenderUnit],
}

impl Inference<'_> {
    fn share_framebuffer_properties(&mut self) -> bool {
        let mut progress = false;
        for unit in self.units {
            let images = unit
                .attachments
                .iter()
                .filter_map(|attachment| match self.chains[attachment.chain].binding {
                    Binding::Image(index) => Some(index),
                    Binding::Buffer(_) => None,
                })
                .collect::<Vec<_>>();
            let extent = images.iter().find_map(|index| self.attachments[*index].attachment.extent);
            let samples = images
                .iter()
                .find_map(|index| self.attachments[*index].attachment.sample_count);
            for index in images {
                let attachment = &mut self.attachments[index].attachment;
                if let (None, Some(extent)) = (attachment.extent, extent) {
                    attachment.extent = Some(vk::Extent3D {
                        width: extent.width,
                        height: extent.height,
                        depth: 1,
                    });
                    progress = true;
                }
                if let (None, Some(samples)) = (attachment.sample_count, samples) {
                    attachment.sample_count = Some(samples);
                    progress = true;
                }
            }
        }
        progress
    }

    fn apply_image_rules(&mut self) -> Result<bool> {
        let mut progress = false;
        for rule in self.image_rules {
            let info = self
                .names
                .version(&rule.target)
                .ok_or_else(|| Error::InferenceFailed(format!("Inference rule for `{}`, which is never bound", rule.target)))?;
            let Binding::Image(index) = self.chains[info.chain].binding else {
                return Err(Error::WrongResourceType(rule.target.to_string()).into());
            };
            let mut inferred = self.attachments[index].attachment.clone();
            let ctx = InferenceContext::new(&rule.prefix, self.names, self.chains, self.attachments, self.buffers);
            (rule.rule)(&ctx, &mut inferred)?;
            let known = &self.attachments[index];
            check_image(&known.name, &known.attachment, &inferred)?;
            if known.attachment != inferred {
                self.attachments[index].attachment = inferred;
                progress = true;
            }
        }
        Ok(progress)
    }

    fn apply_buffer_rules(&mut self) -> Result<bool> {
        let mut progress = false;
        for rule in self.buffer_rules {
            let info = self
                .names
                .version(&rule.target)
                .ok_or_else(|| Error::InferenceFailed(format!("Inference rule for `{}`, which is never bound", rule.target)))?;
            let Binding::Buffer(index) = self.chains[info.chain].binding else {
                return Err(Error::WrongResourceType(rule.target.to_string()).into());
            };
            let mut inferred = self.buffers[index].buffer.clone();
            let ctx = InferenceContext::new(&rule.prefix, self.names, self.chains, self.attachments, self.buffers);
            (rule.rule)(&ctx, &mut inferred)?;
            let known = &self.buffers[index];
            if known.buffer.size.is_some() && known.buffer.size != inferred.size {
                return Err(Error::InferenceFailed(format!(
                    "Rule broken for `{}`: size was known to be {:?}, but was set to {:?}",
                    known.name, known.buffer.size, inferred.size
                ))
                .into());
            }
            if known.buffer != inferred {
                self.buffers[index].buffer = inferred;
                progress = true;
            }
        }
        Ok(progress)
    }

    /// Run inference until no more progress is made, or `iterations` rounds have passed.
    /// # Errors
    /// * Fails if a rule changes an already known property.
    /// * Fails if a used resource still has unknown properties afterwards.
    pub fn run(mut self, iterations: usize) -> Result<()> {
        for iteration in 0..iterations {
            let mut progress = self.share_framebuffer_properties();
            progress |= self.apply_image_rules()?;
            progress |= self.apply_buffer_rules()?;
            if !progress {
                trace!("Attachment inference converged after {} iteration(s)", iteration + 1);
                break;
            }
        }

        for info in self.attachments.iter() {
            if self.chains[info.chain].is_unused() {
                continue;
            }
            let missing = info.attachment.missing_fields();
            if !missing.is_empty() {
                return Err(Error::InferenceFailed(format!("Could not infer {} of `{}`", missing.join(", "), info.name)).into());
            }
        }
        for info in self.buffers.iter() {
            if !self.chains[info.chain].is_unused() && info.buffer.size.is_none() {
                return Err(Error::InferenceFailed(format!("Could not infer size of `{}`", info.name)).into());
            }
        }
        Ok(())
    }
}
