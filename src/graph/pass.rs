//! This module mainly exposes the [`PassBuilder`] struct, used for correctly defining passes in a
//! [`RenderGraph`](crate::RenderGraph).
//!
//! For documentation on how to use the render graph, refer to the [`graph`](crate::graph) module level documentation.
//! Each pass declares the resources it touches and how, and can optionally specify an executor to be called when the pass is
//! recorded to a command buffer. Additionally, a color can be given to each pass
//! which will show up in debuggers like [*RenderDoc*](https://renderdoc.org/) if the `debug-markers` feature is enabled.
//!
//! # Example
//!
//! In this example we define two passes: One that renders to an offscreen texture, and one that samples from this
//! texture in a compute shader. The compiler will make sure the offscreen image is transitioned from
//! `VK_IMAGE_LAYOUT_COLOR_ATTACHMENT_OPTIMAL` to `VK_IMAGE_LAYOUT_SHADER_READ_ONLY_OPTIMAL` in between.
//! ```
//! use deimos::prelude::*;
//!
//! let offscreen = PassBuilder::new("offscreen")
//!     .image_into("offscreen", Access::ColorWrite, "offscreen_done")
//!     .execute_fn(|cmd| cmd.draw(3, 1, 0, 0))
//!     .build();
//!
//! let postprocess = PassBuilder::new("postprocess")
//!     .image("offscreen_done", Access::ComputeSampled)
//!     .image_into("output", Access::ComputeWrite, "output_done")
//!     .execute_fn(|cmd| cmd.dispatch(16, 16, 1))
//!     .build();
//! ```

use anyhow::Result;

use crate::command_buffer::CommandBuffer;
use crate::graph::access::Access;
use crate::graph::attachment::{Clear, Subrange};
use crate::graph::name::Name;
use crate::graph::resource::Resource;
use crate::sync::domain::Domain;

/// Defines a pass executor that is called when the pass is recorded.
pub trait PassExecutor {
    /// Record this pass to a command buffer.
    fn record(&mut self, cmd: &mut CommandBuffer) -> Result<()>;
}

impl<F> PassExecutor for F
where
    F: FnMut(&mut CommandBuffer) -> Result<()>,
{
    /// Record this pass to a command buffer by calling the given function.
    fn record(&mut self, cmd: &mut CommandBuffer) -> Result<()> {
        self(cmd)
    }
}

pub(crate) type BoxedPassExecutor = Box<dyn PassExecutor>;

/// An empty pass executor that does nothing
#[derive(Debug, Default)]
pub struct EmptyPassExecutor;

impl EmptyPassExecutor {
    /// Creates an empty pass executor
    pub fn new() -> Self {
        Self {}
    }

    /// Create a new empty pass executor in a [`Box`]
    pub fn new_boxed() -> Box<Self> {
        Box::new(Self::new())
    }
}

impl PassExecutor for EmptyPassExecutor {
    fn record(&mut self, _cmd: &mut CommandBuffer) -> Result<()> {
        Ok(())
    }
}

/// Clears the single image of a clear pass.
#[derive(Debug)]
struct ClearExecutor {
    target: Name,
    clear: Clear,
}

impl PassExecutor for ClearExecutor {
    fn record(&mut self, cmd: &mut CommandBuffer) -> Result<()> {
        cmd.clear_image(self.target.clone(), &self.clear)
    }
}

/// Resolves the multisampled image of a resolve pass into its single-sampled image.
#[derive(Debug)]
struct ResolveExecutor {
    src: Name,
    dst: Name,
}

impl PassExecutor for ResolveExecutor {
    fn record(&mut self, cmd: &mut CommandBuffer) -> Result<()> {
        cmd.resolve_image(self.src.clone(), self.dst.clone())
    }
}

/// The kind of a pass. Everything except [`PassKind::User`] is inserted by the graph itself.
#[derive(Debug, Clone, PartialEq)]
pub enum PassKind {
    /// A pass declared by the user.
    User,
    /// Clears an image to a value.
    Clear(Clear),
    /// Resolves a multisampled image.
    Resolve,
    /// Splits a range of an image off into its own name.
    Diverge(Subrange),
    /// Joins diverged ranges back into the whole image.
    Converge,
    /// Forces a final access on a resource leaving the graph.
    ForcedAccess,
}

impl PassKind {
    /// Structural passes only exist to order accesses, and never record anything.
    pub fn is_structural(&self) -> bool {
        matches!(self, PassKind::Diverge(_) | PassKind::Converge)
    }
}

/// Represents one pass in a render graph. You can obtain one using a [`PassBuilder`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Pass {
    pub(crate) name: Name,
    pub(crate) domain: Option<Domain>,
    pub(crate) resources: Vec<Resource>,
    pub(crate) kind: PassKind,
    #[derivative(Debug = "ignore")]
    pub(crate) executor: BoxedPassExecutor,
    pub(crate) color: Option<[f32; 4]>,
}

impl Pass {
    pub(crate) fn synthetic(name: Name, domain: Option<Domain>, kind: PassKind, resources: Vec<Resource>) -> Self {
        let executor: BoxedPassExecutor = match &kind {
            PassKind::Clear(clear) => Box::new(ClearExecutor {
                target: resources[0].original_name.clone(),
                clear: *clear,
            }),
            PassKind::Resolve => Box::new(ResolveExecutor {
                src: resources[0].original_name.clone(),
                dst: resources[1].original_name.clone(),
            }),
            _ => EmptyPassExecutor::new_boxed(),
        };
        Self {
            name,
            domain,
            resources,
            kind,
            executor,
            color: None,
        }
    }

    /// Get the pass name
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Get the domain explicitly requested for this pass, if any.
    pub fn domain(&self) -> Option<Domain> {
        self.domain
    }

    /// Get the resources touched by this pass.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Get the kind of this pass.
    pub fn kind(&self) -> &PassKind {
        &self.kind
    }

    /// Returns true if this pass renders to at least one framebuffer attachment.
    pub fn has_framebuffer_attachments(&self) -> bool {
        self.resources
            .iter()
            .any(|resource| resource.access.is_framebuffer_attachment())
    }
}

/// Used to create [`Pass`] objects correctly.
/// # Example
/// See the [`pass`](crate::graph::pass) module level documentation.
pub struct PassBuilder {
    inner: Pass,
}

impl PassBuilder {
    /// Create a new pass. Its domain is inferred from the resources it uses unless set with [`PassBuilder::on()`].
    pub fn new(name: impl Into<Name>) -> Self {
        PassBuilder {
            inner: Pass {
                name: name.into(),
                domain: None,
                resources: vec![],
                kind: PassKind::User,
                executor: EmptyPassExecutor::new_boxed(),
                color: None,
            },
        }
    }

    /// Execute this pass on the given domain.
    pub fn on(mut self, domain: Domain) -> Self {
        self.inner.domain = Some(domain);
        self
    }

    /// Set the color of this pass. This can show up in graphics debuggers like RenderDoc.
    #[cfg(feature = "debug-markers")]
    pub fn color(mut self, color: [f32; 4]) -> Self {
        self.inner.color = Some(color);
        self
    }

    /// Declare a resource access.
    pub fn resource(mut self, resource: Resource) -> Self {
        self.inner.resources.push(resource);
        self
    }

    /// Declare an image access.
    pub fn image(self, name: impl Into<Name>, access: Access) -> Self {
        self.resource(Resource::image(name, access))
    }

    /// Declare an image access, and name the value after this pass `out`.
    pub fn image_into(self, name: impl Into<Name>, access: Access, out: impl Into<Name>) -> Self {
        self.resource(Resource::image(name, access).produces(out))
    }

    /// Declare a buffer access.
    pub fn buffer(self, name: impl Into<Name>, access: Access) -> Self {
        self.resource(Resource::buffer(name, access))
    }

    /// Declare a buffer access, and name the value after this pass `out`.
    pub fn buffer_into(self, name: impl Into<Name>, access: Access, out: impl Into<Name>) -> Self {
        self.resource(Resource::buffer(name, access).produces(out))
    }

    /// Set the executor to be called when recording this pass.
    pub fn executor(mut self, exec: impl PassExecutor + 'static) -> Self {
        self.inner.executor = Box::new(exec);
        self
    }

    /// Set the executor to be called when recording this pass. This method can be used to deduce types
    /// when a closure is used as a pass executor.
    pub fn execute_fn<F>(mut self, exec: F) -> Self
    where
        F: FnMut(&mut CommandBuffer) -> Result<()> + 'static, {
        self.inner.executor = Box::new(exec);
        self
    }

    /// Obtain a built [`Pass`] object.
    pub fn build(self) -> Pass {
        self.inner
    }
}
