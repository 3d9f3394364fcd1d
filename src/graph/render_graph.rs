//! The mutable render graph builder.
//!
//! A [`RenderGraph`] only records what the user declares. No analysis happens until one or more graphs are handed to a
//! [`Compiler`](crate::Compiler), so names may be used before they are attached, and graphs may reference values produced by other
//! graphs through [`Future`]s.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use ash::vk;

use crate::core::context::Context;
use crate::graph::access::Access;
use crate::graph::attachment::{AttachmentKind, Buffer, Clear, ImageAttachment, Subrange, SwapchainRef};
use crate::graph::inference::{BufferRule, ImageRule, InferenceContext};
use crate::graph::name::{Name, QualifiedName};
use crate::graph::pass::{Pass, PassKind};
use crate::graph::resource::Resource;
use crate::sync::domain::Domain;
use crate::sync::future::Future;
use crate::Error;

/// Where the value bound to a name comes from.
#[derive(Debug, Clone)]
pub(crate) enum AttachmentSource {
    Image {
        attachment: ImageAttachment,
        kind: AttachmentKind,
        initial: Access,
    },
    Buffer {
        buffer: Buffer,
        initial: Access,
    },
    Future(Future),
}

/// A final access forced onto a name leaving the graph.
#[derive(Debug, Clone)]
pub(crate) struct Release {
    pub name: Name,
    pub access: Access,
    pub domain: Option<Domain>,
}

/// A render graph under construction. See the [`graph`](crate::graph) module for an overview.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RenderGraph {
    id: u64,
    name: Name,
    pub(crate) passes: Vec<Pass>,
    pub(crate) aliases: Vec<(Name, Name)>,
    pub(crate) attachments: Vec<(Name, AttachmentSource)>,
    #[derivative(Debug = "ignore")]
    pub(crate) image_rules: Vec<(Name, ImageRule)>,
    #[derivative(Debug = "ignore")]
    pub(crate) buffer_rules: Vec<(Name, BufferRule)>,
    pub(crate) releases: Vec<Release>,
    #[derivative(Debug = "ignore")]
    pub(crate) futures: Vec<Future>,
    outputs: HashSet<Name>,
    declared: Vec<Name>,
}

impl RenderGraph {
    /// Create a new, empty render graph. The name is used to scope the resources of this graph when it is
    /// compiled together with other graphs.
    pub fn new(ctx: &Context, name: impl Into<Name>) -> Self {
        Self {
            id: ctx.get_unique_handle_id(),
            name: name.into(),
            passes: vec![],
            aliases: vec![],
            attachments: vec![],
            image_rules: vec![],
            buffer_rules: vec![],
            releases: vec![],
            futures: vec![],
            outputs: HashSet::new(),
            declared: vec![],
        }
    }

    /// Unique id of this graph.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of this graph.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Amount of passes in this graph, including the ones inserted by builder methods.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    fn push_pass(&mut self, pass: Pass) -> Result<()> {
        let mut produced = HashSet::new();
        for out in pass.resources.iter().filter_map(|resource| resource.out_name.as_ref()) {
            if !produced.insert(out.name.clone()) || self.outputs.contains(&out.name) {
                return Err(Error::DuplicateOutput(out.name.to_string()).into());
            }
        }
        for out in produced {
            self.outputs.insert(out);
        }
        self.declared.extend(
            pass.resources
                .iter()
                .filter_map(|resource| resource.out_name.as_ref())
                .map(|out| out.name.clone()),
        );
        trace!("Graph `{}`: added pass `{}`", self.name, pass.name);
        self.passes.push(pass);
        Ok(())
    }

    fn bind(&mut self, name: Name, source: AttachmentSource) {
        self.declared.push(name.clone());
        self.attachments.push((name, source));
    }

    /// Add a pass to the graph.
    /// # Errors
    /// * Fails with [`Error::DuplicateOutput`] if the pass produces the same name twice, or a name that was already produced in this graph.
    /// # Example
    /// ```
    /// use deimos::prelude::*;
    ///
    /// let ctx = Context::new();
    /// let mut graph = RenderGraph::new(&ctx, "main");
    /// graph.add_pass(
    ///     PassBuilder::new("triangle")
    ///         .image_into("target", Access::ColorWrite, "target_final")
    ///         .execute_fn(|cmd| cmd.draw(3, 1, 0, 0))
    ///         .build(),
    /// )?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn add_pass(&mut self, pass: Pass) -> Result<()> {
        self.push_pass(pass)
    }

    /// Make `new` refer to the same value as `old`. This does not create a new version of the resource,
    /// uses of `new` are uses of `old`.
    pub fn add_alias(&mut self, new: impl Into<Name>, old: impl Into<Name>) {
        self.aliases.push((new.into(), old.into()));
    }

    /// Split off `subrange` of the image `whole` under the name `sub_name`. Until the image is converged again,
    /// `whole` may no longer be used.
    /// # Errors
    /// Fails if `sub_name` was already produced in this graph.
    pub fn diverge_image(&mut self, whole: impl Into<Name>, subrange: Subrange, sub_name: impl Into<Name>) -> Result<()> {
        let whole = whole.into();
        let sub_name = sub_name.into();
        let pass = Pass::synthetic(
            Name::new(format!("diverge {whole} -> {sub_name}")),
            None,
            PassKind::Diverge(subrange),
            vec![Resource::image(whole, Access::None).produces(sub_name)],
        );
        self.push_pass(pass)
    }

    /// Join the diverged ranges `diverged` of one image back into the whole image, named `post` afterwards.
    /// # Errors
    /// Fails if `post` was already produced in this graph.
    pub fn converge_image_explicit(&mut self, diverged: Vec<Name>, post: impl Into<Name>) -> Result<()> {
        let post = post.into();
        let mut resources = diverged
            .into_iter()
            .map(|name| Resource::image(name, Access::None))
            .collect::<Vec<_>>();
        if let Some(first) = resources.first_mut() {
            first.out_name = Some(QualifiedName::unqualified(post.clone()));
        }
        let pass = Pass::synthetic(Name::new(format!("converge -> {post}")), None, PassKind::Converge, resources);
        self.push_pass(pass)
    }

    /// Resolve the multisampled image `multisampled` into the single-sampled image `resolved_in`. The resolved
    /// result is named `resolved_out`.
    /// # Errors
    /// Fails if `resolved_out` was already produced in this graph.
    pub fn resolve_resource_into(
        &mut self,
        resolved_in: impl Into<Name>,
        resolved_out: impl Into<Name>,
        multisampled: impl Into<Name>,
    ) -> Result<()> {
        let resolved_in = resolved_in.into();
        let resolved_out = resolved_out.into();
        let multisampled = multisampled.into();
        let pass = Pass::synthetic(
            Name::new(format!("resolve {multisampled} -> {resolved_out}")),
            Some(Domain::Graphics),
            PassKind::Resolve,
            vec![
                Resource::image(multisampled, Access::ColorResolveRead),
                Resource::image(resolved_in, Access::ColorResolveWrite).produces(resolved_out),
            ],
        );
        self.push_pass(pass)
    }

    /// Clear the image `name` to `clear`. The cleared image is named `cleared`.
    /// # Errors
    /// Fails if `cleared` was already produced in this graph.
    pub fn clear_image(&mut self, name: impl Into<Name>, cleared: impl Into<Name>, clear: Clear) -> Result<()> {
        let name = name.into();
        let cleared = cleared.into();
        let pass = Pass::synthetic(
            Name::new(format!("clear {name}")),
            None,
            PassKind::Clear(clear),
            vec![Resource::image(name, Access::Clear).produces(cleared)],
        );
        self.push_pass(pass)
    }

    /// Attach a swapchain under `name`. The image used is selected when the graph is executed.
    pub fn attach_swapchain(&mut self, name: impl Into<Name>, swapchain: SwapchainRef) {
        let attachment = ImageAttachment {
            extent: swapchain.images.first().and_then(|image| image.extent),
            format: swapchain.images.first().and_then(|image| image.format),
            sample_count: Some(vk::SampleCountFlags::TYPE_1),
            ..Default::default()
        };
        self.bind(
            name.into(),
            AttachmentSource::Image {
                attachment,
                kind: AttachmentKind::Swapchain(swapchain),
                initial: Access::None,
            },
        );
    }

    /// Attach a buffer under `name`. Buffers with a null handle are allocated when the graph is executed.
    /// `initial` is the last access to the buffer before this graph.
    pub fn attach_buffer(&mut self, name: impl Into<Name>, buffer: Buffer, initial: Access) {
        self.bind(
            name.into(),
            AttachmentSource::Buffer {
                buffer,
                initial,
            },
        );
    }

    /// Attach an image under `name`. Images with a null handle are allocated when the graph is executed, after
    /// their unknown properties are inferred. `initial` is the last access to the image before this graph.
    pub fn attach_image(&mut self, name: impl Into<Name>, attachment: ImageAttachment, initial: Access) {
        let kind = if attachment.is_allocated() {
            AttachmentKind::External
        } else {
            AttachmentKind::Internal
        };
        self.bind(
            name.into(),
            AttachmentSource::Image {
                attachment,
                kind,
                initial,
            },
        );
    }

    /// Attach an image under a temporary name and clear it. The cleared image is available as `name`.
    /// # Errors
    /// Fails if `name` was already produced in this graph.
    pub fn attach_and_clear_image(
        &mut self,
        name: impl Into<Name>,
        attachment: ImageAttachment,
        clear: Clear,
        initial: Access,
    ) -> Result<()> {
        let name = name.into();
        let uncleared = name.append("__uncleared");
        self.attach_image(uncleared.clone(), attachment, initial);
        self.clear_image(uncleared, name, clear)
    }

    /// Attach the value of a future under `name`. If the producing graph is compiled together with this one, the value
    /// is threaded through directly. Otherwise the producing graph must have been submitted already.
    pub fn attach_in(&mut self, name: impl Into<Name>, future: Future) {
        self.bind(name.into(), AttachmentSource::Future(future));
    }

    /// Attach multiple futures, see [`RenderGraph::attach_in()`].
    pub fn attach_in_many<N: Into<Name>>(&mut self, futures: impl IntoIterator<Item = (N, Future)>) {
        for (name, future) in futures {
            self.attach_in(name, future);
        }
    }

    /// Add an inference rule for the image bound to `name`. Rules are evaluated at execution to fill in unknown properties.
    /// See [`inference`](crate::graph::inference) for the built-in rules.
    pub fn inference_rule<F>(&mut self, name: impl Into<Name>, rule: F)
    where
        F: Fn(&InferenceContext, &mut ImageAttachment) -> Result<()> + 'static, {
        self.image_rules.push((name.into(), Box::new(rule)));
    }

    /// Add an inference rule for the buffer bound to `name`.
    pub fn buffer_inference_rule<F>(&mut self, name: impl Into<Name>, rule: F)
    where
        F: Fn(&InferenceContext, &mut Buffer) -> Result<()> + 'static, {
        self.buffer_rules.push((name.into(), Box::new(rule)));
    }

    /// Force `access` as the final access to `name`. The resource leaves the graph in the state required by `access`.
    /// # Errors
    /// Fails with [`Error::DuplicateRelease`] if `name` was already released.
    pub fn release(&mut self, name: impl Into<Name>, access: Access) -> Result<()> {
        self.push_release(name.into(), access, None)
    }

    /// Release `name` for presentation. The final access happens on the graphics domain.
    /// # Errors
    /// Fails with [`Error::DuplicateRelease`] if `name` was already released.
    pub fn release_for_present(&mut self, name: impl Into<Name>) -> Result<()> {
        self.push_release(name.into(), Access::Present, Some(Domain::Graphics))
    }

    fn push_release(&mut self, name: Name, access: Access, domain: Option<Domain>) -> Result<()> {
        if self.releases.iter().any(|release| release.name == name) {
            return Err(Error::DuplicateRelease(name.to_string()).into());
        }
        self.releases.push(Release {
            name,
            access,
            domain,
        });
        Ok(())
    }

    /// Get a future for the value of `name` after this graph. Requesting the same name twice returns the same future.
    pub fn future(&mut self, name: impl Into<Name>) -> Future {
        let name = name.into();
        if let Some(future) = self.futures.iter().find(|future| future.name() == &name) {
            return future.clone();
        }
        let future = Future::new(self.id, name);
        self.futures.push(future.clone());
        future
    }

    /// Get one future for every name that is bound or produced in this graph and never consumed or released by it,
    /// in declaration order.
    pub fn split(&mut self) -> Vec<Future> {
        let unconsumed = {
            let aliases = self
                .aliases
                .iter()
                .map(|(new, old)| (new, old))
                .collect::<HashMap<_, _>>();
            let mut consumed = HashSet::new();
            for pass in &self.passes {
                for resource in &pass.resources {
                    if resource.is_consuming() || pass.kind == PassKind::Converge || matches!(pass.kind, PassKind::Diverge(_)) {
                        consumed.insert(follow_alias(&aliases, &resource.name.name).clone());
                    }
                }
            }
            for release in &self.releases {
                consumed.insert(follow_alias(&aliases, &release.name).clone());
            }
            let mut seen = HashSet::new();
            self.declared
                .iter()
                .filter(|name| !consumed.contains(*name) && seen.insert((*name).clone()))
                .cloned()
                .collect::<Vec<_>>()
        };
        unconsumed.into_iter().map(|name| self.future(name)).collect()
    }
}

fn follow_alias<'a>(aliases: &HashMap<&'a Name, &'a Name>, name: &'a Name) -> &'a Name {
    let mut current = name;
    let mut visited = HashSet::new();
    while let Some(next) = aliases.get(current) {
        if !visited.insert(current) {
            break;
        }
        current = *next;
    }
    current
}
