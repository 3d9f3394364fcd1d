//! Execution of a linked render graph.
//!
//! An [`ExecutableRenderGraph`] is obtained from [`Compiler::link()`](crate::Compiler::link) and executed exactly once.
//! Executing binds swapchain images, infers missing attachment properties, allocates everything the graph owns, and
//! records every pass into command buffers. The result is a [`SubmitBundle`] that can be handed to the device queues with
//! [`submit_bundle()`](crate::sync::submit_batch::submit_bundle).

use std::sync::Arc;

use anyhow::{Context as _, Result};
use ash::vk;

use crate::allocator::traits::Allocator;
use crate::command_buffer::render_pass::{AttachmentDescription, RenderPassBegin, RenderPassDesc, RenderPassInfo};
use crate::command_buffer::traits::CommandRecorder;
use crate::command_buffer::{BoundResource, BoundValue, CommandBuffer};
use crate::core::context::Context;
use crate::graph::attachment::{AttachmentKind, SwapchainRef};
use crate::graph::chain::Binding;
use crate::graph::compiler::CompiledGraph;
use crate::graph::inference::Inference;
use crate::graph::pass::{EmptyPassExecutor, PassExecutor};
use crate::graph::synchronize::{BarrierHalf, BarrierRef};
use crate::sync::barrier::{Dependency, ImageBarrier, MemoryBarrier};
use crate::sync::domain::Domain;
use crate::sync::future::FutureValue;
use crate::sync::submit_batch::{SubmitBatch, SubmitBundle, SubmitInfo};
use crate::Error;

/// A compiled and linked render graph, ready to be executed once.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ExecutableRenderGraph {
    #[derivative(Debug = "ignore")]
    state: CompiledGraph,
}

impl ExecutableRenderGraph {
    pub(crate) fn new(state: CompiledGraph) -> Self {
        Self {
            state,
        }
    }

    /// Amount of passes that will be recorded.
    pub fn pass_count(&self) -> usize {
        self.state
            .passes
            .iter()
            .filter(|pass| !pass.kind.is_structural())
            .count()
    }

    /// Execute the graph: bind swapchain images, infer and allocate resources, and record all passes.
    /// `swapchains` gives the acquired image index for every swapchain attached to the graph.
    /// # Errors
    /// * Fails with [`Error::NoSwapchainImage`] if a used swapchain has no image index.
    /// * Fails with [`Error::InferenceFailed`] if attachment inference fails.
    /// * Fails with [`Error::AllocationFailed`] if the allocator could not provide a resource.
    /// * Fails if any pass executor fails.
    pub fn execute<A: Allocator>(mut self, ctx: &Context, allocator: &mut A, swapchains: &[(SwapchainRef, u32)]) -> Result<SubmitBundle> {
        self.bind_swapchains(swapchains)?;

        let state = &mut self.state;
        Inference {
            attachments: &mut state.attachments,
            buffers: &mut state.buffers,
            chains: &state.chains,
            names: &state.names,
            image_rules: &state.image_rules,
            buffer_rules: &state.buffer_rules,
            units: &state.units,
        }
        .run(state.options.inference_iterations)?;

        self.allocate(allocator)?;
        let begins = self.acquire_render_passes(ctx, allocator)?;

        let mut bundle = SubmitBundle::default();
        for d in 0..self.state.domains.len() {
            let domain = self.state.domains[d].domain;
            let mut batch = SubmitBatch {
                domain,
                submits: Vec::with_capacity(self.state.domains[d].submits.len()),
            };
            for s in 0..self.state.domains[d].submits.len() {
                let mut recorder = allocator.allocate_command_buffer(domain)?;
                let passes = self.state.domains[d].submits[s].passes.clone();
                for &pass in &passes {
                    self.record_pass(pass, domain, &begins, recorder.as_mut())?;
                }
                let command_buffer = recorder.finish()?;
                batch.submits.push(self.submit_info(d, s, command_buffer));
            }
            bundle.batches.push(batch);
        }

        self.resolve_futures()?;
        info!(
            "Executed frame {}: {} pass(es) in {} command buffer(s)",
            ctx.frame(),
            self.pass_count(),
            bundle.command_buffer_count()
        );
        Ok(bundle)
    }

    fn bind_swapchains(&mut self, swapchains: &[(SwapchainRef, u32)]) -> Result<()> {
        for info in &mut self.state.attachments {
            if self.state.chains[info.chain].is_unused() {
                continue;
            }
            let AttachmentKind::Swapchain(swapchain) = &info.kind else {
                continue;
            };
            let image = swapchains
                .iter()
                .find(|(candidate, _)| Arc::ptr_eq(candidate, swapchain))
                .and_then(|(_, index)| swapchain.images.get(*index as usize))
                .ok_or_else(|| Error::NoSwapchainImage(info.name.to_string()))?;
            let mut attachment = image.clone();
            if attachment.sample_count.is_none() {
                attachment.sample_count = Some(vk::SampleCountFlags::TYPE_1);
            }
            info.attachment = attachment;
        }
        Ok(())
    }

    fn allocate<A: Allocator>(&mut self, allocator: &mut A) -> Result<()> {
        let state = &mut self.state;
        for index in 0..state.attachments.len() {
            let chain = state.attachments[index].chain;
            if state.chains[chain].is_unused() {
                continue;
            }
            let usage = state.compute_usage(chain);
            let info = &mut state.attachments[index];
            if !matches!(info.kind, AttachmentKind::Internal) || info.attachment.is_allocated() {
                continue;
            }
            if info.attachment.usage.is_none() {
                info.attachment.usage = Some(usage);
            }
            let name = info.name.to_string();
            let allocated = allocator
                .allocate_image(&name, &info.attachment)
                .with_context(|| Error::AllocationFailed(name.clone()))?;
            #[cfg(feature = "log-objects")]
            trace!("Allocated image `{}`: {:?}", name, allocated.image);
            info.attachment = allocated;
        }

        for index in 0..state.buffers.len() {
            let chain = state.buffers[index].chain;
            if state.chains[chain].is_unused() {
                continue;
            }
            let usage = state.compute_buffer_usage(chain);
            let info = &mut state.buffers[index];
            if info.external || info.buffer.is_allocated() {
                continue;
            }
            let name = info.name.to_string();
            let allocated = allocator
                .allocate_buffer(&name, &info.buffer, usage)
                .with_context(|| Error::AllocationFailed(name.clone()))?;
            #[cfg(feature = "log-objects")]
            trace!("Allocated buffer `{}`: {:?}", name, allocated.buffer);
            info.buffer = allocated;
        }
        Ok(())
    }

    fn acquire_render_passes<A: Allocator>(&self, ctx: &Context, allocator: &mut A) -> Result<Vec<RenderPassBegin>> {
        let state = &self.state;
        let mut begins = Vec::with_capacity(state.units.len());
        for unit in &state.units {
            let mut desc = RenderPassDesc {
                attachments: Vec::with_capacity(unit.attachments.len()),
                subpasses: unit.subpasses.clone(),
                dependencies: unit.dependencies.clone(),
            };
            let mut image_views = Vec::with_capacity(unit.attachments.len());
            let mut extent = None;
            let mut layers = u32::MAX;
            for attachment in &unit.attachments {
                let Binding::Image(index) = state.chains[attachment.chain].binding else {
                    return Err(Error::WrongResourceType(state.chains[attachment.chain].root.to_string()).into());
                };
                let image = &state.attachments[index].attachment;
                desc.attachments.push(AttachmentDescription {
                    format: image.format.unwrap_or(vk::Format::UNDEFINED),
                    samples: image.sample_count.unwrap_or(vk::SampleCountFlags::TYPE_1),
                    load_op: attachment.load_op,
                    store_op: attachment.store_op,
                    initial_layout: attachment.initial_layout,
                    final_layout: attachment.final_layout,
                });
                image_views.push(image.image_view);
                extent = extent.or(image.extent);
                layers = layers.min(image.layer_count);
            }
            let extent = extent.unwrap_or_default();
            let render_pass = ctx.acquire_render_pass(allocator, &desc)?;
            begins.push(RenderPassBegin {
                render_pass,
                desc,
                image_views,
                extent: vk::Extent2D {
                    width: extent.width,
                    height: extent.height,
                },
                layers,
            });
        }
        Ok(begins)
    }

    fn dependency(&self, barriers: &[BarrierRef]) -> Dependency {
        let state = &self.state;
        let mut dependency = Dependency::default();
        for barrier in barriers {
            let chain = &state.chains[barrier.chain];
            let transition = &chain.links[barrier.link].transitions[barrier.transition];
            let none = (vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE);
            let src = (transition.src.stages, transition.src.access);
            let dst = (transition.dst.stages, transition.dst.access);
            let ((src_stages, src_access), (dst_stages, dst_access), domains) = match barrier.half {
                BarrierHalf::Full => (src, dst, (None, None)),
                BarrierHalf::Release => (src, none, (transition.src_domain, Some(transition.dst_domain))),
                BarrierHalf::Acquire => (none, dst, (transition.src_domain, Some(transition.dst_domain))),
            };
            match chain.binding {
                Binding::Buffer(_) => dependency.memory_barriers.push(MemoryBarrier {
                    src_stages,
                    src_access,
                    dst_stages,
                    dst_access,
                }),
                Binding::Image(index) => {
                    let image = &state.attachments[index].attachment;
                    let subrange = transition.subrange.unwrap_or_default();
                    if subrange.base_level >= image.level_count || subrange.base_layer >= image.layer_count {
                        continue;
                    }
                    dependency.image_barriers.push(ImageBarrier {
                        image: image.image,
                        subresource_range: subrange.to_vk(image.aspect()),
                        src_stages,
                        src_access,
                        dst_stages,
                        dst_access,
                        old_layout: transition.src.layout,
                        new_layout: transition.dst.layout,
                        src_domain: domains.0,
                        dst_domain: domains.1,
                    });
                }
            }
        }
        dependency
    }

    fn record_barriers(&self, barriers: &[BarrierRef], recorder: &mut dyn CommandRecorder) -> Result<()> {
        let dependency = self.dependency(barriers);
        if dependency.is_empty() {
            return Ok(());
        }
        recorder.pipeline_barrier(&dependency)
    }

    fn bound_resources(&self, pass: usize) -> Vec<BoundResource<'_>> {
        let state = &self.state;
        state.passes[pass]
            .resources
            .iter()
            .enumerate()
            .filter_map(|(r, resource)| {
                let chain = &state.chains[resource.reference?];
                let link = chain.links.iter().find(|link| link.pass == pass && link.resource == r);
                let value = match chain.binding {
                    Binding::Image(index) => BoundValue::Image(&state.attachments[index].attachment),
                    Binding::Buffer(index) => BoundValue::Buffer(&state.buffers[index].buffer),
                };
                Some(BoundResource {
                    name: &resource.original_name,
                    out_name: resource.out_name.as_ref().map(|out| &out.name),
                    value,
                    layout: link.map_or(vk::ImageLayout::UNDEFINED, |link| link.layout),
                    subrange: link.and_then(|link| link.subrange),
                    general: resource.promoted_to_general,
                })
            })
            .collect()
    }

    fn record_pass(&mut self, pass: usize, domain: Domain, begins: &[RenderPassBegin], recorder: &mut dyn CommandRecorder) -> Result<()> {
        let mut executor = std::mem::replace(&mut self.state.passes[pass].executor, EmptyPassExecutor::new_boxed());
        let scheduled = &self.state.scheduled[pass];
        let unit = scheduled.render_unit.map(|unit| (unit, &self.state.units[unit]));

        if scheduled.subpass == 0 {
            self.record_barriers(&scheduled.pre_barriers, recorder)?;
        }
        let render_pass = match unit {
            Some((index, _)) => {
                let begin = &begins[index];
                if scheduled.subpass == 0 {
                    recorder.begin_render_pass(begin)?;
                } else {
                    recorder.next_subpass()?;
                }
                Some(RenderPassInfo {
                    render_pass: begin.render_pass,
                    subpass: scheduled.subpass,
                    extent: begin.extent,
                })
            }
            None => None,
        };

        let info = &self.state.passes[pass];
        #[cfg(feature = "debug-markers")]
        recorder.begin_label(info.name.as_str(), info.color.unwrap_or([1.0; 4]))?;
        {
            let mut cmd = CommandBuffer::new(&info.name, domain, self.bound_resources(pass), render_pass, &mut *recorder);
            executor.record(&mut cmd)?;
        }
        #[cfg(feature = "debug-markers")]
        recorder.end_label()?;

        match unit {
            // Barriers cannot be recorded inside the render pass, so releases of the whole unit happen at its end.
            Some((_, unit)) if unit.passes.last() == Some(&pass) => {
                recorder.end_render_pass()?;
                for &member in &unit.passes {
                    self.record_barriers(&self.state.scheduled[member].post_barriers, recorder)?;
                }
            }
            Some(_) => {}
            None => self.record_barriers(&scheduled.post_barriers, recorder)?,
        }
        Ok(())
    }

    fn submit_info(&self, domain: usize, submit: usize, command_buffer: vk::CommandBuffer) -> SubmitInfo {
        let state = &self.state;
        let plan = &state.domains[domain].submits[submit];
        let mut info = SubmitInfo {
            command_buffers: vec![command_buffer],
            relative_waits: plan.relative_waits.clone(),
            absolute_waits: plan.absolute_waits.clone(),
            signal: plan.signal,
            future_signals: vec![],
            used_swapchains: vec![],
        };
        for &pass in &plan.passes {
            for &signal in &state.scheduled[pass].future_signals {
                info.future_signals.push(state.future_signals[signal].future.clone());
            }
            for resource in &state.passes[pass].resources {
                let Some(Binding::Image(index)) = resource.reference.map(|chain| state.chains[chain].binding) else {
                    continue;
                };
                if let AttachmentKind::Swapchain(swapchain) = &state.attachments[index].kind {
                    if !info.used_swapchains.iter().any(|used| Arc::ptr_eq(used, swapchain)) {
                        info.used_swapchains.push(swapchain.clone());
                    }
                }
            }
        }
        info
    }

    fn resolve_futures(&self) -> Result<()> {
        let state = &self.state;
        for signal in &state.future_signals {
            let Some(chain) = signal.chain else {
                continue;
            };
            let chain = &state.chains[chain];
            let (value, initial, initial_domain, wait) = match chain.binding {
                Binding::Image(index) => {
                    let info = &state.attachments[index];
                    (FutureValue::Image(info.attachment.clone()), info.initial, info.initial_domain, info.wait)
                }
                Binding::Buffer(index) => {
                    let info = &state.buffers[index];
                    (FutureValue::Buffer(info.buffer.clone()), info.initial, info.initial_domain, info.wait)
                }
            };
            match chain.links.last() {
                Some(link) => {
                    signal
                        .future
                        .set_executed(value, link.resource_use(), Some(state.scheduled[link.pass].domain))?;
                }
                None => {
                    signal.future.set_executed(value, initial, initial_domain)?;
                    match wait {
                        Some((domain, value)) => signal.future.set_submitted(domain, value)?,
                        None => signal.future.mark_host_available()?,
                    }
                }
            }
        }
        Ok(())
    }
}
