use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use ash::vk::Handle;
use deimos::prelude::*;
use deimos::sync::submit_batch::SemaphoreWait;

use framework::{Command, MockAllocator, MockQueues};

mod framework;

fn draw_graph(ctx: &Context) -> Result<RenderGraph> {
    let mut graph = RenderGraph::new(ctx, "main");
    graph.attach_image("color", framework::color_target(64, 64), Access::None);
    graph.add_pass(
        PassBuilder::new("draw")
            .image_into("color", Access::ColorWrite, "drawn")
            .execute_fn(|cmd| {
                let render_pass = cmd.render_pass().expect("draw pass is not in a render pass");
                assert_eq!(render_pass.subpass, 0);
                assert_eq!(render_pass.extent.width, 64);
                cmd.draw(3, 1, 0, 0)
            })
            .build(),
    )?;
    graph.release("drawn", Access::FragmentSampled)?;
    Ok(graph)
}

#[test]
pub fn execute_render_pass() -> Result<()> {
    framework::init_logging();
    let ctx = Context::new();
    let mut compiler = framework::compile(vec![draw_graph(&ctx)?])?;
    let mut allocator = MockAllocator::new();
    let bundle = compiler.link()?.execute(&ctx, &mut allocator, &[])?;

    assert_eq!(allocator.images.len(), 1);
    let color = allocator.image("main::color").unwrap().clone();
    assert!(color.is_allocated());
    assert_eq!(color.usage, Some(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED));

    assert_eq!(allocator.render_passes.len(), 1);
    let desc = &allocator.render_passes[0];
    assert_eq!(desc.attachments[0].format, vk::Format::R8G8B8A8_UNORM);
    assert_eq!(desc.attachments[0].load_op, vk::AttachmentLoadOp::DONT_CARE);
    assert_eq!(desc.attachments[0].store_op, vk::AttachmentStoreOp::STORE);
    assert_eq!(ctx.render_pass_count()?, 1);

    assert_eq!(bundle.batches.len(), 1);
    assert_eq!(bundle.batches[0].domain, Domain::Graphics);
    assert_eq!(bundle.command_buffer_count(), 1);

    let commands = allocator.commands(Domain::Graphics);
    assert_eq!(commands.len(), 4);
    assert!(matches!(
        &commands[0],
        Command::BeginRenderPass { image_views, subpasses: 1, .. } if image_views == &vec![color.image_view]
    ));
    assert!(matches!(commands[1], Command::Draw));
    assert!(matches!(commands[2], Command::EndRenderPass));
    let Command::Barrier(dependency) = &commands[3] else {
        panic!("expected a barrier after the render pass, got {:?}", commands[3]);
    };
    assert_eq!(dependency.image_barriers.len(), 1);
    let barrier = dependency.image_barriers[0];
    assert_eq!(barrier.image, color.image);
    assert_eq!(barrier.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(barrier.src_domain, None);
    Ok(())
}

#[cfg(feature = "debug-markers")]
#[test]
pub fn passes_are_labelled() -> Result<()> {
    let ctx = Context::new();
    let mut compiler = framework::compile(vec![draw_graph(&ctx)?])?;
    let mut allocator = MockAllocator::new();
    compiler.link()?.execute(&ctx, &mut allocator, &[])?;

    let labels = allocator
        .recordings()
        .into_iter()
        .flat_map(|recording| recording.commands)
        .filter_map(|command| match command {
            Command::BeginLabel(name) => Some(name),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(labels, vec!["draw", "release drawn"]);
    Ok(())
}

#[test]
pub fn render_passes_are_cached() -> Result<()> {
    let ctx = Context::new();
    let mut allocator = MockAllocator::new();
    for _ in 0..2 {
        let mut compiler = framework::compile(vec![draw_graph(&ctx)?])?;
        compiler.link()?.execute(&ctx, &mut allocator, &[])?;
    }
    assert_eq!(allocator.render_passes.len(), 1);

    for _ in 0..deimos::core::context::RENDER_PASS_TTL - 1 {
        ctx.next_frame(&mut allocator)?;
    }
    assert!(allocator.destroyed.is_empty());
    assert_eq!(ctx.next_frame(&mut allocator)?, deimos::core::context::RENDER_PASS_TTL);
    assert_eq!(allocator.destroyed.len(), 1);
    assert_eq!(ctx.render_pass_count()?, 0);
    Ok(())
}

fn swapchain() -> SwapchainRef {
    let images = (0..2)
        .map(|i| {
            ImageAttachment::from_image(
                vk::Image::from_raw(100 + i),
                vk::ImageView::from_raw(200 + i),
                vk::Extent3D {
                    width: 800,
                    height: 600,
                    depth: 1,
                },
                vk::Format::B8G8R8A8_SRGB,
            )
        })
        .collect();
    Arc::new(Swapchain {
        handle: vk::SwapchainKHR::from_raw(7),
        images,
    })
}

fn present_graph(ctx: &Context, swapchain: SwapchainRef) -> Result<RenderGraph> {
    let mut graph = RenderGraph::new(ctx, "main");
    graph.attach_swapchain("swapchain", swapchain);
    graph.add_pass(
        PassBuilder::new("draw")
            .image_into("swapchain", Access::ColorWrite, "drawn")
            .execute_fn(|cmd| cmd.draw(3, 1, 0, 0))
            .build(),
    )?;
    graph.release_for_present("drawn")?;
    Ok(graph)
}

#[test]
pub fn swapchain_image_required() -> Result<()> {
    let ctx = Context::new();
    let swapchain = swapchain();
    let mut compiler = framework::compile(vec![present_graph(&ctx, swapchain)?])?;
    let mut allocator = MockAllocator::new();
    let err = compiler.link()?.execute(&ctx, &mut allocator, &[]).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoSwapchainImage(name)) if name == "main::swapchain"));
    Ok(())
}

#[test]
pub fn present_to_swapchain() -> Result<()> {
    let ctx = Context::new();
    let swapchain = swapchain();
    let mut compiler = framework::compile(vec![present_graph(&ctx, swapchain.clone())?])?;
    let mut allocator = MockAllocator::new();
    let bundle = compiler
        .link()?
        .execute(&ctx, &mut allocator, &[(swapchain.clone(), 1)])?;

    // Swapchain images are never allocated.
    assert!(allocator.images.is_empty());
    assert_eq!(allocator.render_passes[0].attachments[0].store_op, vk::AttachmentStoreOp::STORE);
    let commands = allocator.commands(Domain::Graphics);
    assert!(matches!(
        &commands[0],
        Command::BeginRenderPass { image_views, extent, .. }
            if image_views == &vec![vk::ImageView::from_raw(201)] && extent.width == 800 && extent.height == 600
    ));
    let barriers = allocator.barriers(Domain::Graphics);
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].image_barriers[0].image, vk::Image::from_raw(101));
    assert_eq!(barriers[0].image_barriers[0].new_layout, vk::ImageLayout::PRESENT_SRC_KHR);

    let submit = &bundle.batches[0].submits[0];
    assert_eq!(submit.used_swapchains.len(), 1);
    assert!(Arc::ptr_eq(&submit.used_swapchains[0], &swapchain));

    let mut queues = MockQueues::default();
    submit_bundle(&mut queues, bundle)?;
    assert_eq!(queues.submissions.len(), 1);
    assert_eq!(queues.submissions[0].swapchains, 1);
    assert!(queues.submissions[0].waits.is_empty());
    Ok(())
}

#[test]
pub fn inference_rules() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_image("color", framework::color_target(1920, 1080), Access::None);
    graph.attach_image(
        "bloom",
        ImageAttachment::new()
            .with_format(vk::Format::R16G16B16A16_SFLOAT)
            .with_samples(vk::SampleCountFlags::TYPE_1),
        Access::None,
    );
    graph.inference_rule("bloom", inference::same_extent_as("color"));
    graph.add_pass(
        PassBuilder::new("draw")
            .image_into("color", Access::ColorWrite, "lit")
            .build(),
    )?;
    graph.add_pass(
        PassBuilder::new("bloom")
            .image("lit", Access::ComputeSampled)
            .image_into("bloom", Access::ComputeWrite, "bloomed")
            .build(),
    )?;

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    compiler.link()?.execute(&ctx, &mut allocator, &[])?;

    let bloom = allocator.image("main::bloom").unwrap();
    assert_eq!(
        bloom.extent,
        Some(vk::Extent3D {
            width: 1920,
            height: 1080,
            depth: 1,
        })
    );
    assert_eq!(bloom.format, Some(vk::Format::R16G16B16A16_SFLOAT));
    assert_eq!(bloom.usage, Some(vk::ImageUsageFlags::STORAGE));
    Ok(())
}

#[test]
pub fn inference_conflict() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_image("color", framework::color_target(1920, 1080), Access::None);
    graph.attach_image("small", framework::color_target(10, 10), Access::None);
    graph.inference_rule("small", inference::same_extent_as("color"));
    graph.add_pass(
        PassBuilder::new("write")
            .image("color", Access::ComputeWrite)
            .image("small", Access::ComputeWrite)
            .build(),
    )?;

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    let err = compiler.link()?.execute(&ctx, &mut allocator, &[]).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InferenceFailed(_))));
    assert!(allocator.images.is_empty());
    Ok(())
}

#[test]
pub fn inference_incomplete() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_image("unknown", ImageAttachment::new(), Access::None);
    graph.add_pass(PassBuilder::new("write").image("unknown", Access::ComputeWrite).build())?;

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    let err = compiler.link()?.execute(&ctx, &mut allocator, &[]).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InferenceFailed(message)) if message.contains("main::unknown")));
    Ok(())
}

#[test]
pub fn unused_resources_are_not_allocated() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_image("unknown", ImageAttachment::new(), Access::None);
    graph.attach_buffer("scratch", Buffer::inferred(), Access::None);
    graph.attach_buffer("data", Buffer::new(128), Access::None);
    graph.add_pass(
        PassBuilder::new("fill")
            .on(Domain::Transfer)
            .buffer("data", Access::TransferWrite)
            .build(),
    )?;

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    compiler.link()?.execute(&ctx, &mut allocator, &[])?;
    assert!(allocator.images.is_empty());
    assert_eq!(allocator.buffers.len(), 1);
    let (name, buffer, usage) = &allocator.buffers[0];
    assert_eq!(name, "main::data");
    assert_eq!(buffer.size, Some(128));
    assert_eq!(*usage, vk::BufferUsageFlags::TRANSFER_DST);
    Ok(())
}

#[test]
pub fn framebuffer_properties_are_shared() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_image("color", framework::color_target(320, 240), Access::None);
    graph.attach_image("depth", ImageAttachment::new().with_format(vk::Format::D32_SFLOAT), Access::None);
    graph.add_pass(
        PassBuilder::new("draw")
            .image_into("color", Access::ColorWrite, "color_done")
            .image_into("depth", Access::DepthStencilRW, "depth_done")
            .build(),
    )?;

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    compiler.link()?.execute(&ctx, &mut allocator, &[])?;

    let depth = allocator.image("main::depth").unwrap();
    assert_eq!(
        depth.extent,
        Some(vk::Extent3D {
            width: 320,
            height: 240,
            depth: 1,
        })
    );
    assert_eq!(depth.sample_count, Some(vk::SampleCountFlags::TYPE_1));
    assert_eq!(depth.usage, Some(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
    let desc = &allocator.render_passes[0];
    assert_eq!(desc.attachments[1].format, vk::Format::D32_SFLOAT);
    assert_eq!(desc.subpasses[0].depth_stencil_attachment.map(|reference| reference.attachment), Some(1));
    Ok(())
}

#[test]
pub fn allocation_failure() -> Result<()> {
    let ctx = Context::new();
    let mut compiler = framework::compile(vec![draw_graph(&ctx)?])?;
    let mut allocator = MockAllocator::new();
    allocator.fail_on = Some("main::color".into());
    let err = compiler.link()?.execute(&ctx, &mut allocator, &[]).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::AllocationFailed(name)) if name == "main::color"));
    Ok(())
}

#[test]
pub fn executor_sees_declared_resources() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_image("input", framework::color_target(32, 32), Access::None);
    graph.attach_image("output", framework::color_target(32, 32), Access::None);
    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    graph.add_pass(
        PassBuilder::new("blur")
            .on(Domain::Compute)
            .image("input", Access::ComputeSampled)
            .image_into("output", Access::ComputeWrite, "blurred")
            .execute_fn(move |cmd| {
                assert_eq!(cmd.pass_name().as_str(), "blur");
                assert_eq!(cmd.domain(), Domain::Compute);
                assert!(cmd.render_pass().is_none());
                assert_eq!(cmd.layout("input")?, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
                assert_eq!(cmd.layout("blurred")?, vk::ImageLayout::GENERAL);
                assert!(!cmd.is_general_layout("input")?);
                assert!(cmd.image("output")?.is_allocated());
                assert!(cmd.buffer("input").is_err());
                let err = cmd.image("undeclared").unwrap_err();
                assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UndeclaredResource { .. })));
                flag.store(true, Ordering::SeqCst);
                cmd.dispatch(4, 4, 1)
            })
            .build(),
    )?;

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    let bundle = compiler.link()?.execute(&ctx, &mut allocator, &[])?;
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(bundle.batches[0].domain, Domain::Compute);
    // Both images are accessed once, so nothing is synchronized.
    let commands = allocator.commands(Domain::Compute);
    assert_eq!(commands.len(), 1);
    assert!(matches!(commands[0], Command::Dispatch));
    Ok(())
}

#[test]
pub fn executor_errors_propagate() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_buffer("data", Buffer::new(16), Access::None);
    graph.add_pass(
        PassBuilder::new("broken")
            .buffer("data", Access::TransferWrite)
            .execute_fn(|cmd| {
                cmd.copy_buffer("data", "missing", 16)?;
                Ok(())
            })
            .build(),
    )?;

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    let err = compiler.link()?.execute(&ctx, &mut allocator, &[]).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UndeclaredResource { pass, name }) if pass == "broken" && name == "missing"));
    Ok(())
}

#[test]
pub fn clear_pass() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_and_clear_image("target", framework::color_target(16, 16), Clear::Color([1.0, 0.0, 0.0, 1.0]), Access::None)?;
    graph.release("target", Access::TransferRead)?;

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    compiler.link()?.execute(&ctx, &mut allocator, &[])?;

    let image = allocator.image("main::target__uncleared").unwrap().clone();
    assert_eq!(image.usage, Some(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC));
    let commands = allocator.commands(Domain::Graphics);
    assert_eq!(commands.len(), 3);
    assert!(matches!(commands[0], Command::Barrier(_)));
    assert!(matches!(
        commands[1],
        Command::ClearImage { image: cleared, layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL, .. } if cleared == image.image
    ));
    let Command::Barrier(dependency) = &commands[2] else {
        panic!("expected a barrier after the clear, got {:?}", commands[2]);
    };
    assert_eq!(dependency.image_barriers[0].old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(dependency.image_barriers[0].new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    Ok(())
}

#[test]
pub fn resolve_pass() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_image(
        "ms",
        framework::color_target(64, 64).with_samples(vk::SampleCountFlags::TYPE_4),
        Access::None,
    );
    graph.attach_image("single", framework::color_target(64, 64), Access::None);
    graph.add_pass(
        PassBuilder::new("draw")
            .image_into("ms", Access::ColorWrite, "ms_drawn")
            .build(),
    )?;
    graph.resolve_resource_into("single", "resolved", "ms_drawn")?;
    graph.release("resolved", Access::FragmentSampled)?;

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    compiler.link()?.execute(&ctx, &mut allocator, &[])?;

    assert_eq!(allocator.render_passes[0].attachments[0].samples, vk::SampleCountFlags::TYPE_4);
    let commands = allocator.commands(Domain::Graphics);
    assert!(commands.iter().any(|command| matches!(
        command,
        Command::ResolveImage {
            src_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        }
    )));
    // Both images are transitioned by a single barrier command before the resolve.
    let barriers = allocator.barriers(Domain::Graphics);
    assert_eq!(barriers[0].image_barriers.len(), 2);
    Ok(())
}

#[test]
pub fn diverged_barrier_range() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_image("pyramid", framework::color_target(64, 64).with_levels_and_layers(4, 1), Access::None);
    graph.diverge_image("pyramid", Subrange::level(1), "mip1")?;
    graph.add_pass(
        PassBuilder::new("downsample")
            .image_into("mip1", Access::ComputeWrite, "mip1_done")
            .execute_fn(|cmd| {
                assert_eq!(cmd.subrange("mip1")?, Subrange::level(1));
                cmd.dispatch(32, 32, 1)
            })
            .build(),
    )?;
    graph.converge_image_explicit(vec!["mip1_done".into()], "pyramid_done")?;
    graph.release("pyramid_done", Access::TransferRead)?;

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    compiler.link()?.execute(&ctx, &mut allocator, &[])?;

    assert_eq!(allocator.image("main::pyramid").unwrap().level_count, 4);
    let barriers = allocator.barriers(Domain::Graphics);
    let range = barriers[0].image_barriers[0].subresource_range;
    assert_eq!(range.base_mip_level, 1);
    assert_eq!(range.level_count, 1);
    assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
    Ok(())
}

#[test]
pub fn converge_transitions_remainder() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_image("img", framework::color_target(16, 16).with_levels_and_layers(2, 1), Access::None);
    graph.diverge_image("img", Subrange::level(1), "m1")?;
    graph.add_pass(
        PassBuilder::new("downsample")
            .image_into("m1", Access::ComputeWrite, "m1_done")
            .execute_fn(|cmd| cmd.dispatch(8, 8, 1))
            .build(),
    )?;
    graph.converge_image_explicit(vec!["m1_done".into()], "whole")?;
    graph.add_pass(
        PassBuilder::new("read")
            .image("whole", Access::ComputeSampled)
            .execute_fn(|cmd| cmd.dispatch(16, 16, 1))
            .build(),
    )?;

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    compiler.link()?.execute(&ctx, &mut allocator, &[])?;

    let barriers = allocator.barriers(Domain::Graphics);
    assert_eq!(barriers.len(), 2);
    // Levels past the end of the image are not recorded.
    let before_read = &barriers[1].image_barriers;
    assert_eq!(before_read.len(), 2);
    let written = before_read[0];
    assert_eq!(written.subresource_range.base_mip_level, 1);
    assert_eq!(written.old_layout, vk::ImageLayout::GENERAL);
    let rest = before_read[1];
    assert_eq!(rest.subresource_range.base_mip_level, 0);
    assert_eq!(rest.subresource_range.level_count, 1);
    assert_eq!(rest.old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(rest.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    Ok(())
}

#[test]
pub fn cross_domain_buffer_barrier() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_buffer("b", Buffer::new(256), Access::None);
    graph.add_pass(
        PassBuilder::new("simulate")
            .on(Domain::Compute)
            .buffer_into("b", Access::ComputeWrite, "simulated")
            .execute_fn(|cmd| cmd.dispatch(1, 1, 1))
            .build(),
    )?;
    graph.add_pass(
        PassBuilder::new("consume")
            .on(Domain::Graphics)
            .buffer("simulated", Access::VertexRead)
            .build(),
    )?;

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    let bundle = compiler.link()?.execute(&ctx, &mut allocator, &[])?;
    assert_eq!(bundle.batches.len(), 2);

    assert!(allocator.barriers(Domain::Compute).is_empty());
    let graphics = allocator.barriers(Domain::Graphics);
    assert_eq!(graphics.len(), 1);
    assert_eq!(graphics[0].memory_barriers.len(), 1);
    let barrier = graphics[0].memory_barriers[0];
    assert_eq!(barrier.src_access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
    assert_eq!(barrier.dst_stages, vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT);
    Ok(())
}

fn cross_domain_graph(ctx: &Context) -> Result<RenderGraph> {
    let mut graph = RenderGraph::new(ctx, "main");
    graph.attach_image("img", framework::color_target(32, 32), Access::None);
    graph.add_pass(
        PassBuilder::new("generate")
            .on(Domain::Compute)
            .image_into("img", Access::ComputeWrite, "generated")
            .execute_fn(|cmd| cmd.dispatch(4, 4, 1))
            .build(),
    )?;
    graph.add_pass(
        PassBuilder::new("sample")
            .on(Domain::Graphics)
            .image("generated", Access::FragmentSampled)
            .build(),
    )?;
    Ok(graph)
}

#[test]
pub fn queue_ownership_transfer() -> Result<()> {
    let ctx = Context::new();
    let mut compiler = framework::compile(vec![cross_domain_graph(&ctx)?])?;
    let mut allocator = MockAllocator::new();
    let bundle = compiler.link()?.execute(&ctx, &mut allocator, &[])?;
    assert_eq!(bundle.batches.len(), 2);

    let compute = allocator.commands(Domain::Compute);
    assert_eq!(compute.len(), 3);
    assert!(matches!(compute[1], Command::Dispatch));
    let Command::Barrier(release) = &compute[2] else {
        panic!("expected a release barrier, got {:?}", compute[2]);
    };
    let release = release.image_barriers[0];
    assert_eq!(release.src_domain, Some(Domain::Compute));
    assert_eq!(release.dst_domain, Some(Domain::Graphics));
    assert_eq!(release.dst_stages, vk::PipelineStageFlags2::NONE);
    assert_eq!(release.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    let graphics = allocator.barriers(Domain::Graphics);
    assert_eq!(graphics.len(), 1);
    let acquire = graphics[0].image_barriers[0];
    assert_eq!(acquire.src_stages, vk::PipelineStageFlags2::NONE);
    assert_eq!(acquire.dst_stages, vk::PipelineStageFlags2::FRAGMENT_SHADER);
    assert_eq!(acquire.old_layout, vk::ImageLayout::GENERAL);
    assert_eq!(acquire.src_domain, Some(Domain::Compute));
    Ok(())
}

#[test]
pub fn submit_resolves_relative_waits() -> Result<()> {
    let ctx = Context::new();
    let mut compiler = framework::compile(vec![cross_domain_graph(&ctx)?])?;
    let mut allocator = MockAllocator::new();
    let bundle = compiler.link()?.execute(&ctx, &mut allocator, &[])?;

    let mut queues = MockQueues::default();
    queues.timelines[Domain::Compute.index()] = 41;
    submit_bundle(&mut queues, bundle)?;

    assert_eq!(queues.submissions.len(), 2);
    let graphics = &queues.submissions[0];
    assert_eq!(graphics.domain, Domain::Graphics);
    assert_eq!(graphics.signal, None);
    assert_eq!(
        graphics.waits,
        vec![SemaphoreWait {
            domain: Domain::Compute,
            value: 42,
            stages: vk::PipelineStageFlags2::ALL_COMMANDS,
        }]
    );
    let compute = &queues.submissions[1];
    assert_eq!(compute.domain, Domain::Compute);
    assert_eq!(compute.signal, Some(42));
    assert_eq!(queues.timelines[Domain::Compute.index()], 42);
    Ok(())
}

#[test]
pub fn future_across_submissions() -> Result<()> {
    framework::init_logging();
    let ctx = Context::new();
    let mut allocator = MockAllocator::new();
    let mut queues = MockQueues::default();

    let mut producer = RenderGraph::new(&ctx, "producer");
    producer.attach_buffer("data", Buffer::new(64), Access::None);
    producer.add_pass(
        PassBuilder::new("fill")
            .on(Domain::Transfer)
            .buffer_into("data", Access::TransferWrite, "filled")
            .build(),
    )?;
    let filled = producer.future("filled");

    let mut compiler = framework::compile(vec![producer])?;
    let bundle = compiler.link()?.execute(&ctx, &mut allocator, &[])?;
    assert_eq!(filled.status()?, FutureStatus::Executed);
    let Some(FutureValue::Buffer(buffer)) = filled.result()? else {
        panic!("future did not resolve to a buffer");
    };
    assert!(buffer.is_allocated());
    let submit = &bundle.batch(Domain::Transfer).unwrap().submits[0];
    assert!(submit.signal);
    assert_eq!(submit.future_signals.len(), 1);

    submit_bundle(&mut queues, bundle)?;
    assert_eq!(
        filled.status()?,
        FutureStatus::Submitted {
            domain: Domain::Transfer,
            value: 1,
        }
    );
    assert_eq!(filled.wait_value()?, Some((Domain::Transfer, 1)));

    let mut consumer = RenderGraph::new(&ctx, "consumer");
    consumer.attach_in("input", filled.clone());
    consumer.add_pass(
        PassBuilder::new("read")
            .on(Domain::Compute)
            .buffer("input", Access::ComputeRead)
            .execute_fn(move |cmd| {
                assert_eq!(cmd.buffer("input")?.buffer, buffer.buffer);
                cmd.dispatch(1, 1, 1)
            })
            .build(),
    )?;

    let mut compiler = framework::compile(vec![consumer])?;
    assert_eq!(compiler.get_scheduled_passes()?[0].absolute_waits, vec![(Domain::Transfer, 1)]);
    let bound = &compiler.get_bound_buffers()?[0];
    assert!(bound.external);
    assert!(bound.future.as_ref().unwrap().same_as(&filled));

    let bundle = compiler.link()?.execute(&ctx, &mut allocator, &[])?;
    // The producer's buffer is reused.
    assert_eq!(allocator.buffers.len(), 1);
    assert_eq!(bundle.batches[0].submits[0].absolute_waits, vec![(Domain::Transfer, 1)]);
    let barriers = allocator.barriers(Domain::Compute);
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].memory_barriers.len(), 1);
    assert_eq!(barriers[0].memory_barriers[0].src_access, vk::AccessFlags2::TRANSFER_WRITE);

    submit_bundle(&mut queues, bundle)?;
    let consume = queues.submissions.last().unwrap();
    assert_eq!(consume.domain, Domain::Compute);
    assert_eq!(consume.waits[0].domain, Domain::Transfer);
    assert_eq!(consume.waits[0].value, 1);
    Ok(())
}

#[test]
pub fn unused_future_is_host_available() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_buffer("idle", Buffer::new(16), Access::None);
    let idle = graph.future("idle");

    let mut compiler = framework::compile(vec![graph])?;
    let mut allocator = MockAllocator::new();
    let bundle = compiler.link()?.execute(&ctx, &mut allocator, &[])?;
    assert!(bundle.batches.is_empty());
    assert_eq!(idle.status()?, FutureStatus::HostAvailable);
    assert_eq!(idle.result()?, Some(FutureValue::Buffer(Buffer::new(16))));
    Ok(())
}
