use anyhow::Result;
use deimos::graph::pass::PassKind;
use deimos::prelude::*;

mod framework;

#[test]
pub fn pass_builder() -> Result<()> {
    let pass = PassBuilder::new("shade")
        .on(Domain::Compute)
        .image("input", Access::ComputeSampled)
        .buffer_into("params", Access::ComputeRW, "params_done")
        .build();
    assert_eq!(pass.name().as_str(), "shade");
    assert_eq!(pass.domain(), Some(Domain::Compute));
    assert_eq!(*pass.kind(), PassKind::User);
    assert_eq!(pass.resources().len(), 2);
    assert_eq!(pass.resources()[1].out_name, Some(QualifiedName::unqualified("params_done")));
    assert!(!pass.has_framebuffer_attachments());
    Ok(())
}

#[test]
pub fn duplicate_output() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.add_pass(
        PassBuilder::new("first")
            .image_into("a", Access::ColorWrite, "out")
            .build(),
    )?;
    let err = graph
        .add_pass(
            PassBuilder::new("second")
                .image_into("b", Access::ColorWrite, "out")
                .build(),
        )
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DuplicateOutput(name)) if name == "out"));
    // The rejected pass is not added.
    assert_eq!(graph.pass_count(), 1);

    let err = graph
        .add_pass(
            PassBuilder::new("third")
                .image_into("c", Access::ComputeWrite, "twice")
                .image_into("d", Access::ComputeWrite, "twice")
                .build(),
        )
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DuplicateOutput(_))));
    Ok(())
}

#[test]
pub fn duplicate_release() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.release("image", Access::FragmentSampled)?;
    let err = graph.release_for_present("image").unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::DuplicateRelease(name)) if name == "image"));
    Ok(())
}

#[test]
pub fn graph_ids_are_unique() -> Result<()> {
    let ctx = Context::new();
    let first = RenderGraph::new(&ctx, "main");
    let second = RenderGraph::new(&ctx, "main");
    assert_ne!(first.id(), second.id());
    assert_eq!(first.name(), second.name());
    Ok(())
}

#[test]
pub fn attach_and_clear_inserts_pass() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_and_clear_image("color", framework::color_target(4, 4), Clear::Color([0.0; 4]), Access::None)?;
    assert_eq!(graph.pass_count(), 1);

    let compiler = framework::compile(vec![graph])?;
    let passes = compiler.get_passes()?;
    assert!(matches!(passes[0].kind(), PassKind::Clear(Clear::Color(_))));
    assert_eq!(passes[0].resources()[0].access, Access::Clear);
    Ok(())
}

#[test]
pub fn future_is_shared() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_buffer("data", Buffer::new(16), Access::None);
    let first = graph.future("data");
    let second = graph.future("data");
    let other = graph.future("other");
    assert!(first.same_as(&second));
    assert!(!first.same_as(&other));
    assert_eq!(first.graph_id(), graph.id());
    assert_eq!(first.status()?, FutureStatus::Initial);
    assert_eq!(first.result()?, None);
    assert_eq!(first.wait_value()?, None);
    Ok(())
}

#[test]
pub fn split_returns_unconsumed_names() -> Result<()> {
    let ctx = Context::new();
    let mut graph = RenderGraph::new(&ctx, "main");
    graph.attach_image("a", framework::color_target(8, 8), Access::None);
    graph.attach_buffer("b", Buffer::new(64), Access::None);
    graph.attach_buffer("c", Buffer::new(64), Access::None);
    graph.add_pass(
        PassBuilder::new("write")
            .image_into("a", Access::ColorWrite, "a_done")
            .buffer("b", Access::VertexRead)
            .build(),
    )?;
    graph.release("c", Access::TransferRead)?;

    let futures = graph.split();
    let names = futures
        .iter()
        .map(|future| future.name().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["b", "a_done"]);
    // Split hands out the same futures as asking for them by name.
    assert!(futures[1].same_as(&graph.future("a_done")));
    Ok(())
}

#[test]
pub fn names() -> Result<()> {
    let name = Name::new("color");
    assert_eq!(name.append("__uncleared").as_str(), "color__uncleared");
    assert_eq!(QualifiedName::new("frame", "color").to_string(), "frame::color");
    assert_eq!(QualifiedName::unqualified("color").to_string(), "color");
    assert_eq!(QualifiedName::unqualified("color").qualify(&Name::new("frame")), QualifiedName::new("frame", "color"));
    Ok(())
}

#[test]
pub fn access_properties() -> Result<()> {
    assert!(Access::ColorWrite.is_write());
    assert!(Access::ColorWrite.is_framebuffer_attachment());
    assert!(Access::FragmentSampled.is_read());
    assert!(!Access::None.is_read());
    assert!(!Access::None.is_write());
    assert!(Access::DepthStencilRead.is_depth_stencil());
    assert!(!Access::HostRead.forces_layout());

    let color = Access::ColorWrite.to_use();
    assert_eq!(color.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert!(color.is_write());
    assert_eq!(Access::Present.to_use().layout, vk::ImageLayout::PRESENT_SRC_KHR);
    assert_eq!(Access::ComputeSampled.image_usage(), vk::ImageUsageFlags::SAMPLED);
    assert_eq!(Access::IndexRead.buffer_usage(), vk::BufferUsageFlags::INDEX_BUFFER);

    let range = Subrange::level(2).to_vk(vk::ImageAspectFlags::COLOR);
    assert_eq!(range.base_mip_level, 2);
    assert_eq!(range.level_count, 1);
    assert_eq!(range.layer_count, vk::REMAINING_ARRAY_LAYERS);
    Ok(())
}

#[test]
pub fn image_attachment_description() -> Result<()> {
    let image = ImageAttachment::new().with_format(vk::Format::D32_SFLOAT);
    assert_eq!(image.missing_fields(), vec!["extent", "sample count"]);
    assert_eq!(image.aspect(), vk::ImageAspectFlags::DEPTH);
    assert!(!image.is_allocated());
    assert!(framework::color_target(4, 4).missing_fields().is_empty());
    Ok(())
}
