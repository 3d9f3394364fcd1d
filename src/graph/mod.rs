//! The render graph system lets you declare GPU work as passes over named resources, and takes care of everything in between:
//! ordering, image layouts, pipeline barriers, queue ownership transfers, render pass creation and semaphore synchronization
//! between the graphics, compute and transfer queues.
//!
//! Each pass declares which resources it touches and how, through an [`Access`](access::Access). A pass that writes a resource
//! usually gives the result a new name with [`Resource::produces()`](resource::Resource::produces), and later passes refer to
//! that new name. This makes every dependency explicit: a name has exactly one producer, and a race between two writers
//! is reported as an error instead of silently resolved.
//!
//! Graphs are turned into something executable in three steps:
//! - A [`Compiler`](compiler::Compiler) compiles one or more [`RenderGraph`](render_graph::RenderGraph)s. Graphs may exchange
//!   values through [`Future`](crate::sync::future::Future)s.
//! - [`Compiler::link()`](compiler::Compiler::link) produces an [`ExecutableRenderGraph`](executable::ExecutableRenderGraph).
//! - [`ExecutableRenderGraph::execute()`](executable::ExecutableRenderGraph::execute) records all passes into command buffers,
//!   and returns a [`SubmitBundle`](crate::sync::submit_batch::SubmitBundle) ready to be submitted.
//!
//! Through [`Compiler::dump_graph()`](compiler::Compiler::dump_graph), it's possible to export a graphviz-compatible dot file
//! of the dependencies between passes.
//!
//! # Example
//!
//! ```
//! use deimos::prelude::*;
//!
//! let ctx = Context::new();
//! let mut graph = RenderGraph::new(&ctx, "frame");
//! graph.attach_and_clear_image(
//!     "color",
//!     ImageAttachment::new().with_extent(800, 600, 1).with_format(vk::Format::R8G8B8A8_UNORM),
//!     Clear::Color([0.0, 0.0, 0.0, 1.0]),
//!     Access::None,
//! )?;
//! graph.add_pass(
//!     PassBuilder::new("triangle")
//!         .image_into("color", Access::ColorWrite, "color_drawn")
//!         .execute_fn(|cmd| cmd.draw(3, 1, 0, 0))
//!         .build(),
//! )?;
//! graph.add_pass(
//!     PassBuilder::new("blur")
//!         .image("color_drawn", Access::ComputeSampled)
//!         .image_into("blurred", Access::ComputeWrite, "blurred_done")
//!         .execute_fn(|cmd| cmd.dispatch(100, 75, 1))
//!         .build(),
//! )?;
//! graph.attach_image("blurred", ImageAttachment::new(), Access::None);
//! graph.inference_rule("blurred", inference::similar_to("color"));
//! graph.release("blurred_done", Access::FragmentSampled)?;
//!
//! let mut compiler = Compiler::new();
//! compiler.compile(vec![graph], &CompileOptions::default())?;
//! let schedule = compiler.get_schedule()?;
//! assert_eq!(schedule.len(), 4);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod access;
pub mod attachment;
pub mod chain;
pub mod compiler;
pub mod executable;
pub mod inference;
pub mod name;
pub mod partition;
pub mod pass;
pub mod render_graph;
pub mod resource;
pub mod synchronize;

pub(crate) mod resolve;
