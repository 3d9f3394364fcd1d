//! Declarative render graphs for Vulkan
//!
//! Deimos compiles graphs of GPU passes into an executable schedule. Passes declare the resources they use and how they
//! use them, and deimos derives everything else: the order passes run in, image layouts, pipeline barriers, render passes,
//! queue ownership transfers and semaphore synchronization between the graphics, compute and transfer queues.
//!
//! To get started, the easiest way is to simply
//! ```
//! use deimos::prelude::*;
//! ```
//!
//! Deimos never calls into Vulkan itself. Objects are created through an [`Allocator`](crate::allocator::traits::Allocator),
//! commands are recorded through a [`CommandRecorder`](crate::command_buffer::traits::CommandRecorder), and work is submitted through
//! [`DeviceQueues`](crate::sync::submit_batch::DeviceQueues). All three are implemented by the device layer of the application.
//!
//! # Example
//!
//! A single graph that uploads a buffer on the transfer queue and processes it on the compute queue:
//! ```
//! use deimos::prelude::*;
//!
//! let ctx = Context::new();
//! let mut graph = RenderGraph::new(&ctx, "simulation");
//! graph.attach_buffer("particles", Buffer::new(4096), Access::None);
//! graph.attach_buffer("staging", Buffer::new(4096), Access::HostWrite);
//! graph.add_pass(
//!     PassBuilder::new("upload")
//!         .on(Domain::Transfer)
//!         .buffer("staging", Access::TransferRead)
//!         .buffer_into("particles", Access::TransferWrite, "uploaded")
//!         .execute_fn(|cmd| cmd.copy_buffer("staging", "particles", 4096))
//!         .build(),
//! )?;
//! graph.add_pass(
//!     PassBuilder::new("simulate")
//!         .on(Domain::Compute)
//!         .buffer_into("uploaded", Access::ComputeRW, "simulated")
//!         .execute_fn(|cmd| cmd.dispatch(64, 1, 1))
//!         .build(),
//! )?;
//!
//! let mut compiler = Compiler::new();
//! compiler.compile(vec![graph], &CompileOptions::default())?;
//! let passes = compiler.get_scheduled_passes()?;
//! // The compute pass waits for the transfer pass.
//! assert_eq!(passes[1].relative_waits, vec![(Domain::Transfer, 0)]);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! For further example code, check out the following modules
//! - [`graph`] for building, compiling and executing render graphs.
//! - [`sync`] for domains, futures and queue submission.
//! - [`command_buffer`] for the interface passes record commands through.
//! - [`allocator`] for the interface resources are allocated through.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod allocator;
pub mod command_buffer;
pub mod core;
pub mod graph;
pub mod sync;
