//! The sync module holds everything that synchronizes work between domains and between executions.
//!
//! - The [`domain`] module defines the [`Domain`](domain::Domain)s passes can execute on.
//! - The [`barrier`] module defines the pipeline barriers handed to the
//!   [`CommandRecorder`](crate::command_buffer::traits::CommandRecorder).
//! - The [`future`] module provides [`Future`](future::Future)s to move values between render graphs.
//! - [`submit_batch`] holds the output of an execution, and the logic to submit it to timeline-synchronized queues.

pub mod barrier;
pub mod domain;
pub mod future;
pub mod submit_batch;
