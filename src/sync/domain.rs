//! Domains abstract over the concept of Vulkan queue families.
//!
//! Work is divided into three device domains:
//! - [`Domain::Graphics`]: All graphics and rendering related commands. This is also the general domain
//!   work falls back to when nothing else can be inferred.
//! - [`Domain::Compute`]: GPU compute commands, most notably `vkCmdDispatch`.
//! - [`Domain::Transfer`]: All transfer and copy related commands.
//!
//! Each domain is backed by its own queue and its own timeline semaphore, so work on different domains
//! progresses independently unless a dependency crosses between them.

use std::fmt::{Display, Formatter};

use ash::vk;

/// An execution domain. Passes are assigned exactly one domain after compilation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    /// Graphics queue, supports graphics, compute and transfer operations.
    Graphics,
    /// Compute queue. When possible, an async compute queue is used.
    Compute,
    /// Transfer queue. When possible, a dedicated transfer queue is used.
    Transfer,
}

impl Domain {
    /// All device domains, in the order they are recorded and submitted in.
    pub const ALL: [Domain; 3] = [Domain::Graphics, Domain::Compute, Domain::Transfer];

    /// Dense index of this domain, usable for per-domain arrays.
    pub fn index(self) -> usize {
        match self {
            Domain::Graphics => 0,
            Domain::Compute => 1,
            Domain::Transfer => 2,
        }
    }

    /// Queue capabilities a queue needs to accept work from this domain.
    pub fn queue_flags(self) -> vk::QueueFlags {
        match self {
            Domain::Graphics => vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            Domain::Compute => vk::QueueFlags::COMPUTE,
            Domain::Transfer => vk::QueueFlags::TRANSFER,
        }
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Domain::Graphics => f.write_str("graphics"),
            Domain::Compute => f.write_str("compute"),
            Domain::Transfer => f.write_str("transfer"),
        }
    }
}
