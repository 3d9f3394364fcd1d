//! The [`Context`] holds state shared by every render graph of an application.
//!
//! It hands out unique ids for graphs, tracks the current frame, and caches render pass objects across executions.
//! A context is cheap to share between threads.
//!
//! # Example
//! ```
//! use deimos::prelude::*;
//!
//! let ctx = Context::new();
//! let first = RenderGraph::new(&ctx, "first");
//! let second = RenderGraph::new(&ctx, "second");
//! assert_ne!(first.id(), second.id());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use ash::vk;

use crate::allocator::traits::Allocator;
use crate::command_buffer::render_pass::RenderPassDesc;
use crate::core::cache::FrameCache;
use crate::Error;

/// Amount of frames a render pass may go unused before it is destroyed.
pub const RENDER_PASS_TTL: u64 = 8;

/// Shared state of all render graphs.
#[derive(Debug)]
pub struct Context {
    frame: AtomicU64,
    next_id: AtomicU64,
    render_passes: Mutex<FrameCache<RenderPassDesc, vk::RenderPass>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a new context, starting at frame 0.
    pub fn new() -> Self {
        Self {
            frame: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            render_passes: Mutex::new(FrameCache::new(RENDER_PASS_TTL)),
        }
    }

    /// The current frame.
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// Advance to the next frame, and destroy render passes that were not used for [`RENDER_PASS_TTL`] frames.
    /// Returns the new frame.
    /// # Errors
    /// Fails if the render pass cache is poisoned.
    pub fn next_frame<A: Allocator>(&self, allocator: &mut A) -> Result<u64> {
        let frame = self.frame.fetch_add(1, Ordering::AcqRel) + 1;
        let expired = self.render_passes.lock().map_err(Error::from)?.collect(frame);
        for render_pass in expired {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkRenderPass {:?}", render_pass);
            allocator.destroy_render_pass(render_pass);
        }
        Ok(frame)
    }

    /// Get a new id, unique for this context.
    pub fn get_unique_handle_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Get a render pass for `desc`, creating it through `allocator` if no matching render pass is cached.
    /// # Errors
    /// * Fails if the render pass cache is poisoned.
    /// * Fails if the render pass had to be created, and creation failed.
    pub fn acquire_render_pass<A: Allocator>(&self, allocator: &mut A, desc: &RenderPassDesc) -> Result<vk::RenderPass> {
        let frame = self.frame();
        let mut cache = self.render_passes.lock().map_err(Error::from)?;
        let render_pass = cache.get_or_try_insert_with(desc, frame, || {
            let render_pass = allocator.create_render_pass(desc)?;
            #[cfg(feature = "log-objects")]
            trace!("Created new VkRenderPass {:?}", render_pass);
            Ok(render_pass)
        })?;
        Ok(*render_pass)
    }

    /// Amount of render passes currently cached.
    pub fn render_pass_count(&self) -> Result<usize> {
        Ok(self.render_passes.lock().map_err(Error::from)?.len())
    }
}

static_assertions::assert_impl_all!(Context: Send, Sync);
