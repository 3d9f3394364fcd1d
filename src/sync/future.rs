//! Futures hand resources from one render graph to another.
//!
//! A [`Future`] is obtained from a graph through [`RenderGraph::future()`](crate::RenderGraph::future) or
//! [`RenderGraph::split()`](crate::RenderGraph::split), and can be attached to another graph with
//! [`RenderGraph::attach_in()`](crate::RenderGraph::attach_in).
//! If both graphs are compiled together, the future simply threads the value through. Otherwise the producing
//! graph must have been submitted first, in which case the consuming graph waits on the timeline value the producer signalled.
//!
//! # Example
//! ```
//! use deimos::prelude::*;
//!
//! let ctx = Context::new();
//! let mut producer = RenderGraph::new(&ctx, "upload");
//! producer.attach_buffer("data", Buffer::new(256), Access::None);
//! let data = producer.future("data");
//! let mut consumer = RenderGraph::new(&ctx, "process");
//! consumer.attach_in("input", data);
//! ```

use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::graph::access::ResourceUse;
use crate::graph::attachment::{Buffer, ImageAttachment};
use crate::graph::name::Name;
use crate::sync::domain::Domain;

/// Progress of the value behind a future.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FutureStatus {
    /// The producing graph has not been executed yet.
    Initial,
    /// The producing graph was recorded, but not submitted.
    Executed,
    /// The producing work was submitted, and signals `value` on the timeline of `domain`.
    Submitted {
        /// Domain the value is produced on
        domain: Domain,
        /// Timeline value signalled when the value is ready
        value: u64,
    },
    /// The value is ready and visible to the host, no waiting is needed.
    HostAvailable,
}

/// The concrete value a future resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum FutureValue {
    /// An image
    Image(ImageAttachment),
    /// A buffer
    Buffer(Buffer),
}

#[derive(Debug)]
struct FutureState {
    status: FutureStatus,
    result: Option<FutureValue>,
    last_use: ResourceUse,
    last_domain: Option<Domain>,
}

#[derive(Debug)]
pub(crate) struct FutureControl {
    graph: u64,
    name: Name,
    state: Mutex<FutureState>,
}

/// A value leaving one graph, possibly entering another. Cloning a future gives another handle to the same value.
#[derive(Debug, Clone)]
pub struct Future {
    control: Arc<FutureControl>,
}

/// Snapshot of a future's state, taken when it is attached to another graph.
#[derive(Debug, Clone)]
pub(crate) struct FutureSnapshot {
    pub status: FutureStatus,
    pub result: Option<FutureValue>,
    pub last_use: ResourceUse,
    pub last_domain: Option<Domain>,
}

impl Future {
    pub(crate) fn new(graph: u64, name: Name) -> Self {
        Self {
            control: Arc::new(FutureControl {
                graph,
                name,
                state: Mutex::new(FutureState {
                    status: FutureStatus::Initial,
                    result: None,
                    last_use: ResourceUse::default(),
                    last_domain: None,
                }),
            }),
        }
    }

    /// Id of the graph that produces this future.
    pub fn graph_id(&self) -> u64 {
        self.control.graph
    }

    /// Name of the produced resource inside its graph.
    pub fn name(&self) -> &Name {
        &self.control.name
    }

    /// Current status of the future.
    pub fn status(&self) -> Result<FutureStatus> {
        Ok(self.control.state.lock().map_err(crate::Error::from)?.status)
    }

    /// The resolved value, available once the producing graph was executed.
    pub fn result(&self) -> Result<Option<FutureValue>> {
        Ok(self.control.state.lock().map_err(crate::Error::from)?.result.clone())
    }

    /// The timeline value to wait on before the value can be used, if the producing work was submitted.
    pub fn wait_value(&self) -> Result<Option<(Domain, u64)>> {
        Ok(match self.status()? {
            FutureStatus::Submitted {
                domain,
                value,
            } => Some((domain, value)),
            _ => None,
        })
    }

    /// Mark the value as available to the host. Call this after waiting for the producing submission
    /// so later graphs do not wait on it again.
    pub fn mark_host_available(&self) -> Result<()> {
        let mut state = self.control.state.lock().map_err(crate::Error::from)?;
        state.status = FutureStatus::HostAvailable;
        state.last_domain = None;
        Ok(())
    }

    /// Returns true if both handles refer to the same future.
    pub fn same_as(&self, other: &Future) -> bool {
        Arc::ptr_eq(&self.control, &other.control)
    }

    pub(crate) fn snapshot(&self) -> Result<FutureSnapshot> {
        let state = self.control.state.lock().map_err(crate::Error::from)?;
        Ok(FutureSnapshot {
            status: state.status,
            result: state.result.clone(),
            last_use: state.last_use,
            last_domain: state.last_domain,
        })
    }

    pub(crate) fn set_executed(&self, result: FutureValue, last_use: ResourceUse, last_domain: Option<Domain>) -> Result<()> {
        let mut state = self.control.state.lock().map_err(crate::Error::from)?;
        state.status = FutureStatus::Executed;
        state.result = Some(result);
        state.last_use = last_use;
        state.last_domain = last_domain;
        Ok(())
    }

    pub(crate) fn set_submitted(&self, domain: Domain, value: u64) -> Result<()> {
        let mut state = self.control.state.lock().map_err(crate::Error::from)?;
        state.status = FutureStatus::Submitted {
            domain,
            value,
        };
        Ok(())
    }
}

static_assertions::assert_impl_all!(Future: Send, Sync);
