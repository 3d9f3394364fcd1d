//! Submission batches produced by executing a render graph, and the logic to hand them to device queues.
//!
//! Executing a graph yields a [`SubmitBundle`]: one [`SubmitBatch`] per domain with work on it, each holding an ordered
//! list of [`SubmitInfo`]s. Submits wait on other submits of the same bundle by *relative* reference (domain and index
//! within that domain's batch), and on earlier work by *absolute* timeline values. [`submit_bundle()`] turns relative
//! references into timeline values and submits everything.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;

use crate::graph::attachment::SwapchainRef;
use crate::sync::domain::Domain;
use crate::sync::future::Future;

/// One queue submission: a run of passes on one domain, with everything it must wait on.
#[derive(Derivative, Default, Clone)]
#[derivative(Debug)]
pub struct SubmitInfo {
    /// Recorded command buffers, in submission order.
    pub command_buffers: Vec<vk::CommandBuffer>,
    /// Submits of the same bundle to wait on, as `(domain, index into that domain's batch)`.
    pub relative_waits: Vec<(Domain, usize)>,
    /// Timeline values of earlier submissions to wait on.
    pub absolute_waits: Vec<(Domain, u64)>,
    /// Whether this submit must signal its domain's timeline.
    pub signal: bool,
    /// Futures that become available once this submit completes.
    #[derivative(Debug = "ignore")]
    pub future_signals: Vec<Future>,
    /// Swapchains whose images are used by this submit.
    pub used_swapchains: Vec<SwapchainRef>,
}

/// All submits for one domain, in order.
#[derive(Debug, Clone)]
pub struct SubmitBatch {
    /// Domain this batch is submitted to
    pub domain: Domain,
    /// Submits in this batch
    pub submits: Vec<SubmitInfo>,
}

/// The complete output of one render graph execution.
#[derive(Debug, Default, Clone)]
pub struct SubmitBundle {
    /// One batch per domain with work on it.
    pub batches: Vec<SubmitBatch>,
}

impl SubmitBundle {
    /// Get the batch for a domain, if there is work on it.
    pub fn batch(&self, domain: Domain) -> Option<&SubmitBatch> {
        self.batches.iter().find(|batch| batch.domain == domain)
    }

    /// Total amount of command buffers over all batches.
    pub fn command_buffer_count(&self) -> usize {
        self.batches
            .iter()
            .flat_map(|batch| batch.submits.iter())
            .map(|submit| submit.command_buffers.len())
            .sum()
    }
}

/// A wait on a domain's timeline semaphore.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SemaphoreWait {
    /// Domain whose timeline is waited on
    pub domain: Domain,
    /// Value to wait for
    pub value: u64,
    /// Stages that wait
    pub stages: vk::PipelineStageFlags2,
}

/// A single submission handed to a queue.
#[derive(Debug)]
pub struct QueueSubmit<'a> {
    /// Command buffers to execute
    pub command_buffers: &'a [vk::CommandBuffer],
    /// Timeline waits
    pub waits: Vec<SemaphoreWait>,
    /// Value to signal on the submitting domain's timeline, if any.
    pub signal: Option<u64>,
    /// Swapchains used by this submission, for present synchronization.
    pub swapchains: &'a [SwapchainRef],
}

/// Queues of a device, each backed by a timeline semaphore. This is implemented by the device layer.
pub trait DeviceQueues {
    /// The highest timeline value handed out so far for `domain`.
    fn timeline_value(&self, domain: Domain) -> u64;
    /// Submit work to the queue of `domain`.
    /// # Errors
    /// Fails if the device rejects the submission.
    fn submit(&mut self, domain: Domain, submit: QueueSubmit<'_>) -> Result<()>;
}

/// Submit a bundle to the device queues. Relative waits are resolved to absolute timeline values
/// based on the current value of each domain's timeline. Futures signalled by a submit are marked as submitted.
/// # Errors
/// Fails if any submission fails. Remaining submissions are not attempted, submissions that already happened are not undone.
pub fn submit_bundle<Q: DeviceQueues>(queues: &mut Q, bundle: SubmitBundle) -> Result<()> {
    let mut next_value = Domain::ALL
        .iter()
        .map(|domain| (*domain, queues.timeline_value(*domain)))
        .collect::<HashMap<_, _>>();

    // Assign timeline values to signalling submits up front, relative waits may point at any of them.
    let mut values = HashMap::new();
    for batch in &bundle.batches {
        for (index, submit) in batch.submits.iter().enumerate() {
            if submit.signal {
                let value = next_value.entry(batch.domain).or_insert(0);
                *value += 1;
                values.insert((batch.domain, index), *value);
            }
        }
    }

    for batch in &bundle.batches {
        for (index, submit) in batch.submits.iter().enumerate() {
            let mut waits = Vec::new();
            for (domain, target) in &submit.relative_waits {
                let Some(value) = values.get(&(*domain, *target)) else {
                    return Err(anyhow::Error::from(crate::Error::Uncategorized(
                        "Relative wait on a submit that does not signal",
                    )));
                };
                waits.push(SemaphoreWait {
                    domain: *domain,
                    value: *value,
                    stages: vk::PipelineStageFlags2::ALL_COMMANDS,
                });
            }
            waits.extend(submit.absolute_waits.iter().map(|(domain, value)| SemaphoreWait {
                domain: *domain,
                value: *value,
                stages: vk::PipelineStageFlags2::ALL_COMMANDS,
            }));

            let signal = values.get(&(batch.domain, index)).copied();
            trace!(
                "Submitting {} command buffer(s) to {} queue ({} waits, signal {:?})",
                submit.command_buffers.len(),
                batch.domain,
                waits.len(),
                signal
            );
            queues.submit(
                batch.domain,
                QueueSubmit {
                    command_buffers: &submit.command_buffers,
                    waits,
                    signal,
                    swapchains: &submit.used_swapchains,
                },
            )?;

            if let Some(value) = signal {
                for future in &submit.future_signals {
                    future.set_submitted(batch.domain, value)?;
                }
            }
        }
    }

    Ok(())
}
