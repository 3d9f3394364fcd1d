//! Partitioning of a schedule into domains, render units and submissions.
//!
//! Passes without an explicit domain inherit the domain most of their inputs come from. Passes that render to
//! framebuffer attachments always run on [`Domain::Graphics`]. Consecutive graphics passes that render to the same set
//! of attachments are merged into one render pass with a subpass per pass. Finally each domain's passes are cut into
//! submissions wherever a semaphore wait or signal is needed.

use std::collections::HashSet;

use ash::vk;

use crate::command_buffer::render_pass::{AttachmentReference, SubpassDependency, SubpassDescription};
use crate::graph::attachment::{AttachmentInfo, AttachmentKind};
use crate::graph::chain::{Binding, ChainLink, UseChain};
use crate::graph::pass::{Pass, PassKind};
use crate::graph::synchronize::BarrierRef;
use crate::sync::domain::Domain;

/// Placement of one pass in the compiled schedule.
#[derive(Debug, Clone)]
pub struct ScheduledPass {
    /// Index of the pass
    pub pass: usize,
    /// Domain the pass executes on
    pub domain: Domain,
    /// Index of the submission within the domain's batch
    pub batch: usize,
    /// Render unit the pass is recorded in, if it renders to attachments.
    pub render_unit: Option<usize>,
    /// Subpass index within the render unit
    pub subpass: u32,
    /// Whether a pass on another domain waits for this pass
    pub waited_on: bool,
    /// Passes on other domains this pass waits for, as `(domain, pass)`.
    pub relative_waits: Vec<(Domain, usize)>,
    /// Timeline values of earlier submissions this pass waits for.
    pub absolute_waits: Vec<(Domain, u64)>,
    pub(crate) pre_barriers: Vec<BarrierRef>,
    pub(crate) post_barriers: Vec<BarrierRef>,
    pub(crate) future_signals: Vec<usize>,
}

impl ScheduledPass {
    pub(crate) fn new(pass: usize, domain: Domain) -> Self {
        Self {
            pass,
            domain,
            batch: 0,
            render_unit: None,
            subpass: 0,
            waited_on: false,
            relative_waits: vec![],
            absolute_waits: vec![],
            pre_barriers: vec![],
            post_barriers: vec![],
            future_signals: vec![],
        }
    }

    /// Whether this pass has to wait on a semaphore before it executes.
    pub fn has_waits(&self) -> bool {
        !self.relative_waits.is_empty() || !self.absolute_waits.is_empty()
    }

    /// Amount of barriers recorded before this pass.
    pub fn pre_barrier_count(&self) -> usize {
        self.pre_barriers.len()
    }

    /// Amount of barriers recorded after this pass.
    pub fn post_barrier_count(&self) -> usize {
        self.post_barriers.len()
    }
}

/// One attachment of a render unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UnitAttachment {
    /// Use chain of the attached image
    pub chain: usize,
    /// Layout at the start of the render pass
    pub initial_layout: vk::ImageLayout,
    /// Layout at the end of the render pass
    pub final_layout: vk::ImageLayout,
    /// Load operation
    pub load_op: vk::AttachmentLoadOp,
    /// Store operation
    pub store_op: vk::AttachmentStoreOp,
    last_link: usize,
}

/// A group of graphics passes rendering to the same attachments, recorded as one render pass.
#[derive(Debug, Clone)]
pub struct RenderUnit {
    /// Passes in the unit, one per subpass
    pub passes: Vec<usize>,
    /// Attachments, in the order they appear in the render pass
    pub attachments: Vec<UnitAttachment>,
    /// Subpasses
    pub subpasses: Vec<SubpassDescription>,
    /// Dependencies into each subpass
    pub dependencies: Vec<SubpassDependency>,
}

/// A planned queue submission.
#[derive(Debug, Default, Clone)]
pub struct SubmitPlan {
    /// Passes recorded into this submission
    pub passes: Vec<usize>,
    /// Whether the submission signals its domain's timeline
    pub signal: bool,
    /// Submissions of other domains to wait for, as `(domain, batch index)`.
    pub relative_waits: Vec<(Domain, usize)>,
    /// Timeline values to wait for.
    pub absolute_waits: Vec<(Domain, u64)>,
}

/// All passes executing on one domain, and how they are submitted.
#[derive(Debug, Clone)]
pub struct DomainSchedule {
    /// The domain
    pub domain: Domain,
    /// Passes in execution order
    pub passes: Vec<usize>,
    /// Submissions in order
    pub submits: Vec<SubmitPlan>,
}

/// For every pass, the `(chain, link)` pairs of its accesses.
pub(crate) fn links_by_pass(pass_count: usize, chains: &[UseChain]) -> Vec<Vec<(usize, usize)>> {
    let mut links = vec![vec![]; pass_count];
    for (c, chain) in chains.iter().enumerate() {
        for (l, link) in chain.links.iter().enumerate() {
            links[link.pass].push((c, l));
        }
    }
    links
}

fn most_frequent(counts: &[usize; 3]) -> Option<Domain> {
    let mut best: Option<Domain> = None;
    for domain in Domain::ALL {
        let count = counts[domain.index()];
        if count > 0 && best.map_or(true, |best| count > counts[best.index()]) {
            best = Some(domain);
        }
    }
    best
}

/// Assign a domain to every pass.
pub(crate) fn infer_domains(passes: &[Pass], chains: &[UseChain], schedule: &[usize]) -> Vec<Domain> {
    let by_pass = links_by_pass(passes.len(), chains);
    let mut domains = passes
        .iter()
        .map(|pass| {
            pass.domain.or_else(|| {
                (pass.has_framebuffer_attachments() || pass.kind == PassKind::Resolve).then_some(Domain::Graphics)
            })
        })
        .collect::<Vec<_>>();

    loop {
        let mut changed = false;
        for &p in schedule {
            if domains[p].is_some() || passes[p].kind.is_structural() {
                continue;
            }
            let mut counts = [0usize; 3];
            for &(c, l) in &by_pass[p] {
                if l == 0 {
                    continue;
                }
                if let Some(domain) = domains[chains[c].links[l - 1].pass] {
                    counts[domain.index()] += 1;
                }
            }
            if let Some(domain) = most_frequent(&counts) {
                domains[p] = Some(domain);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    passes
        .iter()
        .zip(domains)
        .map(|(pass, domain)| match (domain, &pass.kind) {
            // Transfer queues cannot clear images.
            (Some(Domain::Transfer), PassKind::Clear(_)) if pass.domain.is_none() => Domain::Graphics,
            (Some(domain), _) => domain,
            (None, _) => Domain::Graphics,
        })
        .collect()
}

fn attachment_set(by_pass: &[(usize, usize)], chains: &[UseChain]) -> Vec<usize> {
    let mut set = by_pass
        .iter()
        .filter(|(c, l)| chains[*c].links[*l].access.is_framebuffer_attachment())
        .map(|(c, _)| *c)
        .collect::<Vec<_>>();
    set.sort_unstable();
    set.dedup();
    set
}

fn has_standalone_barriers(by_pass: &[(usize, usize)], chains: &[UseChain]) -> bool {
    by_pass.iter().any(|(c, l)| {
        let link = &chains[*c].links[*l];
        !link.transitions.is_empty() && !foldable(link)
    })
}

/// Whether the transitions of an attachment access can be performed by the render pass itself.
fn foldable(link: &ChainLink) -> bool {
    link.access.is_framebuffer_attachment()
        && link
            .transitions
            .iter()
            .all(|transition| !transition.is_cross_domain() && transition.subrange.is_none())
}

/// Merge consecutive graphics passes into render units, and fold same-domain attachment transitions into them.
pub(crate) fn build_render_units(
    passes: &[Pass],
    chains: &mut [UseChain],
    scheduled: &mut [ScheduledPass],
    schedule: &[usize],
    attachments: &[AttachmentInfo],
    signalled: &HashSet<usize>,
) -> Vec<RenderUnit> {
    let by_pass = links_by_pass(passes.len(), chains);

    let mut groups: Vec<Vec<usize>> = vec![];
    let mut current: Option<Vec<usize>> = None;
    for &p in schedule {
        if scheduled[p].domain != Domain::Graphics || passes[p].kind.is_structural() {
            continue;
        }
        let set = attachment_set(&by_pass[p], chains);
        if set.is_empty() || passes[p].kind == PassKind::ForcedAccess {
            current = None;
            continue;
        }
        let joins = match (&current, groups.last()) {
            (Some(previous_set), Some(group)) => {
                let previous = group[group.len() - 1];
                *previous_set == set
                    && !scheduled[previous].waited_on
                    && !scheduled[p].has_waits()
                    && !has_standalone_barriers(&by_pass[p], chains)
            }
            _ => false,
        };
        if joins {
            if let Some(group) = groups.last_mut() {
                group.push(p);
            }
        } else {
            groups.push(vec![p]);
            current = Some(set);
        }
    }

    let mut units = Vec::with_capacity(groups.len());
    for (u, group) in groups.into_iter().enumerate() {
        for (i, &p) in group.iter().enumerate() {
            scheduled[p].render_unit = Some(u);
            scheduled[p].subpass = i as u32;
            for &(c, l) in &by_pass[p] {
                let link = &mut chains[c].links[l];
                if !link.transitions.is_empty() && foldable(link) {
                    link.folded = true;
                }
            }
        }

        let mut unit_attachments: Vec<UnitAttachment> = vec![];
        let mut subpasses = Vec::with_capacity(group.len());
        let mut dependencies = Vec::with_capacity(group.len());
        for (i, &p) in group.iter().enumerate() {
            let mut subpass = SubpassDescription::default();
            let mut internal = empty_dependency(i.checked_sub(1).map(|previous| previous as u32), i as u32);
            let mut external = empty_dependency(None, i as u32);
            for &(c, l) in &by_pass[p] {
                let link = &chains[c].links[l];
                if !link.access.is_framebuffer_attachment() {
                    continue;
                }
                let existing = unit_attachments.iter().position(|attachment| attachment.chain == c);
                let index = match existing {
                    Some(index) => {
                        unit_attachments[index].final_layout = link.layout;
                        unit_attachments[index].last_link = l;
                        index
                    }
                    None => {
                        let initial_layout = match (link.folded, link.transitions.first()) {
                            (true, Some(transition)) => transition.src.layout,
                            _ => link.layout,
                        };
                        let load_op = if initial_layout == vk::ImageLayout::UNDEFINED {
                            vk::AttachmentLoadOp::DONT_CARE
                        } else {
                            vk::AttachmentLoadOp::LOAD
                        };
                        unit_attachments.push(UnitAttachment {
                            chain: c,
                            initial_layout,
                            final_layout: link.layout,
                            load_op,
                            store_op: vk::AttachmentStoreOp::DONT_CARE,
                            last_link: l,
                        });
                        unit_attachments.len() - 1
                    }
                };

                let reference = AttachmentReference {
                    attachment: index as u32,
                    layout: link.layout,
                };
                if link.access.is_depth_stencil() {
                    subpass.depth_stencil_attachment = Some(reference);
                } else {
                    subpass.color_attachments.push(reference);
                }
                if link.folded {
                    // The first use of an attachment in the unit depends on work outside of the render pass.
                    let dependency = if existing.is_some() { &mut internal } else { &mut external };
                    for transition in &link.transitions {
                        dependency.src_stages |= transition.src.stages;
                        dependency.src_access |= transition.src.access;
                        dependency.dst_stages |= transition.dst.stages;
                        dependency.dst_access |= transition.dst.access;
                    }
                }
            }
            subpasses.push(subpass);
            if i == 0 {
                dependencies.push(external);
            } else {
                dependencies.push(internal);
                if external.src_stages != vk::PipelineStageFlags2::NONE || external.dst_stages != vk::PipelineStageFlags2::NONE {
                    dependencies.push(external);
                }
            }
        }

        for attachment in &mut unit_attachments {
            let chain = &chains[attachment.chain];
            let external = match chain.binding {
                Binding::Image(index) => !matches!(attachments[index].kind, AttachmentKind::Internal),
                Binding::Buffer(_) => true,
            };
            let used_later = attachment.last_link + 1 < chain.links.len();
            if used_later || external || signalled.contains(&attachment.chain) {
                attachment.store_op = vk::AttachmentStoreOp::STORE;
            }
        }

        trace!("Render unit {} with {} subpass(es) and {} attachment(s)", u, group.len(), unit_attachments.len());
        units.push(RenderUnit {
            passes: group,
            attachments: unit_attachments,
            subpasses,
            dependencies,
        });
    }
    units
}

fn empty_dependency(src_subpass: Option<u32>, dst_subpass: u32) -> SubpassDependency {
    SubpassDependency {
        src_subpass,
        dst_subpass,
        src_stages: vk::PipelineStageFlags2::NONE,
        src_access: vk::AccessFlags2::NONE,
        dst_stages: vk::PipelineStageFlags2::NONE,
        dst_access: vk::AccessFlags2::NONE,
    }
}

fn merge_wait<T: Ord + Copy>(waits: &mut Vec<(Domain, T)>, domain: Domain, value: T) {
    match waits.iter_mut().find(|(existing, _)| *existing == domain) {
        Some((_, existing)) => *existing = (*existing).max(value),
        None => waits.push((domain, value)),
    }
}

/// Cut each domain's passes into submissions. A submission ends after a pass another domain waits for, and before a
/// pass that waits for anything.
pub(crate) fn build_batches(passes: &[Pass], scheduled: &mut [ScheduledPass], schedule: &[usize]) -> Vec<DomainSchedule> {
    let mut domains = vec![];
    for domain in Domain::ALL {
        let order = schedule
            .iter()
            .copied()
            .filter(|p| scheduled[*p].domain == domain && !passes[*p].kind.is_structural())
            .collect::<Vec<_>>();
        if order.is_empty() {
            continue;
        }

        let mut submits: Vec<SubmitPlan> = vec![];
        let mut previous: Option<usize> = None;
        for &p in &order {
            let boundary = match submits.last() {
                None => true,
                Some(current) => {
                    (scheduled[p].has_waits() && !current.passes.is_empty())
                        || previous.map_or(false, |previous| scheduled[previous].waited_on)
                }
            };
            if boundary {
                submits.push(SubmitPlan::default());
            }
            let batch = submits.len() - 1;
            scheduled[p].batch = batch;
            submits[batch].passes.push(p);
            previous = Some(p);
        }

        domains.push(DomainSchedule {
            domain,
            passes: order,
            submits,
        });
    }

    for schedule in &mut domains {
        for submit in &mut schedule.submits {
            for &p in &submit.passes {
                let pass = &scheduled[p];
                submit.signal |= pass.waited_on || !pass.future_signals.is_empty();
                for &(domain, waited) in &pass.relative_waits {
                    merge_wait(&mut submit.relative_waits, domain, scheduled[waited].batch);
                }
                for &(domain, value) in &pass.absolute_waits {
                    merge_wait(&mut submit.absolute_waits, domain, value);
                }
            }
        }
        debug!("Domain {}: {} pass(es) in {} submission(s)", schedule.domain, schedule.passes.len(), schedule.submits.len());
    }
    domains
}
