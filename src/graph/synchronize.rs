//! Synchronization of use chains.
//!
//! Each chain is walked in schedule order while tracking the state of every part of the resource. An access that is
//! not compatible with the current state gets a [`Transition`]. Reads that follow each other in the same layout and on
//! the same domain are grouped, so the group needs only one barrier, which covers all readers. Accesses that move
//! the resource to another domain additionally make the accessing pass wait on the pass(es) that touched it last.
//!
//! A chain with a single link is left without transitions, unless the resource enters the graph with a pending write.

use ash::vk;

use crate::graph::access::ResourceUse;
use crate::graph::attachment::Subrange;
use crate::graph::chain::{ChainLink, Transition, UseChain};
use crate::graph::partition::ScheduledPass;
use crate::graph::pass::Pass;
use crate::graph::resource::ResourceType;
use crate::sync::domain::Domain;

/// Which half of a transition a barrier performs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BarrierHalf {
    /// The complete transition, recorded on a single domain.
    Full,
    /// The release half of a queue ownership transfer, recorded on the source domain.
    Release,
    /// The acquire half of a queue ownership transfer, recorded on the destination domain.
    Acquire,
}

/// Reference to a transition that is recorded as a barrier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BarrierRef {
    /// Index of the use chain
    pub chain: usize,
    /// Index of the link within the chain
    pub link: usize,
    /// Index of the transition within the link
    pub transition: usize,
    /// Part of the transition to record
    pub half: BarrierHalf,
}

#[derive(Debug, Clone)]
struct ReadGroup {
    stages: vk::PipelineStageFlags2,
    access: vk::AccessFlags2,
    links: Vec<usize>,
    /// Transitions that make the group visible. Later readers widen their destination.
    carriers: Vec<(usize, usize)>,
}

/// Tracked state of the whole resource or one diverged part of it.
#[derive(Debug, Clone)]
struct Fragment {
    subrange: Option<Subrange>,
    last_use: ResourceUse,
    domain: Option<Domain>,
    last_link: Option<usize>,
    reads: Option<ReadGroup>,
}

struct ChainWalker<'a> {
    ty: ResourceType,
    links: &'a mut [ChainLink],
    domains: &'a [Domain],
    waits: Vec<(usize, usize)>,
}

impl ChainWalker<'_> {
    /// Bring `fragment` into the state link `l` requires. Returns the index of the new transition, if any.
    fn access(&mut self, fragment: &mut Fragment, l: usize) -> Option<usize> {
        let link = &self.links[l];
        let dst = link.resource_use();
        let dst_domain = self.domains[link.pass];
        let pass = link.pass;
        let is_read = link.access.is_read();
        let is_image = self.ty == ResourceType::Image;
        let cross_domain = matches!(fragment.domain, Some(domain) if domain != dst_domain);

        if let Some(group) = &mut fragment.reads {
            let same_layout = !is_image || fragment.last_use.layout == dst.layout;
            if is_read && same_layout && fragment.domain == Some(dst_domain) {
                group.stages |= dst.stages;
                group.access |= dst.access;
                group.links.push(l);
                for &(carrier, t) in &group.carriers {
                    let transition = &mut self.links[carrier].transitions[t];
                    transition.dst.stages |= dst.stages;
                    transition.dst.access |= dst.access;
                }
                fragment.last_link = Some(l);
                return None;
            }
        }

        if cross_domain {
            match &fragment.reads {
                Some(group) => {
                    for &reader in &group.links {
                        self.waits.push((pass, self.links[reader].pass));
                    }
                }
                None => {
                    if let Some(last) = fragment.last_link {
                        self.waits.push((pass, self.links[last].pass));
                    }
                }
            }
        }

        let layout_change = is_image && fragment.last_use.layout != dst.layout;
        let needed = layout_change || cross_domain || fragment.last_use.is_write() || dst.is_write();
        let elided = !is_image && fragment.last_link.is_none() && fragment.last_use.access == vk::AccessFlags2::NONE;

        let mut created = None;
        if needed && !elided {
            let src = match &fragment.reads {
                Some(group) => ResourceUse {
                    stages: group.stages,
                    access: vk::AccessFlags2::NONE,
                    layout: fragment.last_use.layout,
                },
                None => fragment.last_use,
            };
            let transition = Transition {
                src,
                dst,
                src_domain: fragment.domain,
                dst_domain,
                subrange: fragment.subrange,
                release_link: if cross_domain && is_image { fragment.last_link } else { None },
            };
            let transitions = &mut self.links[l].transitions;
            transitions.push(transition);
            created = Some(transitions.len() - 1);
        }

        fragment.last_use = dst;
        fragment.domain = Some(dst_domain);
        fragment.last_link = Some(l);
        fragment.reads = is_read.then(|| ReadGroup {
            stages: dst.stages,
            access: dst.access,
            links: vec![l],
            carriers: created.map(|t| vec![(l, t)]).unwrap_or_default(),
        });
        created
    }

    fn walk(&mut self, initial: ResourceUse) {
        let mut whole = Fragment {
            subrange: None,
            last_use: initial,
            domain: None,
            last_link: None,
            reads: None,
        };
        let mut parts: Vec<Fragment> = vec![];

        for l in 0..self.links.len() {
            match self.links[l].subrange {
                Some(subrange) => {
                    let index = match parts.iter().position(|part| part.subrange == Some(subrange)) {
                        Some(index) => index,
                        None => {
                            parts.push(Fragment {
                                subrange: Some(subrange),
                                ..whole.clone()
                            });
                            parts.len() - 1
                        }
                    };
                    let mut part = parts[index].clone();
                    self.access(&mut part, l);
                    parts[index] = part;
                }
                None if parts.is_empty() => {
                    self.access(&mut whole, l);
                }
                None => {
                    // `whole` still holds the state of everything outside the diverged parts.
                    let rest: Vec<Fragment> = remainder(&parts)
                        .into_iter()
                        .map(|subrange| Fragment {
                            subrange: Some(subrange),
                            ..whole.clone()
                        })
                        .collect();
                    let mut carriers = vec![];
                    for mut fragment in parts.drain(..).chain(rest) {
                        if let Some(t) = self.access(&mut fragment, l) {
                            carriers.push((l, t));
                        }
                    }
                    let dst = self.links[l].resource_use();
                    whole.last_use = dst;
                    whole.domain = Some(self.domains[self.links[l].pass]);
                    whole.last_link = Some(l);
                    whole.reads = self.links[l].access.is_read().then(|| ReadGroup {
                        stages: dst.stages,
                        access: dst.access,
                        links: vec![l],
                        carriers,
                    });
                }
            }
        }
    }
}

/// Ranges of the image not covered by any of `parts`, split along the boundaries of the parts.
/// Ranges may start past the last level or layer of the image, these are skipped when recorded.
fn remainder(parts: &[Fragment]) -> Vec<Subrange> {
    fn cells(ranges: impl Iterator<Item = (u32, u32)>) -> Vec<(u32, u32)> {
        let mut points = vec![0];
        for (base, count) in ranges {
            points.push(base);
            if count != Subrange::REMAINING {
                points.push(base + count);
            }
        }
        points.sort_unstable();
        points.dedup();
        points
            .iter()
            .enumerate()
            .map(|(i, &start)| match points.get(i + 1) {
                Some(&end) => (start, end - start),
                None => (start, Subrange::REMAINING),
            })
            .collect()
    }

    fn contains(base: u32, count: u32, start: u32) -> bool {
        start >= base && (count == Subrange::REMAINING || start < base + count)
    }

    let ranges: Vec<Subrange> = parts.iter().filter_map(|part| part.subrange).collect();
    let levels = cells(ranges.iter().map(|range| (range.base_level, range.level_count)));
    let layers = cells(ranges.iter().map(|range| (range.base_layer, range.layer_count)));
    let mut uncovered = vec![];
    for &(base_level, level_count) in &levels {
        for &(base_layer, layer_count) in &layers {
            let covered = ranges.iter().any(|range| {
                contains(range.base_level, range.level_count, base_level)
                    && contains(range.base_layer, range.layer_count, base_layer)
            });
            if !covered {
                uncovered.push(Subrange {
                    base_level,
                    level_count,
                    base_layer,
                    layer_count,
                });
            }
        }
    }
    uncovered
}

fn assign_layouts(ty: ResourceType, links: &mut [ChainLink]) {
    for link in links {
        link.layout = match ty {
            ResourceType::Buffer => vk::ImageLayout::UNDEFINED,
            ResourceType::Image if !link.access.forces_layout() => vk::ImageLayout::GENERAL,
            ResourceType::Image => link.access.to_use().layout,
        };
    }
}

/// Reads of the same range that follow each other but want different layouts are moved to the general layout, so
/// they can share a single transition.
fn promote_read_runs(links: &mut [ChainLink]) {
    fn flush(links: &mut [ChainLink], run: Vec<usize>) {
        let first = run.first().map(|l| links[*l].layout);
        if run.iter().any(|l| Some(links[*l].layout) != first) {
            for l in run {
                links[l].layout = vk::ImageLayout::GENERAL;
            }
        }
    }

    let mut runs: Vec<(Option<Subrange>, Vec<usize>)> = vec![];
    for l in 0..links.len() {
        let key = links[l].subrange;
        let (flushed, kept): (Vec<_>, Vec<_>) = runs.into_iter().partition(|(run_key, _)| {
            if links[l].access.is_write() {
                key.is_none() || run_key.is_none() || *run_key == key
            } else {
                run_key.is_none() != key.is_none()
            }
        });
        runs = kept;
        for (_, run) in flushed {
            flush(links, run);
        }
        if links[l].access.is_read() {
            match runs.iter_mut().find(|(run_key, _)| *run_key == key) {
                Some((_, run)) => run.push(l),
                None => runs.push((key, vec![l])),
            }
        }
    }
    for (_, run) in runs {
        flush(links, run);
    }
}

/// Compute layouts and transitions for every chain. Returns the cross-domain waits this requires,
/// as `(waiting pass, waited pass)`.
pub(crate) fn synchronize(
    passes: &mut [Pass],
    chains: &mut [UseChain],
    initial: &[ResourceUse],
    domains: &[Domain],
) -> Vec<(usize, usize)> {
    let mut waits = vec![];
    for (chain, initial) in chains.iter_mut().zip(initial) {
        assign_layouts(chain.ty, &mut chain.links);
        if chain.ty == ResourceType::Image {
            promote_read_runs(&mut chain.links);
            for link in &chain.links {
                if link.layout == vk::ImageLayout::GENERAL && link.access.to_use().layout != vk::ImageLayout::GENERAL {
                    passes[link.pass].resources[link.resource].promoted_to_general = true;
                }
            }
        }

        // A single access has nothing to be ordered against, unless it must see a write made before the graph.
        if chain.links.len() == 1 && !initial.is_write() {
            trace!("Chain `{}`: single access, no transitions", chain.root);
            continue;
        }

        let mut walker = ChainWalker {
            ty: chain.ty,
            links: &mut chain.links,
            domains,
            waits: vec![],
        };
        walker.walk(*initial);
        waits.append(&mut walker.waits);
        trace!("Chain `{}`: {} transition(s)", chain.root, chain.transition_count());
    }
    waits.sort_unstable();
    waits.dedup();
    waits
}

/// Place every transition that is not folded into a render pass as a barrier around its pass.
pub(crate) fn place_barriers(chains: &[UseChain], scheduled: &mut [ScheduledPass]) {
    for (c, chain) in chains.iter().enumerate() {
        for (l, link) in chain.links.iter().enumerate() {
            if link.folded {
                continue;
            }
            for (t, transition) in link.transitions.iter().enumerate() {
                let barrier = |half| BarrierRef {
                    chain: c,
                    link: l,
                    transition: t,
                    half,
                };
                match (transition.is_cross_domain(), chain.ty, transition.release_link) {
                    (true, ResourceType::Image, Some(release)) => {
                        scheduled[chain.links[release].pass]
                            .post_barriers
                            .push(barrier(BarrierHalf::Release));
                        scheduled[link.pass].pre_barriers.push(barrier(BarrierHalf::Acquire));
                    }
                    _ => scheduled[link.pass].pre_barriers.push(barrier(BarrierHalf::Full)),
                }
            }
        }
    }
}
