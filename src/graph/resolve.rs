//! Dependency resolution: merging graphs, resolving names to versions, and scheduling passes.
//!
//! Every name in a compiled graph is one *version* of an underlying resource. A version has exactly one definition
//! (a bound value, or a pass that produces it), any number of readers, and at most one consumer, which either writes the
//! version or renames it. This makes the order between passes touching the same resource explicit, and turns every
//! violation into a structural error instead of a silent race.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use multimap::MultiMap;

use crate::core::error::CompileError;
use crate::graph::access::Access;
use crate::graph::attachment::{AttachmentInfo, AttachmentKind, BufferInfo, Subrange};
use crate::graph::chain::{Binding, ChainLink, UseChain};
use crate::graph::inference::{BufferRule, ImageRule};
use crate::graph::name::{Name, QualifiedName};
use crate::graph::pass::{Pass, PassKind};
use crate::graph::render_graph::{AttachmentSource, RenderGraph};
use crate::graph::resource::Resource;
use crate::sync::future::{Future, FutureStatus, FutureValue};

/// An inference rule, scoped to the graph it was declared in.
pub(crate) struct ScopedRule<R> {
    pub target: QualifiedName,
    pub prefix: Name,
    pub rule: R,
}

/// A future handed out by a graph that is not consumed by any graph of the same compilation.
#[derive(Debug, Clone)]
pub(crate) struct FutureSignal {
    pub future: Future,
    pub name: QualifiedName,
    pub chain: Option<usize>,
}

/// All graphs of a compilation merged into one arena of passes.
#[derive(Default)]
pub(crate) struct Inlined {
    pub passes: Vec<Pass>,
    pub pass_prefixes: Vec<Name>,
    pub chains: Vec<UseChain>,
    pub attachments: Vec<AttachmentInfo>,
    pub buffers: Vec<BufferInfo>,
    pub aliases: HashMap<QualifiedName, QualifiedName>,
    pub image_rules: Vec<ScopedRule<ImageRule>>,
    pub buffer_rules: Vec<ScopedRule<BufferRule>>,
    pub future_signals: Vec<FutureSignal>,
}

impl Inlined {
    fn bind_image(&mut self, mut info: AttachmentInfo) {
        info.chain = self.chains.len();
        self.chains
            .push(UseChain::new(info.name.clone(), Binding::Image(self.attachments.len())));
        self.attachments.push(info);
    }

    fn bind_buffer(&mut self, mut info: BufferInfo) {
        info.chain = self.chains.len();
        self.chains
            .push(UseChain::new(info.name.clone(), Binding::Buffer(self.buffers.len())));
        self.buffers.push(info);
    }

    fn bind_future(&mut self, name: QualifiedName, future: Future) -> bool {
        let Ok(snapshot) = future.snapshot() else {
            return false;
        };
        let wait = match snapshot.status {
            FutureStatus::Submitted {
                domain,
                value,
            } => Some((domain, value)),
            FutureStatus::HostAvailable => None,
            FutureStatus::Initial | FutureStatus::Executed => return false,
        };
        match snapshot.result {
            Some(FutureValue::Image(attachment)) => {
                let mut info = AttachmentInfo::new(name, attachment, Access::None, AttachmentKind::External);
                info.initial = snapshot.last_use;
                info.initial_domain = snapshot.last_domain;
                info.future = Some(future);
                info.wait = wait;
                self.bind_image(info);
                true
            }
            Some(FutureValue::Buffer(buffer)) => {
                let mut info = BufferInfo::new(name, buffer, Access::None);
                info.initial = snapshot.last_use;
                info.initial_domain = snapshot.last_domain;
                info.external = true;
                info.future = Some(future);
                info.wait = wait;
                self.bind_buffer(info);
                true
            }
            None => false,
        }
    }
}

/// Order graphs so that graphs producing futures come before the graphs consuming them, where possible.
fn order_graphs(mut graphs: Vec<RenderGraph>) -> Vec<RenderGraph> {
    let ids = graphs.iter().map(|graph| graph.id()).collect::<HashSet<_>>();
    let mut placed = HashSet::new();
    let mut ordered = Vec::with_capacity(graphs.len());
    while !graphs.is_empty() {
        let ready = graphs
            .iter()
            .position(|graph| {
                graph.attachments.iter().all(|(_, source)| match source {
                    AttachmentSource::Future(future) => {
                        let producer = future.graph_id();
                        producer == graph.id() || !ids.contains(&producer) || placed.contains(&producer)
                    }
                    _ => true,
                })
            })
            .unwrap_or(0);
        let graph = graphs.remove(ready);
        placed.insert(graph.id());
        ordered.push(graph);
    }
    ordered
}

/// Merge all graphs into one arena. Every name is qualified with the scope of its graph, futures threaded between
/// graphs of this compilation become aliases, and releases become forced access passes.
pub(crate) fn inline(graphs: Vec<RenderGraph>, errors: &mut Vec<CompileError>) -> Inlined {
    let graphs = order_graphs(graphs);

    let mut used = HashSet::new();
    let prefixes = graphs
        .iter()
        .map(|graph| {
            let prefix = if graph.name().is_empty() || used.contains(graph.name()) {
                Name::new(format!("{}_{}", graph.name(), graph.id()))
            } else {
                graph.name().clone()
            };
            used.insert(prefix.clone());
            prefix
        })
        .collect::<Vec<_>>();
    let scopes = graphs
        .iter()
        .zip(&prefixes)
        .map(|(graph, prefix)| (graph.id(), prefix.clone()))
        .collect::<HashMap<_, _>>();

    let threaded = graphs
        .iter()
        .flat_map(|graph| graph.attachments.iter())
        .filter_map(|(_, source)| match source {
            AttachmentSource::Future(future) if scopes.contains_key(&future.graph_id()) => Some(future.clone()),
            _ => None,
        })
        .collect::<Vec<_>>();

    let mut inlined = Inlined::default();
    for (graph, prefix) in graphs.into_iter().zip(prefixes) {
        let graph_name = graph.name().to_string();
        debug!("Inlining graph `{}` with {} passes as `{}`", graph_name, graph.pass_count(), prefix);

        for (name, source) in graph.attachments {
            let qualified = QualifiedName::new(prefix.clone(), name);
            match source {
                AttachmentSource::Image {
                    attachment,
                    kind,
                    initial,
                } => inlined.bind_image(AttachmentInfo::new(qualified, attachment, initial, kind)),
                AttachmentSource::Buffer {
                    buffer,
                    initial,
                } => inlined.bind_buffer(BufferInfo::new(qualified, buffer, initial)),
                AttachmentSource::Future(future) => {
                    if let Some(scope) = scopes.get(&future.graph_id()) {
                        let target = QualifiedName::new(scope.clone(), future.name().clone());
                        inlined.aliases.insert(qualified, target);
                    } else if !inlined.bind_future(qualified.clone(), future) {
                        errors.push(CompileError::UnresolvedReference {
                            resource: qualified.name.to_string(),
                            pass: graph_name.clone(),
                        });
                    }
                }
            }
        }

        for mut pass in graph.passes {
            qualify_pass(&mut pass, &prefix);
            inlined.passes.push(pass);
            inlined.pass_prefixes.push(prefix.clone());
        }

        for (new, old) in graph.aliases {
            inlined
                .aliases
                .insert(QualifiedName::new(prefix.clone(), new), QualifiedName::new(prefix.clone(), old));
        }

        for release in graph.releases {
            let mut pass = Pass::synthetic(
                Name::new(format!("release {}", release.name)),
                release.domain,
                PassKind::ForcedAccess,
                vec![Resource::image(release.name, release.access)],
            );
            qualify_pass(&mut pass, &prefix);
            inlined.passes.push(pass);
            inlined.pass_prefixes.push(prefix.clone());
        }

        for (name, rule) in graph.image_rules {
            inlined.image_rules.push(ScopedRule {
                target: QualifiedName::new(prefix.clone(), name),
                prefix: prefix.clone(),
                rule,
            });
        }
        for (name, rule) in graph.buffer_rules {
            inlined.buffer_rules.push(ScopedRule {
                target: QualifiedName::new(prefix.clone(), name),
                prefix: prefix.clone(),
                rule,
            });
        }

        for future in graph.futures {
            if threaded.iter().any(|consumed| consumed.same_as(&future)) {
                continue;
            }
            let name = QualifiedName::new(prefix.clone(), future.name().clone());
            inlined.future_signals.push(FutureSignal {
                future,
                name,
                chain: None,
            });
        }
    }

    inlined
}

fn qualify_pass(pass: &mut Pass, prefix: &Name) {
    for resource in &mut pass.resources {
        resource.name = resource.name.qualify(prefix);
        resource.out_name = resource.out_name.as_ref().map(|out| out.qualify(prefix));
    }
}

fn resolve_alias(aliases: &HashMap<QualifiedName, QualifiedName>, name: &QualifiedName) -> QualifiedName {
    let mut current = name;
    let mut visited = HashSet::new();
    while let Some(next) = aliases.get(current) {
        if !visited.insert(current) {
            warn!("Alias cycle through `{}`", current);
            break;
        }
        current = next;
    }
    current.clone()
}

/// The chain and range a version of a resource belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Index of the use chain
    pub chain: usize,
    /// Diverged range, `None` for the whole resource.
    pub subrange: Option<Subrange>,
}

/// Maps every name of a compilation to the version it refers to.
#[derive(Debug, Default)]
pub(crate) struct NameTable {
    aliases: HashMap<QualifiedName, QualifiedName>,
    versions: HashMap<QualifiedName, VersionInfo>,
}

impl NameTable {
    /// Follow aliases until a version name is reached.
    pub fn resolve(&self, name: &QualifiedName) -> QualifiedName {
        resolve_alias(&self.aliases, name)
    }

    /// Look up the version a name refers to.
    pub fn version(&self, name: &QualifiedName) -> Option<VersionInfo> {
        self.versions.get(&self.resolve(name)).copied()
    }
}

#[derive(Debug, Copy, Clone)]
enum Definition {
    Bound(usize),
    Pass(usize, usize),
}

#[derive(Debug, Default)]
struct Uses {
    consumer: Option<usize>,
    diverges: Vec<usize>,
}

/// The result of resolving all names of an inlined compilation.
#[derive(Debug)]
pub(crate) struct Resolution {
    pub names: NameTable,
    pub dependencies: DiGraph<usize, QualifiedName>,
    pub schedule: Vec<usize>,
    versions: Vec<Vec<Option<VersionInfo>>>,
}

struct Resolver<'a> {
    passes: &'a [Pass],
    chains: &'a [UseChain],
    definitions: HashMap<QualifiedName, Definition>,
    memo: HashMap<QualifiedName, Option<VersionInfo>>,
    visiting: HashSet<QualifiedName>,
}

impl Resolver<'_> {
    fn owner(&self, definition: Definition) -> String {
        match definition {
            Definition::Bound(chain) => format!("attach {}", self.chains[chain].root.name),
            Definition::Pass(pass, _) => self.passes[pass].name.to_string(),
        }
    }

    fn version_info(&mut self, name: &QualifiedName) -> Option<VersionInfo> {
        if let Some(info) = self.memo.get(name) {
            return *info;
        }
        // A name that is reached again while resolving itself has no root.
        if !self.visiting.insert(name.clone()) {
            return None;
        }
        let info = match self.definitions.get(name).copied() {
            None => None,
            Some(Definition::Bound(chain)) => Some(VersionInfo {
                chain,
                subrange: None,
            }),
            Some(Definition::Pass(pass, resource)) => {
                let passes = self.passes;
                let parent = self.version_info(&passes[pass].resources[resource].name);
                match &passes[pass].kind {
                    PassKind::Diverge(subrange) => parent.map(|info| VersionInfo {
                        chain: info.chain,
                        subrange: Some(*subrange),
                    }),
                    PassKind::Converge => parent.map(|info| VersionInfo {
                        chain: info.chain,
                        subrange: None,
                    }),
                    _ => parent,
                }
            }
        };
        self.visiting.remove(name);
        self.memo.insert(name.clone(), info);
        info
    }
}

/// Resolve every name used by a pass to its version, validate the version table, and schedule all passes.
/// Resources are rewritten to their resolved names, and tagged with the chain they belong to.
pub(crate) fn resolve(inlined: &mut Inlined) -> std::result::Result<Resolution, Vec<CompileError>> {
    let mut errors = vec![];
    for pass in &mut inlined.passes {
        for resource in &mut pass.resources {
            resource.name = resolve_alias(&inlined.aliases, &resource.name);
        }
    }

    let mut resolver = Resolver {
        passes: &inlined.passes,
        chains: &inlined.chains,
        definitions: HashMap::new(),
        memo: HashMap::new(),
        visiting: HashSet::new(),
    };

    let mut defined = vec![];
    let candidates = inlined
        .chains
        .iter()
        .enumerate()
        .map(|(chain, info)| (info.root.clone(), Definition::Bound(chain)))
        .chain(inlined.passes.iter().enumerate().flat_map(|(p, pass)| {
            pass.resources
                .iter()
                .enumerate()
                .filter_map(move |(r, resource)| resource.out_name.clone().map(|out| (out, Definition::Pass(p, r))))
        }))
        .collect::<Vec<_>>();
    for (name, definition) in candidates {
        if let Some(previous) = resolver.definitions.get(&name).copied() {
            errors.push(CompileError::ConcurrentAccess {
                resource: name.to_string(),
                first: resolver.owner(previous),
                second: resolver.owner(definition),
            });
            continue;
        }
        resolver.definitions.insert(name.clone(), definition);
        defined.push(name);
    }

    let mut uses: HashMap<QualifiedName, Uses> = HashMap::new();
    let mut readers: MultiMap<QualifiedName, usize> = MultiMap::new();
    let mut used = vec![];
    for (p, pass) in inlined.passes.iter().enumerate() {
        for resource in &pass.resources {
            if !resolver.definitions.contains_key(&resource.name) {
                errors.push(CompileError::UnresolvedReference {
                    resource: resource.name.name.to_string(),
                    pass: pass.name.to_string(),
                });
                continue;
            }
            let entry = uses.entry(resource.name.clone()).or_insert_with(|| {
                used.push(resource.name.clone());
                Uses::default()
            });
            match &pass.kind {
                PassKind::Diverge(_) => entry.diverges.push(p),
                kind if resource.is_consuming() || *kind == PassKind::Converge => match entry.consumer {
                    Some(first) if first != p => errors.push(CompileError::ConcurrentAccess {
                        resource: resource.name.to_string(),
                        first: inlined.passes[first].name.to_string(),
                        second: pass.name.to_string(),
                    }),
                    Some(_) => {}
                    None => entry.consumer = Some(p),
                },
                _ => readers.insert(resource.name.clone(), p),
            }
        }
    }

    for name in &used {
        let entry = &uses[name];
        if let (false, Some(consumer)) = (entry.diverges.is_empty(), entry.consumer) {
            errors.push(CompileError::IllegalDivergence {
                resource: name.name.to_string(),
                pass: inlined.passes[consumer].name.to_string(),
            });
        }
    }

    // A released version must not be used after its release.
    for name in &used {
        let entry = &uses[name];
        let release = readers
            .get_vec(name)
            .into_iter()
            .flatten()
            .find(|p| inlined.passes[**p].kind == PassKind::ForcedAccess);
        if let (Some(release), Some(later)) = (release, entry.consumer.or_else(|| entry.diverges.first().copied())) {
            errors.push(CompileError::ConcurrentAccess {
                resource: name.to_string(),
                first: inlined.passes[*release].name.to_string(),
                second: inlined.passes[later].name.to_string(),
            });
        }
    }

    for name in &defined {
        resolver.version_info(name);
    }

    let mut versions = Vec::with_capacity(inlined.passes.len());
    for pass in inlined.passes.iter() {
        let infos = pass
            .resources
            .iter()
            .map(|resource| {
                let info = resolver.version_info(&resource.name);
                if info.is_none() && resolver.definitions.contains_key(&resource.name) {
                    errors.push(CompileError::UnresolvedReference {
                        resource: resource.name.name.to_string(),
                        pass: pass.name.to_string(),
                    });
                }
                info
            })
            .collect::<Vec<_>>();

        if pass.kind == PassKind::Converge {
            let chain = infos.iter().flatten().next().map(|info| info.chain);
            for (resource, info) in pass.resources.iter().zip(&infos) {
                if let Some(info) = info {
                    if Some(info.chain) != chain || info.subrange.is_none() {
                        errors.push(CompileError::IllegalDivergence {
                            resource: resource.name.name.to_string(),
                            pass: pass.name.to_string(),
                        });
                    }
                }
            }
        }
        versions.push(infos);
    }

    let version_table = resolver
        .memo
        .iter()
        .filter_map(|(name, info)| info.map(|info| (name.clone(), info)))
        .collect::<HashMap<_, _>>();
    let definitions = std::mem::take(&mut resolver.definitions);

    if !errors.is_empty() {
        return Err(errors);
    }

    for ((pass, infos), prefix) in inlined.passes.iter_mut().zip(&versions).zip(&inlined.pass_prefixes) {
        for (resource, info) in pass.resources.iter_mut().zip(infos) {
            if let Some(info) = info {
                let chain = &inlined.chains[info.chain];
                resource.reference = Some(info.chain);
                resource.ty = chain.ty;
                if chain.root.prefix != *prefix {
                    resource.foreign = Some(chain.root.clone());
                }
            }
        }
    }

    let mut dependencies = DiGraph::with_capacity(inlined.passes.len(), 0);
    for p in 0..inlined.passes.len() {
        dependencies.add_node(p);
    }
    let mut depend = |from: usize, to: usize, name: &QualifiedName| {
        if from != to {
            dependencies.update_edge(NodeIndex::new(from), NodeIndex::new(to), name.clone());
        }
    };
    for name in &used {
        let entry = &uses[name];
        let name_readers = readers.get_vec(name).map(Vec::as_slice).unwrap_or_default();
        let later = entry.consumer.iter().chain(entry.diverges.iter()).copied().collect::<Vec<_>>();
        if let Some(Definition::Pass(definer, _)) = definitions.get(name) {
            for pass in name_readers.iter().chain(later.iter()) {
                depend(*definer, *pass, name);
            }
        }
        for reader in name_readers {
            for pass in &later {
                depend(*reader, *pass, name);
            }
        }
        let is_release = |p: &&usize| inlined.passes[**p].kind == PassKind::ForcedAccess;
        for release in name_readers.iter().filter(is_release) {
            for reader in name_readers.iter().filter(|p| !is_release(p)) {
                depend(*reader, *release, name);
            }
        }
    }

    let schedule = match schedule(&dependencies) {
        Some(schedule) => schedule,
        None => return Err(vec![describe_cycle(&dependencies, &inlined.passes)]),
    };
    trace!("Schedule: {:?}", schedule);

    Ok(Resolution {
        names: NameTable {
            aliases: inlined.aliases.clone(),
            versions: version_table,
        },
        dependencies,
        schedule,
        versions,
    })
}

/// Topological sort that always picks the ready pass declared first, so declaration order is kept where it is valid.
/// Returns `None` if the graph contains a cycle.
fn schedule(dependencies: &DiGraph<usize, QualifiedName>) -> Option<Vec<usize>> {
    let mut indegree = vec![0usize; dependencies.node_count()];
    for edge in dependencies.edge_references() {
        indegree[edge.target().index()] += 1;
    }
    let mut ready = indegree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(pass, _)| Reverse(pass))
        .collect::<BinaryHeap<_>>();
    let mut order = Vec::with_capacity(indegree.len());
    while let Some(Reverse(pass)) = ready.pop() {
        order.push(pass);
        for next in dependencies.neighbors_directed(NodeIndex::new(pass), Direction::Outgoing) {
            let next = next.index();
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }
    (order.len() == indegree.len()).then_some(order)
}

fn describe_cycle(dependencies: &DiGraph<usize, QualifiedName>, passes: &[Pass]) -> CompileError {
    let component = tarjan_scc(dependencies)
        .into_iter()
        .find(|component| component.len() > 1)
        .unwrap_or_else(|| dependencies.node_indices().collect());
    let members = component.iter().copied().collect::<HashSet<_>>();
    let edge = dependencies
        .edge_references()
        .find(|edge| members.contains(&edge.source()) && members.contains(&edge.target()));
    let resource = edge.map(|edge| edge.weight().name.to_string()).unwrap_or_default();
    if let Some(structural) = component
        .iter()
        .find(|node| passes[node.index()].kind.is_structural())
    {
        return CompileError::IllegalDivergence {
            resource,
            pass: passes[structural.index()].name.to_string(),
        };
    }
    let (first, second) = match edge {
        Some(edge) => (Some(edge.source()), Some(edge.target())),
        None => (component.first().copied(), component.last().copied()),
    };
    let name = |node: Option<NodeIndex>| node.map(|node| passes[node.index()].name.to_string()).unwrap_or_default();
    CompileError::ConcurrentAccess {
        resource,
        first: name(first),
        second: name(second),
    }
}

/// Build the use chains from the schedule. Structural passes and resources that are not accessed contribute no links.
pub(crate) fn build_chains(inlined: &mut Inlined, resolution: &Resolution) {
    for &p in &resolution.schedule {
        let pass = &inlined.passes[p];
        if pass.kind.is_structural() {
            continue;
        }
        for (r, resource) in pass.resources.iter().enumerate() {
            if resource.access == Access::None {
                continue;
            }
            let Some(info) = resolution.versions[p][r] else {
                continue;
            };
            inlined.chains[info.chain].links.push(ChainLink::new(
                p,
                r,
                resource.access,
                resource.name.clone(),
                info.subrange,
            ));
        }
    }

    for chain in &inlined.chains {
        if chain.is_unused() {
            debug!("Resource `{}` is never used and will not be allocated", chain.root);
        }
    }

    for signal in &mut inlined.future_signals {
        signal.chain = resolution.names.version(&signal.name).map(|info| info.chain);
        if signal.chain.is_none() {
            warn!("Future `{}` refers to a name that is never bound or produced", signal.name);
        }
    }
}
