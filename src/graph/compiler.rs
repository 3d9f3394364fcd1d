//! The compiler turns a set of [`RenderGraph`]s into a schedule that can be executed.
//!
//! Compilation happens in a fixed order of stages:
//! 1. All graphs are inlined into one arena, and every name is resolved to a version of a bound resource.
//! 2. Passes are scheduled and use chains are built from the schedule.
//! 3. Every pass is assigned a domain.
//! 4. Layouts and transitions are computed for every chain.
//! 5. Graphics passes are merged into render units, and barriers are placed.
//! 6. Each domain is cut into submissions.
//!
//! All structural errors found in the first stage are reported together. After a successful compilation, the result
//! can be inspected through the reflection methods on [`Compiler`], and turned into an [`ExecutableRenderGraph`]
//! with [`Compiler::link()`].
//!
//! # Example
//! ```
//! use deimos::prelude::*;
//!
//! let ctx = Context::new();
//! let mut graph = RenderGraph::new(&ctx, "main");
//! graph.attach_image("color", ImageAttachment::new().with_extent(64, 64, 1).with_format(vk::Format::R8G8B8A8_UNORM), Access::None);
//! graph.add_pass(
//!     PassBuilder::new("draw")
//!         .image_into("color", Access::ColorWrite, "color_final")
//!         .build(),
//! )?;
//! graph.release("color_final", Access::FragmentSampled)?;
//!
//! let mut compiler = Compiler::new();
//! compiler.compile(vec![graph], &CompileOptions::default())?;
//! assert_eq!(compiler.get_render_units()?.len(), 1);
//! let executable = compiler.link()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::collections::HashSet;

use anyhow::Result;
use ash::vk;
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};

use crate::graph::access::ResourceUse;
use crate::graph::attachment::{AttachmentInfo, BufferInfo, ImageAttachment};
use crate::graph::chain::{Binding, UseChain};
use crate::graph::executable::ExecutableRenderGraph;
use crate::graph::inference::{BufferRule, ImageRule};
use crate::graph::name::{Name, QualifiedName};
use crate::graph::partition::{self, DomainSchedule, RenderUnit, ScheduledPass};
use crate::graph::pass::{Pass, PassKind};
use crate::graph::render_graph::RenderGraph;
use crate::graph::resolve::{self, FutureSignal, NameTable, ScopedRule};
use crate::graph::synchronize;
use crate::sync::domain::Domain;
use crate::Error;

/// Options for a single compilation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Log the dependency graph in graphviz dot format after compiling.
    pub dump_graph: bool,
    /// Maximum amount of attachment inference rounds when the graph is executed.
    pub inference_iterations: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dump_graph: false,
            inference_iterations: 100,
        }
    }
}

impl CompileOptions {
    /// Create the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log the dependency graph after compiling.
    pub fn dump_graph(mut self, dump: bool) -> Self {
        self.dump_graph = dump;
        self
    }

    /// Set the maximum amount of attachment inference rounds.
    pub fn inference_iterations(mut self, iterations: usize) -> Self {
        self.inference_iterations = iterations;
        self
    }
}

/// Everything the compiler produced for one set of graphs.
pub(crate) struct CompiledGraph {
    pub passes: Vec<Pass>,
    pub pass_prefixes: Vec<Name>,
    pub chains: Vec<UseChain>,
    pub attachments: Vec<AttachmentInfo>,
    pub buffers: Vec<BufferInfo>,
    pub names: NameTable,
    pub image_rules: Vec<ScopedRule<ImageRule>>,
    pub buffer_rules: Vec<ScopedRule<BufferRule>>,
    pub future_signals: Vec<FutureSignal>,
    pub dependencies: DiGraph<usize, QualifiedName>,
    pub schedule: Vec<usize>,
    pub scheduled: Vec<ScheduledPass>,
    pub units: Vec<RenderUnit>,
    pub domains: Vec<DomainSchedule>,
    pub options: CompileOptions,
}

impl CompiledGraph {
    fn chain(&self, chain: usize) -> Result<&UseChain> {
        self.chains.get(chain).ok_or_else(|| Error::InvalidChain(chain).into())
    }

    /// Union of the image usage of every access on a chain.
    pub fn compute_usage(&self, chain: usize) -> vk::ImageUsageFlags {
        self.chains[chain]
            .links
            .iter()
            .fold(vk::ImageUsageFlags::empty(), |usage, link| usage | link.access.image_usage())
    }

    /// Union of the buffer usage of every access on a chain.
    pub fn compute_buffer_usage(&self, chain: usize) -> vk::BufferUsageFlags {
        self.chains[chain]
            .links
            .iter()
            .fold(vk::BufferUsageFlags::empty(), |usage, link| usage | link.access.buffer_usage())
    }

    fn dot(&self) -> String {
        let mut graph = DiGraph::<String, String>::with_capacity(self.passes.len(), self.dependencies.edge_count());
        for (p, pass) in self.passes.iter().enumerate() {
            let domain = self.scheduled[p].domain;
            graph.add_node(format!("{}::{} ({})", self.pass_prefixes[p], pass.name, domain));
        }
        for edge in self.dependencies.raw_edges() {
            graph.add_edge(edge.source(), edge.target(), edge.weight.to_string());
        }

        let passes = &self.passes;
        let edge_attributes = |_: &DiGraph<String, String>, _: EdgeReference<String>| String::from("");
        let node_attributes = |_: &DiGraph<String, String>, node: (NodeIndex, &String)| match passes[node.0.index()].kind {
            PassKind::User => String::from("fillcolor = \"#5e6df7\""),
            _ => String::from("fillcolor = \"#f75e70\" shape=box"),
        };
        format!("{}", Dot::with_attr_getters(&graph, &[], &edge_attributes, &node_attributes))
    }
}

fn initial_uses(chains: &[UseChain], attachments: &[AttachmentInfo], buffers: &[BufferInfo]) -> Vec<ResourceUse> {
    chains
        .iter()
        .map(|chain| match chain.binding {
            Binding::Image(index) => attachments[index].initial,
            Binding::Buffer(index) => buffers[index].initial,
        })
        .collect()
}

fn merge_absolute_wait(waits: &mut Vec<(Domain, u64)>, domain: Domain, value: u64) {
    match waits.iter_mut().find(|(existing, _)| *existing == domain) {
        Some((_, existing)) => *existing = (*existing).max(value),
        None => waits.push((domain, value)),
    }
}

/// Compiles render graphs, and holds the result until it is linked.
///
/// See the [`compiler`](crate::graph::compiler) module for an overview.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct Compiler {
    #[derivative(Debug = "ignore")]
    state: Option<CompiledGraph>,
}

impl Compiler {
    /// Create a compiler that holds nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a set of graphs together. Graphs may refer to each other's values through futures.
    /// Any previously compiled state is discarded.
    /// # Errors
    /// * Fails with [`Error::Compile`] holding every structural error found in the graphs.
    pub fn compile(&mut self, graphs: Vec<RenderGraph>, options: &CompileOptions) -> Result<()> {
        self.state = None;
        let graph_count = graphs.len();

        let mut errors = vec![];
        let mut inlined = resolve::inline(graphs, &mut errors);
        let resolution = match resolve::resolve(&mut inlined) {
            Ok(resolution) if errors.is_empty() => resolution,
            Ok(_) => return Err(Error::Compile(errors).into()),
            Err(mut resolve_errors) => {
                errors.append(&mut resolve_errors);
                return Err(Error::Compile(errors).into());
            }
        };
        resolve::build_chains(&mut inlined, &resolution);

        let domains = partition::infer_domains(&inlined.passes, &inlined.chains, &resolution.schedule);
        let mut scheduled = domains
            .iter()
            .enumerate()
            .map(|(pass, domain)| ScheduledPass::new(pass, *domain))
            .collect::<Vec<_>>();

        let bound_waits = inlined
            .attachments
            .iter()
            .map(|info| (info.chain, info.wait))
            .chain(inlined.buffers.iter().map(|info| (info.chain, info.wait)));
        for (chain, wait) in bound_waits {
            if let (Some((domain, value)), Some(first)) = (wait, inlined.chains[chain].links.first()) {
                merge_absolute_wait(&mut scheduled[first.pass].absolute_waits, domain, value);
            }
        }

        let initial = initial_uses(&inlined.chains, &inlined.attachments, &inlined.buffers);
        let waits = synchronize::synchronize(&mut inlined.passes, &mut inlined.chains, &initial, &domains);
        for (waiting, waited) in waits {
            let entry = (scheduled[waited].domain, waited);
            if !scheduled[waiting].relative_waits.contains(&entry) {
                scheduled[waiting].relative_waits.push(entry);
            }
            scheduled[waited].waited_on = true;
        }

        let mut signalled = HashSet::new();
        for (index, signal) in inlined.future_signals.iter().enumerate() {
            let Some(chain) = signal.chain else {
                continue;
            };
            signalled.insert(chain);
            if let Some(last) = inlined.chains[chain].links.last() {
                scheduled[last.pass].future_signals.push(index);
            }
        }

        let units = partition::build_render_units(
            &inlined.passes,
            &mut inlined.chains,
            &mut scheduled,
            &resolution.schedule,
            &inlined.attachments,
            &signalled,
        );
        synchronize::place_barriers(&inlined.chains, &mut scheduled);
        let domain_schedules = partition::build_batches(&inlined.passes, &mut scheduled, &resolution.schedule);

        debug!(
            "Compiled {} graph(s): {} passes, {} resources, {} render unit(s)",
            graph_count,
            inlined.passes.len(),
            inlined.chains.len(),
            units.len()
        );

        let state = CompiledGraph {
            passes: inlined.passes,
            pass_prefixes: inlined.pass_prefixes,
            chains: inlined.chains,
            attachments: inlined.attachments,
            buffers: inlined.buffers,
            names: resolution.names,
            image_rules: inlined.image_rules,
            buffer_rules: inlined.buffer_rules,
            future_signals: inlined.future_signals,
            dependencies: resolution.dependencies,
            schedule: resolution.schedule,
            scheduled,
            units,
            domains: domain_schedules,
            options: *options,
        };
        if options.dump_graph {
            debug!("Dependency graph:\n{}", state.dot());
        }
        self.state = Some(state);
        Ok(())
    }

    /// Turn the compiled state into an executable graph. The compiler holds nothing afterwards.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled.
    pub fn link(&mut self) -> Result<ExecutableRenderGraph> {
        let state = self.state.take().ok_or(Error::NotCompiled)?;
        Ok(ExecutableRenderGraph::new(state))
    }

    /// Whether the compiler holds a compiled graph.
    pub fn is_compiled(&self) -> bool {
        self.state.is_some()
    }

    fn state(&self) -> Result<&CompiledGraph> {
        Ok(self.state.as_ref().ok_or(Error::NotCompiled)?)
    }

    /// All use chains, one per bound resource.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled.
    pub fn get_use_chains(&self) -> Result<&[UseChain]> {
        Ok(&self.state()?.chains)
    }

    /// All bound images.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled.
    pub fn get_bound_attachments(&self) -> Result<&[AttachmentInfo]> {
        Ok(&self.state()?.attachments)
    }

    /// All bound buffers.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled.
    pub fn get_bound_buffers(&self) -> Result<&[BufferInfo]> {
        Ok(&self.state()?.buffers)
    }

    /// Image usage needed by all accesses on a chain.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled, or [`Error::InvalidChain`] if the chain does not exist.
    pub fn compute_usage(&self, chain: usize) -> Result<vk::ImageUsageFlags> {
        let state = self.state()?;
        state.chain(chain)?;
        Ok(state.compute_usage(chain))
    }

    /// Buffer usage needed by all accesses on a chain.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled, or [`Error::InvalidChain`] if the chain does not exist.
    pub fn compute_buffer_usage(&self, chain: usize) -> Result<vk::BufferUsageFlags> {
        let state = self.state()?;
        state.chain(chain)?;
        Ok(state.compute_buffer_usage(chain))
    }

    /// The image bound to a chain, `None` if the chain is a buffer.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled, or [`Error::InvalidChain`] if the chain does not exist.
    pub fn get_chain_attachment(&self, chain: usize) -> Result<Option<&ImageAttachment>> {
        let state = self.state()?;
        Ok(match state.chain(chain)?.binding {
            Binding::Image(index) => Some(&state.attachments[index].attachment),
            Binding::Buffer(_) => None,
        })
    }

    /// The name of the value at the end of a chain: the name produced by its last access,
    /// or the name that was last accessed.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled, or [`Error::InvalidChain`] if the chain does not exist.
    pub fn get_last_use_name(&self, chain: usize) -> Result<Option<QualifiedName>> {
        let state = self.state()?;
        Ok(state.chain(chain)?.links.last().map(|link| {
            state.passes[link.pass].resources[link.resource]
                .out_name
                .clone()
                .unwrap_or_else(|| link.name.clone())
        }))
    }

    /// The chain of a resource, by the name of the graph it was declared in and any name of it in that graph.
    /// Graphs compiled together under the same name are scoped as `{name}_{id}` instead.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled.
    pub fn get_chain(&self, graph: impl Into<Name>, name: impl Into<Name>) -> Result<Option<&UseChain>> {
        let state = self.state()?;
        let name = QualifiedName::new(graph, name);
        Ok(state.names.version(&name).map(|info| &state.chains[info.chain]))
    }

    /// All passes, including the ones inserted by the graphs, in declaration order.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled.
    pub fn get_passes(&self) -> Result<&[Pass]> {
        Ok(&self.state()?.passes)
    }

    /// Pass indices in execution order.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled.
    pub fn get_schedule(&self) -> Result<&[usize]> {
        Ok(&self.state()?.schedule)
    }

    /// Placement of every pass, indexed by pass.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled.
    pub fn get_scheduled_passes(&self) -> Result<&[ScheduledPass]> {
        Ok(&self.state()?.scheduled)
    }

    /// All render units.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled.
    pub fn get_render_units(&self) -> Result<&[RenderUnit]> {
        Ok(&self.state()?.units)
    }

    /// Per-domain pass order and submissions.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled.
    pub fn get_domain_schedules(&self) -> Result<&[DomainSchedule]> {
        Ok(&self.state()?.domains)
    }

    /// The dependency graph between passes in graphviz dot format.
    /// # Errors
    /// Fails with [`Error::NotCompiled`] if nothing was compiled.
    pub fn dump_graph(&self) -> Result<String> {
        Ok(self.state()?.dot())
    }
}
