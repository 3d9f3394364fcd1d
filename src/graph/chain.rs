//! Use chains: the ordered accesses to one underlying resource across a compiled schedule.
//!
//! Every bound image or buffer heads exactly one chain. Renames through [`Resource::produces()`](crate::graph::resource::Resource::produces),
//! aliases, and diverged subranges all fold into the chain of the resource they originate from. After synchronization, each link
//! holds the [`Transition`]s needed to reach it from the previous state of the resource.

use ash::vk;

use crate::graph::access::{Access, ResourceUse};
use crate::graph::attachment::Subrange;
use crate::graph::name::QualifiedName;
use crate::graph::resource::ResourceType;
use crate::sync::domain::Domain;

/// The bound value a chain belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Index into the bound attachments
    Image(usize),
    /// Index into the bound buffers
    Buffer(usize),
}

/// A state transition of (part of) a resource between two accesses.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State before the transition
    pub src: ResourceUse,
    /// State after the transition
    pub dst: ResourceUse,
    /// Domain the resource was last used on, `None` if it was not used by this schedule or any known queue.
    pub src_domain: Option<Domain>,
    /// Domain of the access after the transition
    pub dst_domain: Domain,
    /// Diverged range this transition applies to, `None` for the whole resource.
    pub subrange: Option<Subrange>,
    /// Link after which ownership is released, for transitions that cross domains.
    pub release_link: Option<usize>,
}

impl Transition {
    /// Whether this transition moves the resource to another domain.
    pub fn is_cross_domain(&self) -> bool {
        matches!(self.src_domain, Some(src) if src != self.dst_domain)
    }

    /// Whether this transition changes the image layout.
    pub fn is_layout_change(&self) -> bool {
        self.src.layout != self.dst.layout
    }
}

/// One access in a use chain.
#[derive(Debug, Clone)]
pub struct ChainLink {
    /// Index of the accessing pass
    pub pass: usize,
    /// Index of the resource within the pass
    pub resource: usize,
    /// The access performed
    pub access: Access,
    /// Version name that was accessed
    pub name: QualifiedName,
    /// Diverged range that was accessed, `None` for the whole resource.
    pub subrange: Option<Subrange>,
    /// Layout the image is in during the access. Undefined for buffers.
    pub layout: vk::ImageLayout,
    /// Transitions needed before this access
    pub transitions: Vec<Transition>,
    /// Whether the transitions are performed by the enclosing render pass instead of a standalone barrier.
    pub folded: bool,
}

impl ChainLink {
    pub(crate) fn new(pass: usize, resource: usize, access: Access, name: QualifiedName, subrange: Option<Subrange>) -> Self {
        Self {
            pass,
            resource,
            access,
            name,
            subrange,
            layout: access.to_use().layout,
            transitions: vec![],
            folded: false,
        }
    }

    /// The state this access requires, with the layout chosen by the compiler.
    pub fn resource_use(&self) -> ResourceUse {
        ResourceUse {
            layout: self.layout,
            ..self.access.to_use()
        }
    }
}

/// All accesses to one underlying resource, in schedule order.
#[derive(Debug, Clone)]
pub struct UseChain {
    /// Name the resource was bound under
    pub root: QualifiedName,
    /// Type of the resource
    pub ty: ResourceType,
    /// The bound value
    pub binding: Binding,
    /// Accesses in schedule order
    pub links: Vec<ChainLink>,
}

impl UseChain {
    pub(crate) fn new(root: QualifiedName, binding: Binding) -> Self {
        let ty = match binding {
            Binding::Image(_) => ResourceType::Image,
            Binding::Buffer(_) => ResourceType::Buffer,
        };
        Self {
            root,
            ty,
            binding,
            links: vec![],
        }
    }

    /// Whether the chain was never accessed.
    pub fn is_unused(&self) -> bool {
        self.links.is_empty()
    }

    /// Total amount of transitions on the chain.
    pub fn transition_count(&self) -> usize {
        self.links.iter().map(|link| link.transitions.len()).sum()
    }
}
