//! Resources as they are touched by a single pass.

use crate::graph::access::Access;
use crate::graph::name::{Name, QualifiedName};

/// The type of a resource.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// An image
    #[default]
    Image,
    /// A buffer
    Buffer,
}

/// One access of a pass to a named resource. Optionally the value after the pass is given a new name
/// through [`Resource::produces()`], which is how later passes refer to the result of this one.
///
/// Resources are equal if their names are equal, regardless of type or access.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Name of the accessed value. Qualified with the graph scope once compiled.
    pub name: QualifiedName,
    /// Name as originally given in the pass.
    pub original_name: Name,
    /// Type of the resource
    pub ty: ResourceType,
    /// How the pass accesses the resource
    pub access: Access,
    /// Name of the value after this pass, if any.
    pub out_name: Option<QualifiedName>,
    /// Root resource in another graph this resource refers to, if it was received from one.
    pub foreign: Option<QualifiedName>,
    /// Index of the use chain this resource is part of, set by the compiler.
    pub reference: Option<usize>,
    /// The compiler chose `VK_IMAGE_LAYOUT_GENERAL` for this access instead of its optimal layout.
    pub promoted_to_general: bool,
}

impl Resource {
    fn new(name: Name, ty: ResourceType, access: Access) -> Self {
        Self {
            name: QualifiedName::unqualified(name.clone()),
            original_name: name,
            ty,
            access,
            out_name: None,
            foreign: None,
            reference: None,
            promoted_to_general: false,
        }
    }

    /// An image accessed with `access`.
    pub fn image(name: impl Into<Name>, access: Access) -> Self {
        Self::new(name.into(), ResourceType::Image, access)
    }

    /// A buffer accessed with `access`.
    pub fn buffer(name: impl Into<Name>, access: Access) -> Self {
        Self::new(name.into(), ResourceType::Buffer, access)
    }

    /// Give the value after this pass a new name.
    pub fn produces(mut self, out_name: impl Into<Name>) -> Self {
        self.out_name = Some(QualifiedName::unqualified(out_name));
        self
    }

    /// Whether this use ends the current version of the resource: it either writes it or renames it.
    pub(crate) fn is_consuming(&self) -> bool {
        self.access.is_write() || self.out_name.is_some()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Resource {}
