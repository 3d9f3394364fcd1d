//! Resource names, optionally qualified by the scope of the graph they were declared in.

use std::fmt::{Display, Formatter};

/// A resource name as written by the user.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(String);

impl Name {
    /// Create a new name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a new name with `suffix` appended.
    pub fn append(&self, suffix: impl AsRef<str>) -> Self {
        Self(format!("{}{}", self.0, suffix.as_ref()))
    }

    /// Whether this name is the empty name.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&Name> for Name {
    fn from(value: &Name) -> Self {
        value.clone()
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A name qualified by the scope of the graph that owns it. Two graphs can declare the same
/// name without colliding once they are compiled together.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    /// Scope of the owning graph. Empty until the graph is compiled.
    pub prefix: Name,
    /// Name inside the graph.
    pub name: Name,
}

impl QualifiedName {
    /// Create a qualified name.
    pub fn new(prefix: impl Into<Name>, name: impl Into<Name>) -> Self {
        Self {
            prefix: prefix.into(),
            name: name.into(),
        }
    }

    /// Create a name that is not qualified yet.
    pub fn unqualified(name: impl Into<Name>) -> Self {
        Self {
            prefix: Name::default(),
            name: name.into(),
        }
    }

    /// Place this name into the scope of a graph.
    pub fn qualify(&self, prefix: &Name) -> Self {
        Self {
            prefix: prefix.clone(),
            name: self.name.clone(),
        }
    }
}

impl Display for QualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}::{}", self.prefix, self.name)
        }
    }
}
