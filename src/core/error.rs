//! Exposes the deimos error types

use std::fmt::{Display, Formatter};
use std::sync::PoisonError;

use ash::vk;
use thiserror::Error;

/// A single structural error found while compiling a set of render graphs.
/// All of these are collected and reported together through [`Error::Compile`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A pass references a name that is never attached and never produced by an upstream pass.
    #[error("Pass `{pass}` references `{resource}`, which is never attached or produced.")]
    UnresolvedReference {
        /// The unresolved resource name
        resource: String,
        /// The pass that referenced it
        pass: String,
    },
    /// Two passes access the same version of a resource without any ordering between them.
    #[error("Resource `{resource}` is accessed concurrently by `{first}` and `{second}` without a dependency.")]
    ConcurrentAccess {
        /// The contested resource
        resource: String,
        /// First pass involved in the race
        first: String,
        /// Second pass involved in the race
        second: String,
    },
    /// The whole resource is used while it is diverged, or a convergence does not match its divergence.
    #[error("Illegal divergence of `{resource}` in pass `{pass}`.")]
    IllegalDivergence {
        /// The diverged resource
        resource: String,
        /// The offending pass
        pass: String,
    },
}

/// Error type that deimos can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Compilation failed. Holds every structural error that was found.
    #[error("Render graph compilation failed: {}", CompileErrors(.0))]
    Compile(Vec<CompileError>),
    /// Generic Vulkan error type, usually returned by an external collaborator.
    #[error("Vulkan error: `{0}`")]
    VkError(vk::Result),
    /// The allocator could not provide backing memory for a resource.
    #[error("Allocation of `{0}` failed.")]
    AllocationFailed(String),
    /// Attachment inference produced a conflict or left fields unknown.
    #[error("Attachment inference failed: {0}")]
    InferenceFailed(String),
    /// A pass callback looked up a resource it never declared.
    #[error("Pass `{pass}` did not declare resource `{name}`.")]
    UndeclaredResource {
        /// Name of the recording pass
        pass: String,
        /// Name that was looked up
        name: String,
    },
    /// A pass callback looked up an image as a buffer or the other way around.
    #[error("Resource `{0}` is not of the requested type.")]
    WrongResourceType(String),
    /// The same name was produced twice within one graph.
    #[error("Name `{0}` is produced more than once.")]
    DuplicateOutput(String),
    /// The same name was released twice within one graph.
    #[error("Name `{0}` is released more than once.")]
    DuplicateRelease(String),
    /// A swapchain was attached, but no image index was given for it at execution.
    #[error("No swapchain image given for `{0}`.")]
    NoSwapchainImage(String),
    /// Tried to link or reflect on a compiler that holds no compiled graph.
    #[error("Compiler holds no compiled graph.")]
    NotCompiled,
    /// A chain index does not refer to a chain of the compiled graph.
    #[error("No use chain with index {0}.")]
    InvalidChain(usize),
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

struct CompileErrors<'a>(&'a [CompileError]);

impl Display for CompileErrors<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl Error {
    /// Get the compile errors held by this error, if it is a compilation failure.
    pub fn compile_errors(&self) -> &[CompileError] {
        match self {
            Error::Compile(errors) => errors,
            _ => &[],
        }
    }
}

impl From<vk::Result> for Error {
    fn from(value: vk::Result) -> Self {
        Error::VkError(value)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}
