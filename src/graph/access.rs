//! Describes how a pass accesses a resource, and how that access maps to Vulkan synchronization state.

use ash::vk;

/// The ways a pass can access a resource. Each access determines the pipeline stages, memory access
/// and image layout the resource must be in when the pass executes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Access {
    /// Not accessed. Used for the initial state of fresh resources.
    None,
    /// Cleared with a clear command.
    Clear,
    /// Source of a transfer operation.
    TransferRead,
    /// Destination of a transfer operation.
    TransferWrite,
    /// Both source and destination of transfer operations.
    TransferRW,
    /// Read as a color attachment.
    ColorRead,
    /// Written as a color attachment.
    ColorWrite,
    /// Read and written as a color attachment (blending).
    ColorRW,
    /// Read-only depth/stencil attachment.
    DepthStencilRead,
    /// Read and written as a depth/stencil attachment.
    DepthStencilRW,
    /// Multisampled source of a resolve.
    ColorResolveRead,
    /// Single-sampled destination of a resolve.
    ColorResolveWrite,
    /// Read as an input attachment.
    InputRead,
    /// Read as a vertex buffer.
    VertexRead,
    /// Read as an index buffer.
    IndexRead,
    /// Read as an indirect argument buffer.
    IndirectRead,
    /// Sampled in a vertex shader.
    VertexSampled,
    /// Sampled in a fragment shader.
    FragmentSampled,
    /// Storage read in a fragment shader.
    FragmentRead,
    /// Storage write in a fragment shader.
    FragmentWrite,
    /// Storage read and write in a fragment shader.
    FragmentRW,
    /// Sampled in a compute shader.
    ComputeSampled,
    /// Storage read in a compute shader.
    ComputeRead,
    /// Storage write in a compute shader.
    ComputeWrite,
    /// Storage read and write in a compute shader.
    ComputeRW,
    /// Read in any ray tracing shader stage.
    RayTracingRead,
    /// Read by the host.
    HostRead,
    /// Written by the host.
    HostWrite,
    /// Read and written by the host.
    HostRW,
    /// Generic read by any command.
    MemoryRead,
    /// Generic write by any command.
    MemoryWrite,
    /// Generic read and write by any command.
    MemoryRW,
    /// Handed to the presentation engine.
    Present,
}

/// The synchronization state a resource is in for one access.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ResourceUse {
    /// Pipeline stages the access happens in.
    pub stages: vk::PipelineStageFlags2,
    /// Memory access performed.
    pub access: vk::AccessFlags2,
    /// Image layout required. Ignored for buffers.
    pub layout: vk::ImageLayout,
}

const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::TRANSFER_WRITE.as_raw()
        | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
        | vk::AccessFlags2::SHADER_WRITE.as_raw()
        | vk::AccessFlags2::HOST_WRITE.as_raw()
        | vk::AccessFlags2::MEMORY_WRITE.as_raw(),
);

impl ResourceUse {
    /// Returns true if this use writes to memory.
    pub fn is_write(&self) -> bool {
        self.access.intersects(WRITE_ACCESS)
    }
}

impl Access {
    /// Whether this access writes to the resource.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Access::Clear
                | Access::TransferWrite
                | Access::TransferRW
                | Access::ColorWrite
                | Access::ColorRW
                | Access::DepthStencilRW
                | Access::ColorResolveWrite
                | Access::FragmentWrite
                | Access::FragmentRW
                | Access::ComputeWrite
                | Access::ComputeRW
                | Access::HostWrite
                | Access::HostRW
                | Access::MemoryWrite
                | Access::MemoryRW
        )
    }

    /// Whether this access only reads from the resource.
    pub fn is_read(self) -> bool {
        self != Access::None && !self.is_write()
    }

    /// Whether this access binds the resource as a framebuffer attachment, which makes the pass
    /// part of a render pass.
    pub fn is_framebuffer_attachment(self) -> bool {
        matches!(
            self,
            Access::ColorRead | Access::ColorWrite | Access::ColorRW | Access::DepthStencilRead | Access::DepthStencilRW
        )
    }

    /// Whether this access binds a depth/stencil attachment.
    pub fn is_depth_stencil(self) -> bool {
        matches!(self, Access::DepthStencilRead | Access::DepthStencilRW)
    }

    /// Whether this access demands one specific image layout. Images used with an access that doesn't
    /// are kept in `VK_IMAGE_LAYOUT_GENERAL`.
    pub fn forces_layout(self) -> bool {
        !matches!(
            self,
            Access::None
                | Access::HostRead
                | Access::HostWrite
                | Access::HostRW
                | Access::MemoryRead
                | Access::MemoryWrite
                | Access::MemoryRW
        )
    }

    /// Translate this access into the synchronization state it requires.
    pub fn to_use(self) -> ResourceUse {
        use vk::AccessFlags2 as A;
        use vk::ImageLayout as L;
        use vk::PipelineStageFlags2 as S;

        let (stages, access, layout) = match self {
            Access::None => (S::NONE, A::NONE, L::UNDEFINED),
            Access::Clear => (S::CLEAR, A::TRANSFER_WRITE, L::TRANSFER_DST_OPTIMAL),
            Access::TransferRead => (S::TRANSFER, A::TRANSFER_READ, L::TRANSFER_SRC_OPTIMAL),
            Access::TransferWrite => (S::TRANSFER, A::TRANSFER_WRITE, L::TRANSFER_DST_OPTIMAL),
            Access::TransferRW => (S::TRANSFER, A::TRANSFER_READ | A::TRANSFER_WRITE, L::GENERAL),
            Access::ColorRead => (S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_READ, L::COLOR_ATTACHMENT_OPTIMAL),
            Access::ColorWrite => (S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_WRITE, L::COLOR_ATTACHMENT_OPTIMAL),
            Access::ColorRW => (
                S::COLOR_ATTACHMENT_OUTPUT,
                A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
                L::COLOR_ATTACHMENT_OPTIMAL,
            ),
            Access::DepthStencilRead => (
                S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
                A::DEPTH_STENCIL_ATTACHMENT_READ,
                L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ),
            Access::DepthStencilRW => (
                S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ),
            Access::ColorResolveRead => (S::RESOLVE, A::TRANSFER_READ, L::TRANSFER_SRC_OPTIMAL),
            Access::ColorResolveWrite => (S::RESOLVE, A::TRANSFER_WRITE, L::TRANSFER_DST_OPTIMAL),
            Access::InputRead => (S::FRAGMENT_SHADER, A::INPUT_ATTACHMENT_READ, L::SHADER_READ_ONLY_OPTIMAL),
            Access::VertexRead => (S::VERTEX_ATTRIBUTE_INPUT, A::VERTEX_ATTRIBUTE_READ, L::UNDEFINED),
            Access::IndexRead => (S::INDEX_INPUT, A::INDEX_READ, L::UNDEFINED),
            Access::IndirectRead => (S::DRAW_INDIRECT, A::INDIRECT_COMMAND_READ, L::UNDEFINED),
            Access::VertexSampled => (S::VERTEX_SHADER, A::SHADER_SAMPLED_READ, L::SHADER_READ_ONLY_OPTIMAL),
            Access::FragmentSampled => (S::FRAGMENT_SHADER, A::SHADER_SAMPLED_READ, L::SHADER_READ_ONLY_OPTIMAL),
            Access::FragmentRead => (S::FRAGMENT_SHADER, A::SHADER_STORAGE_READ, L::GENERAL),
            Access::FragmentWrite => (S::FRAGMENT_SHADER, A::SHADER_STORAGE_WRITE, L::GENERAL),
            Access::FragmentRW => (S::FRAGMENT_SHADER, A::SHADER_STORAGE_READ | A::SHADER_STORAGE_WRITE, L::GENERAL),
            Access::ComputeSampled => (S::COMPUTE_SHADER, A::SHADER_SAMPLED_READ, L::SHADER_READ_ONLY_OPTIMAL),
            Access::ComputeRead => (S::COMPUTE_SHADER, A::SHADER_STORAGE_READ, L::GENERAL),
            Access::ComputeWrite => (S::COMPUTE_SHADER, A::SHADER_STORAGE_WRITE, L::GENERAL),
            Access::ComputeRW => (S::COMPUTE_SHADER, A::SHADER_STORAGE_READ | A::SHADER_STORAGE_WRITE, L::GENERAL),
            Access::RayTracingRead => (S::RAY_TRACING_SHADER_KHR, A::SHADER_READ, L::GENERAL),
            Access::HostRead => (S::HOST, A::HOST_READ, L::GENERAL),
            Access::HostWrite => (S::HOST, A::HOST_WRITE, L::GENERAL),
            Access::HostRW => (S::HOST, A::HOST_READ | A::HOST_WRITE, L::GENERAL),
            Access::MemoryRead => (S::ALL_COMMANDS, A::MEMORY_READ, L::GENERAL),
            Access::MemoryWrite => (S::ALL_COMMANDS, A::MEMORY_WRITE, L::GENERAL),
            Access::MemoryRW => (S::ALL_COMMANDS, A::MEMORY_READ | A::MEMORY_WRITE, L::GENERAL),
            Access::Present => (S::NONE, A::NONE, L::PRESENT_SRC_KHR),
        };

        ResourceUse {
            stages,
            access,
            layout,
        }
    }

    /// Image usage flags an image needs to support this access.
    pub fn image_usage(self) -> vk::ImageUsageFlags {
        use vk::ImageUsageFlags as U;
        match self {
            Access::Clear | Access::TransferWrite | Access::ColorResolveWrite => U::TRANSFER_DST,
            Access::TransferRead | Access::ColorResolveRead => U::TRANSFER_SRC,
            Access::TransferRW => U::TRANSFER_SRC | U::TRANSFER_DST,
            Access::ColorRead | Access::ColorWrite | Access::ColorRW => U::COLOR_ATTACHMENT,
            Access::DepthStencilRead | Access::DepthStencilRW => U::DEPTH_STENCIL_ATTACHMENT,
            Access::InputRead => U::INPUT_ATTACHMENT,
            Access::VertexSampled | Access::FragmentSampled | Access::ComputeSampled => U::SAMPLED,
            Access::FragmentRead
            | Access::FragmentWrite
            | Access::FragmentRW
            | Access::ComputeRead
            | Access::ComputeWrite
            | Access::ComputeRW
            | Access::RayTracingRead => U::STORAGE,
            _ => U::empty(),
        }
    }

    /// Buffer usage flags a buffer needs to support this access.
    pub fn buffer_usage(self) -> vk::BufferUsageFlags {
        use vk::BufferUsageFlags as U;
        match self {
            Access::Clear | Access::TransferWrite => U::TRANSFER_DST,
            Access::TransferRead => U::TRANSFER_SRC,
            Access::TransferRW => U::TRANSFER_SRC | U::TRANSFER_DST,
            Access::VertexRead => U::VERTEX_BUFFER,
            Access::IndexRead => U::INDEX_BUFFER,
            Access::IndirectRead => U::INDIRECT_BUFFER,
            Access::FragmentRead
            | Access::FragmentWrite
            | Access::FragmentRW
            | Access::ComputeRead
            | Access::ComputeWrite
            | Access::ComputeRW
            | Access::RayTracingRead => U::STORAGE_BUFFER,
            _ => U::empty(),
        }
    }
}
