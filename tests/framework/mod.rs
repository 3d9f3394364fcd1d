#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use ash::vk;
use ash::vk::Handle;
use deimos::prelude::*;
use deimos::sync::submit_batch::SemaphoreWait;

pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

/// A command as recorded by [`MockRecorder`].
#[derive(Debug, Clone)]
pub enum Command {
    Barrier(Dependency),
    BeginRenderPass {
        render_pass: vk::RenderPass,
        image_views: Vec<vk::ImageView>,
        extent: vk::Extent2D,
        subpasses: usize,
    },
    NextSubpass,
    EndRenderPass,
    ClearImage {
        image: vk::Image,
        layout: vk::ImageLayout,
        range: vk::ImageSubresourceRange,
    },
    ResolveImage {
        src_layout: vk::ImageLayout,
        dst_layout: vk::ImageLayout,
    },
    Draw,
    Dispatch,
    CopyBuffer(vk::DeviceSize),
    BeginLabel(String),
    EndLabel,
}

impl Command {
    pub fn is_label(&self) -> bool {
        matches!(self, Command::BeginLabel(_) | Command::EndLabel)
    }
}

#[derive(Debug, Clone)]
pub struct Recording {
    pub domain: Domain,
    pub handle: vk::CommandBuffer,
    pub commands: Vec<Command>,
}

pub type Log = Arc<Mutex<Vec<Recording>>>;

pub struct MockRecorder {
    recording: Recording,
    log: Log,
}

impl CommandRecorder for MockRecorder {
    fn handle(&self) -> vk::CommandBuffer {
        self.recording.handle
    }

    fn pipeline_barrier(&mut self, dependency: &Dependency) -> Result<()> {
        self.recording.commands.push(Command::Barrier(dependency.clone()));
        Ok(())
    }

    fn begin_render_pass(&mut self, info: &RenderPassBegin) -> Result<()> {
        self.recording.commands.push(Command::BeginRenderPass {
            render_pass: info.render_pass,
            image_views: info.image_views.clone(),
            extent: info.extent,
            subpasses: info.desc.subpasses.len(),
        });
        Ok(())
    }

    fn next_subpass(&mut self) -> Result<()> {
        self.recording.commands.push(Command::NextSubpass);
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<()> {
        self.recording.commands.push(Command::EndRenderPass);
        Ok(())
    }

    fn clear_image(&mut self, image: &ImageAttachment, layout: vk::ImageLayout, _clear: &Clear, range: vk::ImageSubresourceRange) -> Result<()> {
        self.recording.commands.push(Command::ClearImage {
            image: image.image,
            layout,
            range,
        });
        Ok(())
    }

    fn resolve_image(
        &mut self,
        _src: &ImageAttachment,
        src_layout: vk::ImageLayout,
        _dst: &ImageAttachment,
        dst_layout: vk::ImageLayout,
    ) -> Result<()> {
        self.recording.commands.push(Command::ResolveImage {
            src_layout,
            dst_layout,
        });
        Ok(())
    }

    fn draw(&mut self, _vertex_count: u32, _instance_count: u32, _first_vertex: u32, _first_instance: u32) -> Result<()> {
        self.recording.commands.push(Command::Draw);
        Ok(())
    }

    fn dispatch(&mut self, _x: u32, _y: u32, _z: u32) -> Result<()> {
        self.recording.commands.push(Command::Dispatch);
        Ok(())
    }

    fn copy_buffer(&mut self, _src: &Buffer, _dst: &Buffer, size: vk::DeviceSize) -> Result<()> {
        self.recording.commands.push(Command::CopyBuffer(size));
        Ok(())
    }

    fn begin_label(&mut self, name: &str, _color: [f32; 4]) -> Result<()> {
        self.recording.commands.push(Command::BeginLabel(name.to_owned()));
        Ok(())
    }

    fn end_label(&mut self) -> Result<()> {
        self.recording.commands.push(Command::EndLabel);
        Ok(())
    }

    fn finish(&mut self) -> Result<vk::CommandBuffer> {
        let recording = Recording {
            domain: self.recording.domain,
            handle: self.recording.handle,
            commands: std::mem::take(&mut self.recording.commands),
        };
        let handle = recording.handle;
        self.log.lock().unwrap().push(recording);
        Ok(handle)
    }
}

/// Allocator handing out fake handles, and remembering everything it was asked for.
#[derive(Debug, Default)]
pub struct MockAllocator {
    pub log: Log,
    pub images: Vec<(String, ImageAttachment)>,
    pub buffers: Vec<(String, Buffer, vk::BufferUsageFlags)>,
    pub render_passes: Vec<RenderPassDesc>,
    pub destroyed: Vec<vk::RenderPass>,
    pub fail_on: Option<String>,
    next_handle: u64,
}

impl MockAllocator {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            ..Default::default()
        }
    }

    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    pub fn image(&self, name: &str) -> Option<&ImageAttachment> {
        self.images
            .iter()
            .find(|(allocated, _)| allocated == name)
            .map(|(_, image)| image)
    }

    pub fn recordings(&self) -> Vec<Recording> {
        self.log.lock().unwrap().clone()
    }

    /// All commands recorded on a domain, in order, without debug labels.
    pub fn commands(&self, domain: Domain) -> Vec<Command> {
        self.recordings()
            .into_iter()
            .filter(|recording| recording.domain == domain)
            .flat_map(|recording| recording.commands)
            .filter(|command| !command.is_label())
            .collect()
    }

    pub fn barriers(&self, domain: Domain) -> Vec<Dependency> {
        self.commands(domain)
            .into_iter()
            .filter_map(|command| match command {
                Command::Barrier(dependency) => Some(dependency),
                _ => None,
            })
            .collect()
    }
}

impl Allocator for MockAllocator {
    fn allocate_image(&mut self, name: &str, info: &ImageAttachment) -> Result<ImageAttachment> {
        if self.fail_on.as_deref() == Some(name) {
            bail!("out of device memory");
        }
        let mut image = info.clone();
        image.image = vk::Image::from_raw(self.next());
        image.image_view = vk::ImageView::from_raw(self.next());
        self.images.push((name.to_owned(), image.clone()));
        Ok(image)
    }

    fn allocate_buffer(&mut self, name: &str, info: &Buffer, usage: vk::BufferUsageFlags) -> Result<Buffer> {
        if self.fail_on.as_deref() == Some(name) {
            bail!("out of device memory");
        }
        let mut buffer = info.clone();
        buffer.buffer = vk::Buffer::from_raw(self.next());
        self.buffers.push((name.to_owned(), buffer.clone(), usage));
        Ok(buffer)
    }

    fn allocate_command_buffer(&mut self, domain: Domain) -> Result<Box<dyn CommandRecorder>> {
        Ok(Box::new(MockRecorder {
            recording: Recording {
                domain,
                handle: vk::CommandBuffer::from_raw(self.next()),
                commands: vec![],
            },
            log: self.log.clone(),
        }))
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<vk::RenderPass> {
        self.render_passes.push(desc.clone());
        Ok(vk::RenderPass::from_raw(self.next()))
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.destroyed.push(render_pass);
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub domain: Domain,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub waits: Vec<SemaphoreWait>,
    pub signal: Option<u64>,
    pub swapchains: usize,
}

/// Device queues that only track timeline values.
#[derive(Debug, Default)]
pub struct MockQueues {
    pub timelines: [u64; 3],
    pub submissions: Vec<Submission>,
}

impl DeviceQueues for MockQueues {
    fn timeline_value(&self, domain: Domain) -> u64 {
        self.timelines[domain.index()]
    }

    fn submit(&mut self, domain: Domain, submit: QueueSubmit<'_>) -> Result<()> {
        if let Some(value) = submit.signal {
            self.timelines[domain.index()] = value;
        }
        self.submissions.push(Submission {
            domain,
            command_buffers: submit.command_buffers.to_vec(),
            waits: submit.waits,
            signal: submit.signal,
            swapchains: submit.swapchains.len(),
        });
        Ok(())
    }
}

pub fn color_target(width: u32, height: u32) -> ImageAttachment {
    ImageAttachment::new()
        .with_extent(width, height, 1)
        .with_format(vk::Format::R8G8B8A8_UNORM)
        .with_samples(vk::SampleCountFlags::TYPE_1)
}

pub fn compile(graphs: Vec<RenderGraph>) -> Result<Compiler> {
    let mut compiler = Compiler::new();
    compiler.compile(graphs, &CompileOptions::default())?;
    Ok(compiler)
}

/// Index of the first pass with the given name.
pub fn pass_index(compiler: &Compiler, name: &str) -> Result<usize> {
    match compiler.get_passes()?.iter().position(|pass| pass.name().as_str() == name) {
        Some(index) => Ok(index),
        None => bail!("no pass named `{}`", name),
    }
}

pub fn compile_errors(err: &anyhow::Error) -> Vec<CompileError> {
    err.downcast_ref::<Error>()
        .map(|err| err.compile_errors().to_vec())
        .unwrap_or_default()
}
