//! Scripted stand-ins for the device context and the presentation surface.
//!
//! Both fakes share one [`World`], which records what the frame controller
//! asked for and counts live objects so tests can check for leaks.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use ash::vk;
use ash::vk::Handle;
use fractal_platform::PresentationSurface;
use fractal_renderer::{
    CommandRecorder, DeviceContext, FrameController, MeshOps, PipelineLayoutOps, PipelineOps,
    SwapChainOps,
};
use fractal_resources::{ShaderPair, sierpinski_vertices};
use fractal_rhi::pipeline::PipelineConfig;
use fractal_rhi::swapchain::{Acquire, SurfaceStatus};
use fractal_rhi::sync::FrameRing;
use fractal_rhi::vertex::Vertex;
use fractal_rhi::{RhiError, RhiResult};

pub fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

/// A recorded command, with handles kept as raw values.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Begin { buffer: usize },
    BeginRenderPass { render_pass: u64, framebuffer: u64, extent: vk::Extent2D, clear_values: usize },
    BindPipeline(u64),
    BindVertexBuffer(u64),
    Draw(u32),
    EndRenderPass,
    End { buffer: usize },
}

/// Scripted result for the next acquire.
#[derive(Debug)]
pub enum AcquireStep {
    OutOfDate,
    Suboptimal,
    Fail(vk::Result),
    /// Hands out this image instead of the next one in order.
    Image(u32),
}

/// Lifecycle events whose relative order matters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    WaitIdle,
    CreateSwapChain,
    DestroySwapChain,
    CreatePipeline,
    DestroyPipeline,
    DestroyLayout,
    DestroyMesh,
}

#[derive(Debug)]
pub struct World {
    // Surface side.
    pub surface_extent: vk::Extent2D,
    pub resized: bool,
    pub close_requested: bool,
    pub close_after_polls: Option<usize>,
    pub polls: usize,
    pub waits: usize,
    /// Extent after each successive `wait_events`; when empty a wait closes the window.
    pub extents_after_wait: VecDeque<vk::Extent2D>,

    // Device side.
    pub image_count: usize,
    pub next_handle: u64,
    pub wait_idle_calls: usize,
    pub swap_chains_created: usize,
    pub swap_chains_live: usize,
    pub zero_extent_requests: usize,
    /// Creates still to come for which the device reports a 0x0 surface.
    pub zero_surface_creates: usize,
    /// Creates refused because the device reported a 0x0 surface.
    pub refused_creates: usize,
    pub pipelines_created: usize,
    pub pipelines_live: usize,
    pub pipeline_extents: Vec<vk::Extent2D>,
    pub pipeline_render_passes: Vec<u64>,
    pub fail_pipeline: bool,
    pub layouts_live: usize,
    pub meshes_live: usize,
    pub command_buffer_allocations: usize,
    pub command_buffers_live: usize,

    // Frame traffic.
    pub acquire_script: VecDeque<AcquireStep>,
    pub submit_script: VecDeque<RhiResult<SurfaceStatus>>,
    /// Applied to the surface during the next submit.
    pub resize_on_submit: Option<vk::Extent2D>,
    /// (swap chain id, image index) per successful acquire.
    pub acquired: Vec<(usize, u32)>,
    /// (swap chain id, image index) per submit.
    pub submitted: Vec<(usize, u32)>,
    /// (swap chain id, frame slot) per fence wait.
    pub fence_waits: Vec<(usize, usize)>,
    pub commands: Vec<Command>,
    pub events: Vec<Event>,
}

impl World {
    pub fn new(surface_extent: vk::Extent2D, image_count: usize) -> Self {
        Self {
            surface_extent,
            resized: false,
            close_requested: false,
            close_after_polls: None,
            polls: 0,
            waits: 0,
            extents_after_wait: VecDeque::new(),
            image_count,
            next_handle: 0x1000,
            wait_idle_calls: 0,
            swap_chains_created: 0,
            swap_chains_live: 0,
            zero_extent_requests: 0,
            zero_surface_creates: 0,
            refused_creates: 0,
            pipelines_created: 0,
            pipelines_live: 0,
            pipeline_extents: Vec::new(),
            pipeline_render_passes: Vec::new(),
            fail_pipeline: false,
            layouts_live: 0,
            meshes_live: 0,
            command_buffer_allocations: 0,
            command_buffers_live: 0,
            acquire_script: VecDeque::new(),
            submit_script: VecDeque::new(),
            resize_on_submit: None,
            acquired: Vec::new(),
            submitted: Vec::new(),
            fence_waits: Vec::new(),
            commands: Vec::new(),
            events: Vec::new(),
        }
    }

    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Resizes the surface the way a window system would.
    pub fn resize(&mut self, new_extent: vk::Extent2D) {
        self.surface_extent = new_extent;
        self.resized = true;
    }

    pub fn draw_calls(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw(_)))
            .count()
    }
}

pub type SharedWorld = Rc<RefCell<World>>;

pub fn world(surface_extent: vk::Extent2D, image_count: usize) -> SharedWorld {
    Rc::new(RefCell::new(World::new(surface_extent, image_count)))
}

pub struct FakeSurface {
    world: SharedWorld,
}

impl PresentationSurface for FakeSurface {
    fn poll_events(&mut self) {
        let mut world = self.world.borrow_mut();
        world.polls += 1;
        if world.close_after_polls.is_some_and(|n| world.polls >= n) {
            world.close_requested = true;
        }
    }

    fn wait_events(&mut self) {
        let mut world = self.world.borrow_mut();
        world.waits += 1;
        let next = world.extents_after_wait.pop_front();
        match next {
            Some(next) => world.resize(next),
            None => world.close_requested = true,
        }
    }

    fn extent(&self) -> vk::Extent2D {
        self.world.borrow().surface_extent
    }

    fn was_resized(&self) -> bool {
        self.world.borrow().resized
    }

    fn clear_resized_flag(&mut self) {
        self.world.borrow_mut().resized = false;
    }

    fn should_close(&self) -> bool {
        self.world.borrow().close_requested
    }
}

pub struct FakeContext {
    world: SharedWorld,
}

pub struct FakeSwapChain {
    world: SharedWorld,
    id: usize,
    extent: vk::Extent2D,
    render_pass: u64,
    framebuffers: Vec<u64>,
    next_image: usize,
    ring: FrameRing,
}

pub struct FakePipelineLayout {
    world: SharedWorld,
    handle: u64,
}

pub struct FakePipeline {
    world: SharedWorld,
    handle: u64,
    extent: vk::Extent2D,
}

pub struct FakeMesh {
    world: SharedWorld,
    buffer: u64,
    vertex_count: u32,
}

pub struct FakeCommandBuffer {
    world: SharedWorld,
    index: usize,
    handle: u64,
}

impl DeviceContext for FakeContext {
    type SwapChain = FakeSwapChain;
    type PipelineLayout = FakePipelineLayout;
    type Pipeline = FakePipeline;
    type CommandBuffer = FakeCommandBuffer;
    type Mesh = FakeMesh;

    fn wait_idle(&self) -> RhiResult<()> {
        let mut world = self.world.borrow_mut();
        world.wait_idle_calls += 1;
        world.events.push(Event::WaitIdle);
        Ok(())
    }

    fn create_swap_chain(&self, extent: vk::Extent2D) -> RhiResult<Option<FakeSwapChain>> {
        let mut world = self.world.borrow_mut();
        if extent.width == 0 || extent.height == 0 {
            world.zero_extent_requests += 1;
            return Ok(None);
        }
        if world.zero_surface_creates > 0 {
            world.zero_surface_creates -= 1;
            world.refused_creates += 1;
            return Ok(None);
        }

        world.swap_chains_created += 1;
        world.swap_chains_live += 1;
        world.events.push(Event::CreateSwapChain);

        let render_pass = world.handle();
        let framebuffers = (0..world.image_count).map(|_| world.handle()).collect();

        Ok(Some(FakeSwapChain {
            world: self.world.clone(),
            id: world.swap_chains_created,
            extent,
            render_pass,
            framebuffers,
            next_image: 0,
            ring: FrameRing::new(world.image_count),
        }))
    }

    fn create_pipeline_layout(&self) -> RhiResult<FakePipelineLayout> {
        let mut world = self.world.borrow_mut();
        world.layouts_live += 1;
        Ok(FakePipelineLayout {
            world: self.world.clone(),
            handle: world.handle(),
        })
    }

    fn create_pipeline(
        &self,
        shaders: &ShaderPair,
        config: &PipelineConfig,
    ) -> RhiResult<FakePipeline> {
        let mut world = self.world.borrow_mut();
        if world.fail_pipeline {
            return Err(RhiError::PipelineError("rejected by fake driver".to_string()));
        }
        assert!(!shaders.vertex.is_empty() && !shaders.fragment.is_empty());
        assert_ne!(config.pipeline_layout, vk::PipelineLayout::null());
        assert_ne!(config.render_pass, vk::RenderPass::null());

        world.pipelines_created += 1;
        world.pipelines_live += 1;
        world.events.push(Event::CreatePipeline);
        world.pipeline_extents.push(config.scissor.extent);
        world.pipeline_render_passes.push(config.render_pass.as_raw());

        Ok(FakePipeline {
            world: self.world.clone(),
            handle: world.handle(),
            extent: config.scissor.extent,
        })
    }

    fn allocate_command_buffers(&self, count: usize) -> RhiResult<Vec<FakeCommandBuffer>> {
        let mut world = self.world.borrow_mut();
        world.command_buffer_allocations += 1;
        world.command_buffers_live += count;
        Ok((0..count)
            .map(|index| FakeCommandBuffer {
                world: self.world.clone(),
                index,
                handle: world.handle(),
            })
            .collect())
    }

    fn free_command_buffers(&self, buffers: Vec<FakeCommandBuffer>) {
        self.world.borrow_mut().command_buffers_live -= buffers.len();
    }

    fn create_mesh(&self, vertices: &[Vertex]) -> RhiResult<FakeMesh> {
        let mut world = self.world.borrow_mut();
        world.meshes_live += 1;
        Ok(FakeMesh {
            world: self.world.clone(),
            buffer: world.handle(),
            vertex_count: vertices.len() as u32,
        })
    }
}

impl SwapChainOps for FakeSwapChain {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn image_count(&self) -> usize {
        self.framebuffers.len()
    }

    fn render_pass(&self) -> vk::RenderPass {
        vk::RenderPass::from_raw(self.render_pass)
    }

    fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
        vk::Framebuffer::from_raw(self.framebuffers[image_index])
    }

    fn acquire_next_image(&mut self) -> RhiResult<Acquire> {
        let mut world = self.world.borrow_mut();
        world
            .fence_waits
            .push((self.id, self.ring.current_slot()));

        let step = world.acquire_script.pop_front();
        let (image, suboptimal) = match step {
            Some(AcquireStep::OutOfDate) => return Ok(Acquire::OutOfDate),
            Some(AcquireStep::Fail(result)) => return Err(RhiError::VulkanError(result)),
            Some(AcquireStep::Suboptimal) => (self.next_image, true),
            Some(AcquireStep::Image(index)) => (index as usize, false),
            None => (self.next_image, false),
        };

        if let Some(owner) = self.ring.owner_to_wait(image)? {
            world.fence_waits.push((self.id, owner));
        }

        let image_index = image as u32;
        self.next_image = (image + 1) % self.framebuffers.len();
        world.acquired.push((self.id, image_index));

        Ok(Acquire::Ready {
            image_index,
            suboptimal,
        })
    }

    fn submit(
        &mut self,
        _command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<SurfaceStatus> {
        self.ring.submit(image_index as usize)?;
        let mut world = self.world.borrow_mut();
        world.submitted.push((self.id, image_index));
        if let Some(new_extent) = world.resize_on_submit.take() {
            world.resize(new_extent);
        }
        world
            .submit_script
            .pop_front()
            .unwrap_or(Ok(SurfaceStatus::Optimal))
    }
}

impl Drop for FakeSwapChain {
    fn drop(&mut self) {
        let mut world = self.world.borrow_mut();
        world.swap_chains_live -= 1;
        world.events.push(Event::DestroySwapChain);
    }
}

impl PipelineLayoutOps for FakePipelineLayout {
    fn handle(&self) -> vk::PipelineLayout {
        vk::PipelineLayout::from_raw(self.handle)
    }
}

impl Drop for FakePipelineLayout {
    fn drop(&mut self) {
        let mut world = self.world.borrow_mut();
        world.layouts_live -= 1;
        world.events.push(Event::DestroyLayout);
    }
}

impl PipelineOps for FakePipeline {
    fn handle(&self) -> vk::Pipeline {
        vk::Pipeline::from_raw(self.handle)
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for FakePipeline {
    fn drop(&mut self) {
        let mut world = self.world.borrow_mut();
        world.pipelines_live -= 1;
        world.events.push(Event::DestroyPipeline);
    }
}

impl MeshOps for FakeMesh {
    fn vertex_buffer(&self) -> vk::Buffer {
        vk::Buffer::from_raw(self.buffer)
    }

    fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

impl Drop for FakeMesh {
    fn drop(&mut self) {
        let mut world = self.world.borrow_mut();
        world.meshes_live -= 1;
        world.events.push(Event::DestroyMesh);
    }
}

impl FakeCommandBuffer {
    fn record(&self, command: Command) {
        self.world.borrow_mut().commands.push(command);
    }
}

impl CommandRecorder for FakeCommandBuffer {
    fn handle(&self) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(self.handle)
    }

    fn begin(&self) -> RhiResult<()> {
        self.record(Command::Begin { buffer: self.index });
        Ok(())
    }

    fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        self.record(Command::BeginRenderPass {
            render_pass: render_pass.as_raw(),
            framebuffer: framebuffer.as_raw(),
            extent: render_area.extent,
            clear_values: clear_values.len(),
        });
    }

    fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        self.record(Command::BindPipeline(pipeline.as_raw()));
    }

    fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        self.record(Command::BindVertexBuffer(buffer.as_raw()));
    }

    fn draw(&self, vertex_count: u32) {
        self.record(Command::Draw(vertex_count));
    }

    fn end_render_pass(&self) {
        self.record(Command::EndRenderPass);
    }

    fn end(&self) -> RhiResult<()> {
        self.record(Command::End { buffer: self.index });
        Ok(())
    }
}

pub type TestController = FrameController<FakeContext, FakeSurface>;

pub fn shaders() -> ShaderPair {
    ShaderPair {
        vertex: vec![0x03, 0x02, 0x23, 0x07],
        fragment: vec![0x03, 0x02, 0x23, 0x07],
    }
}

/// Builds a controller over the fractal at its default depth.
pub fn controller(world: &SharedWorld) -> RhiResult<TestController> {
    let vertices = sierpinski_vertices(6).expect("Failed to generate fractal");
    FrameController::new(
        FakeContext {
            world: world.clone(),
        },
        FakeSurface {
            world: world.clone(),
        },
        shaders(),
        &vertices,
    )
}
