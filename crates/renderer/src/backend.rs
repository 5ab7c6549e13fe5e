//! Capabilities the frame controller needs from the GPU side.
//!
//! [`DeviceContext`] creates every device object the controller owns. Its
//! associated types expose just enough of each object to drive a frame, so
//! the controller can run against [`crate::VulkanContext`] or a fake without
//! a GPU.

use ash::vk;
use fractal_resources::ShaderPair;
use fractal_rhi::RhiResult;
use fractal_rhi::command::CommandBuffer;
use fractal_rhi::pipeline::{GraphicsPipeline, PipelineConfig, PipelineLayout};
use fractal_rhi::swapchain::{Acquire, SurfaceStatus, SwapChain};
use fractal_rhi::vertex::Vertex;

/// Records the commands of one frame.
pub trait CommandRecorder {
    fn handle(&self) -> vk::CommandBuffer;

    /// Starts recording, discarding previous contents.
    fn begin(&self) -> RhiResult<()>;

    fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    );

    fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline);

    /// Binds `buffer` at binding 0 with no offset.
    fn bind_vertex_buffer(&self, buffer: vk::Buffer);

    /// One non-indexed, single-instance draw from vertex 0.
    fn draw(&self, vertex_count: u32);

    fn end_render_pass(&self);

    fn end(&self) -> RhiResult<()>;
}

/// The presentable image chain for one surface extent.
pub trait SwapChainOps {
    fn extent(&self) -> vk::Extent2D;

    fn image_count(&self) -> usize;

    fn render_pass(&self) -> vk::RenderPass;

    fn framebuffer(&self, image_index: usize) -> vk::Framebuffer;

    /// Waits for a free frame slot and acquires an image whose previous
    /// work has completed.
    fn acquire_next_image(&mut self) -> RhiResult<Acquire>;

    /// Submits the recorded buffer for `image_index` and presents it.
    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<SurfaceStatus>;
}

pub trait PipelineLayoutOps {
    fn handle(&self) -> vk::PipelineLayout;
}

pub trait PipelineOps {
    fn handle(&self) -> vk::Pipeline;

    /// Extent of the baked viewport and scissor.
    fn extent(&self) -> vk::Extent2D;

    fn bind<C: CommandRecorder>(&self, command_buffer: &C) {
        command_buffer.bind_graphics_pipeline(self.handle());
    }
}

/// Immutable vertex data resident on the device.
pub trait MeshOps {
    fn vertex_buffer(&self) -> vk::Buffer;

    fn vertex_count(&self) -> u32;

    fn bind<C: CommandRecorder>(&self, command_buffer: &C) {
        command_buffer.bind_vertex_buffer(self.vertex_buffer());
    }

    fn draw<C: CommandRecorder>(&self, command_buffer: &C) {
        command_buffer.draw(self.vertex_count());
    }
}

/// Device, queues and command pool behind the frame controller.
pub trait DeviceContext {
    type SwapChain: SwapChainOps;
    type PipelineLayout: PipelineLayoutOps;
    type Pipeline: PipelineOps;
    type CommandBuffer: CommandRecorder;
    type Mesh: MeshOps;

    /// Blocks until the device has no outstanding work.
    fn wait_idle(&self) -> RhiResult<()>;

    /// Creates a swap chain for `extent`.
    ///
    /// Returns `Ok(None)` if the surface currently has a zero dimension,
    /// even when `extent` does not; nothing is created in that case.
    fn create_swap_chain(&self, extent: vk::Extent2D) -> RhiResult<Option<Self::SwapChain>>;

    fn create_pipeline_layout(&self) -> RhiResult<Self::PipelineLayout>;

    fn create_pipeline(
        &self,
        shaders: &ShaderPair,
        config: &PipelineConfig,
    ) -> RhiResult<Self::Pipeline>;

    fn allocate_command_buffers(&self, count: usize) -> RhiResult<Vec<Self::CommandBuffer>>;

    /// Returns buffers to the pool. None of them may be pending.
    fn free_command_buffers(&self, buffers: Vec<Self::CommandBuffer>);

    /// Uploads `vertices` once.
    fn create_mesh(&self, vertices: &[Vertex]) -> RhiResult<Self::Mesh>;
}

impl CommandRecorder for CommandBuffer {
    fn handle(&self) -> vk::CommandBuffer {
        CommandBuffer::handle(self)
    }

    fn begin(&self) -> RhiResult<()> {
        CommandBuffer::begin(self)
    }

    fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        CommandBuffer::begin_render_pass(self, render_pass, framebuffer, render_area, clear_values);
    }

    fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        self.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline);
    }

    fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        self.bind_vertex_buffers(0, &[buffer], &[0]);
    }

    fn draw(&self, vertex_count: u32) {
        CommandBuffer::draw(self, vertex_count, 1, 0, 0);
    }

    fn end_render_pass(&self) {
        CommandBuffer::end_render_pass(self);
    }

    fn end(&self) -> RhiResult<()> {
        CommandBuffer::end(self)
    }
}

impl SwapChainOps for SwapChain {
    fn extent(&self) -> vk::Extent2D {
        SwapChain::extent(self)
    }

    fn image_count(&self) -> usize {
        SwapChain::image_count(self)
    }

    fn render_pass(&self) -> vk::RenderPass {
        SwapChain::render_pass(self)
    }

    fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
        SwapChain::framebuffer(self, image_index)
    }

    fn acquire_next_image(&mut self) -> RhiResult<Acquire> {
        SwapChain::acquire_next_image(self)
    }

    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<SurfaceStatus> {
        SwapChain::submit(self, command_buffer, image_index)
    }
}

impl PipelineLayoutOps for PipelineLayout {
    fn handle(&self) -> vk::PipelineLayout {
        PipelineLayout::handle(self)
    }
}

impl PipelineOps for GraphicsPipeline {
    fn handle(&self) -> vk::Pipeline {
        GraphicsPipeline::handle(self)
    }

    fn extent(&self) -> vk::Extent2D {
        GraphicsPipeline::extent(self)
    }
}
