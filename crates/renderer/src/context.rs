//! The Vulkan device context.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use fractal_core::GpuConfig;
use fractal_platform::{Surface, Window};
use fractal_resources::ShaderPair;
use fractal_rhi::command::{CommandBuffer, CommandPool};
use fractal_rhi::device::Device;
use fractal_rhi::instance::Instance;
use fractal_rhi::physical_device::select_physical_device;
use fractal_rhi::pipeline::{GraphicsPipeline, PipelineConfig, PipelineLayout};
use fractal_rhi::swapchain::SwapChain;
use fractal_rhi::vertex::Vertex;
use fractal_rhi::{RhiError, RhiResult};
use tracing::info;

use crate::backend::DeviceContext;
use crate::mesh::Mesh;

const APP_NAME: &std::ffi::CStr = c"fractal";

/// Instance, surface, logical device and graphics command pool.
///
/// Fields drop in declaration order: the pool and the device go before the
/// surface, and the surface before the instance.
pub struct VulkanContext {
    command_pool: CommandPool,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
    fence_timeout: Duration,
}

impl VulkanContext {
    /// Brings up Vulkan for `window`.
    ///
    /// # Errors
    ///
    /// Fails if Vulkan cannot be loaded, no GPU can present to the window,
    /// or any device object cannot be created.
    pub fn new(window: &Window, gpu: &GpuConfig) -> RhiResult<Self> {
        let surface_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let instance = Instance::new(APP_NAME, gpu.validation, surface_extensions)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        info!(
            "Vulkan context ready on '{}' (validation {}, fence timeout {} ms)",
            physical_device_info.device_name(),
            if instance.has_validation() { "on" } else { "off" },
            gpu.fence_timeout_ms
        );

        Ok(Self {
            command_pool,
            device,
            surface,
            instance,
            fence_timeout: gpu.fence_timeout(),
        })
    }
}

impl DeviceContext for VulkanContext {
    type SwapChain = SwapChain;
    type PipelineLayout = PipelineLayout;
    type Pipeline = GraphicsPipeline;
    type CommandBuffer = CommandBuffer;
    type Mesh = Mesh;

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn create_swap_chain(&self, extent: vk::Extent2D) -> RhiResult<Option<SwapChain>> {
        SwapChain::new(
            &self.instance,
            self.device.clone(),
            self.surface.handle(),
            extent,
            self.fence_timeout,
        )
    }

    fn create_pipeline_layout(&self) -> RhiResult<PipelineLayout> {
        PipelineLayout::new(self.device.clone())
    }

    fn create_pipeline(
        &self,
        shaders: &ShaderPair,
        config: &PipelineConfig,
    ) -> RhiResult<GraphicsPipeline> {
        GraphicsPipeline::new(
            self.device.clone(),
            &shaders.vertex,
            &shaders.fragment,
            config,
        )
    }

    fn allocate_command_buffers(&self, count: usize) -> RhiResult<Vec<CommandBuffer>> {
        let count = u32::try_from(count).map_err(|_| {
            RhiError::InvalidHandle(format!("Cannot allocate {} command buffers", count))
        })?;
        self.command_pool.allocate_command_buffers(count)
    }

    fn free_command_buffers(&self, buffers: Vec<CommandBuffer>) {
        self.command_pool.free_command_buffers(buffers);
    }

    fn create_mesh(&self, vertices: &[Vertex]) -> RhiResult<Mesh> {
        Mesh::new(self.device.clone(), vertices)
    }
}
