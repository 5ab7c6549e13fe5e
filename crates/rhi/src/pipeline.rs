//! Graphics pipeline management.
//!
//! - [`PipelineConfig`] holds every piece of fixed-function state
//! - [`default_pipeline_config`] produces the one supported profile for an extent
//! - [`PipelineLayout`] wraps an empty VkPipelineLayout
//! - [`GraphicsPipeline`] compiles two shader stages against a render pass
//!
//! Viewport and scissor are baked into the pipeline, so a pipeline is only
//! valid for the extent it was built with. A new swap chain needs a new pipeline.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fractal_rhi::device::Device;
//! use fractal_rhi::pipeline::{GraphicsPipeline, PipelineLayout, default_pipeline_config};
//! use ash::vk;
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     render_pass: vk::RenderPass,
//! #     vert: &[u8],
//! #     frag: &[u8],
//! # ) -> Result<(), fractal_rhi::RhiError> {
//! let layout = PipelineLayout::new(device.clone())?;
//!
//! let mut config = default_pipeline_config(800, 600);
//! config.render_pass = render_pass;
//! config.pipeline_layout = layout.handle();
//!
//! let pipeline = GraphicsPipeline::new(device, vert, frag, &config)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{Shader, ShaderStage};
use crate::vertex::Vertex;

/// Entry point used by both shader stages.
pub const SHADER_ENTRY_POINT: &str = "main";

/// Fixed-function state for a graphics pipeline.
///
/// `pipeline_layout` and `render_pass` start out null and must be filled in
/// before [`GraphicsPipeline::new`].
#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
    pub rasterization_samples: vk::SampleCountFlags,
    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    pub pipeline_layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

impl PipelineConfig {
    /// Extent covered by the scissor rectangle.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.scissor.extent
    }
}

/// Baseline configuration covering a `width` x `height` target.
///
/// Triangle list, filled, no culling, single sample, blending off, and a
/// depth test that keeps the nearer fragment.
pub fn default_pipeline_config(width: u32, height: u32) -> PipelineConfig {
    PipelineConfig {
        viewport: vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        },
        scissor: vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width, height },
        },
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart: false,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        color_blend_attachment: vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::FALSE,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        },
        depth_test: true,
        depth_write: true,
        depth_compare_op: vk::CompareOp::LESS,
        pipeline_layout: vk::PipelineLayout::null(),
        render_pass: vk::RenderPass::null(),
        subpass: 0,
    }
}

/// Pipeline layout with no descriptor sets and no push constants.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default();

        // SAFETY: The device is live and the create info is empty.
        let layout = unsafe {
            device
                .handle()
                .create_pipeline_layout(&create_info, None)
                .map_err(|e| {
                    RhiError::PipelineError(format!("Failed to create pipeline layout: {:?}", e))
                })?
        };

        debug!("Created empty pipeline layout");

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        // SAFETY: Pipelines built with this layout are gone and the device is idle.
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// A compiled graphics pipeline and its two shader modules.
///
/// Immutable; built against one render pass and one extent.
pub struct GraphicsPipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    extent: vk::Extent2D,
    // Destroyed after the pipeline.
    _vertex_shader: Shader,
    _fragment_shader: Shader,
}

impl GraphicsPipeline {
    /// Builds a pipeline from SPIR-V for the vertex and fragment stages.
    ///
    /// # Errors
    ///
    /// [`RhiError::PipelineError`] if `config` lacks a layout or render pass,
    /// or if the driver rejects the pipeline. [`RhiError::ShaderError`] for
    /// malformed SPIR-V.
    pub fn new(
        device: Arc<Device>,
        vertex_spirv: &[u8],
        fragment_spirv: &[u8],
        config: &PipelineConfig,
    ) -> RhiResult<Self> {
        check_config(config)?;

        let vertex_shader = Shader::from_spirv_bytes(
            device.clone(),
            vertex_spirv,
            ShaderStage::Vertex,
            SHADER_ENTRY_POINT,
        )?;
        let fragment_shader = Shader::from_spirv_bytes(
            device.clone(),
            fragment_spirv,
            ShaderStage::Fragment,
            SHADER_ENTRY_POINT,
        )?;

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(config.primitive_restart);

        let viewports = [config.viewport];
        let scissors = [config.scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .line_width(config.line_width)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(config.rasterization_samples)
            .min_sample_shading(1.0);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(config.depth_compare_op)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);

        let color_blend_attachments = [config.color_blend_attachment];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments)
            .blend_constants([0.0; 4]);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .layout(config.pipeline_layout)
            .render_pass(config.render_pass)
            .subpass(config.subpass)
            .base_pipeline_index(-1);

        // SAFETY: Every state struct referenced by pipeline_info lives until the call returns.
        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| {
                    RhiError::PipelineError(format!("Failed to create graphics pipeline: {:?}", e))
                })?
        };
        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            RhiError::PipelineError("Driver returned no graphics pipeline".to_string())
        })?;

        let extent = config.extent();
        info!(
            "Graphics pipeline created for {}x{}",
            extent.width, extent.height
        );

        Ok(Self {
            device,
            pipeline,
            extent,
            _vertex_shader: vertex_shader,
            _fragment_shader: fragment_shader,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Extent baked into the viewport and scissor.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        // SAFETY: The owner waits for device idle before dropping the pipeline.
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}

fn check_config(config: &PipelineConfig) -> RhiResult<()> {
    if config.pipeline_layout == vk::PipelineLayout::null() {
        return Err(RhiError::PipelineError(
            "Cannot create graphics pipeline: no pipeline layout provided in config".to_string(),
        ));
    }
    if config.render_pass == vk::RenderPass::null() {
        return Err(RhiError::PipelineError(
            "Cannot create graphics pipeline: no render pass provided in config".to_string(),
        ));
    }
    Ok(())
}
