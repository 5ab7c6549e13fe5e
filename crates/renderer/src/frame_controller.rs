//! The render loop.
//!
//! [`FrameController`] owns every per-surface object and drives one frame at a
//! time through acquire, record and submit. Staleness reported by the swap
//! chain and resizes reported by the surface both feed a single
//! [`RebuildRequest`], checked once per frame.
//!
//! Rebuild order matters: the pipeline references the swap chain's render
//! pass, so it is dropped first and created last.

use ash::vk;
use fractal_core::FrameStats;
use fractal_platform::PresentationSurface;
use fractal_resources::ShaderPair;
use fractal_rhi::pipeline::default_pipeline_config;
use fractal_rhi::swapchain::{Acquire, SurfaceStatus};
use fractal_rhi::vertex::Vertex;
use fractal_rhi::{RhiError, RhiResult};
use tracing::{debug, error, info, trace};

use crate::backend::{
    CommandRecorder, DeviceContext, MeshOps, PipelineLayoutOps, PipelineOps, SwapChainOps,
};

/// Background color behind the fractal.
pub const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

/// Where the controller is within a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    Submitting,
    Rebuilding,
}

/// Pending need to rebuild the swap chain, ordered by urgency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum RebuildRequest {
    #[default]
    None,
    /// Still presentable; rebuild after the current frame.
    Stale,
    /// No further work may target the current swap chain.
    OutOfDate,
}

impl RebuildRequest {
    /// Keeps the more urgent of the two requests.
    #[inline]
    pub fn escalate(self, other: RebuildRequest) -> RebuildRequest {
        self.max(other)
    }

    #[inline]
    pub fn is_pending(self) -> bool {
        self != RebuildRequest::None
    }
}

impl From<SurfaceStatus> for RebuildRequest {
    fn from(status: SurfaceStatus) -> Self {
        match status {
            SurfaceStatus::Optimal => RebuildRequest::None,
            SurfaceStatus::Suboptimal => RebuildRequest::Stale,
            SurfaceStatus::OutOfDate => RebuildRequest::OutOfDate,
        }
    }
}

/// What one call to [`FrameController::run_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was presented and the swap chain is still current.
    Presented,
    /// The swap chain was rebuilt; `presented` tells whether a frame went out first.
    Rebuilt { presented: bool },
    /// The surface asked to close; nothing was drawn.
    Closed,
}

/// Clear values for the color and depth attachments, in attachment order.
pub fn clear_values() -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

/// Owns the device context, the surface and everything built on them.
///
/// Fields drop in declaration order after [`Drop::drop`] has waited for the
/// device: pipeline, swap chain, layout and mesh, then the context and
/// finally the surface.
pub struct FrameController<D: DeviceContext, S: PresentationSurface> {
    command_buffers: Vec<D::CommandBuffer>,
    pipeline: Option<D::Pipeline>,
    swap_chain: Option<D::SwapChain>,
    pipeline_layout: D::PipelineLayout,
    mesh: D::Mesh,
    shaders: ShaderPair,
    context: D,
    surface: S,
    state: FrameState,
    rebuild: RebuildRequest,
    stats: FrameStats,
}

impl<D: DeviceContext, S: PresentationSurface> FrameController<D, S> {
    /// Uploads the mesh and builds the first swap chain and pipeline.
    ///
    /// If the surface is closed while still zero-sized, the controller is
    /// returned without a swap chain and [`Self::run_frame`] reports
    /// [`FrameOutcome::Closed`].
    ///
    /// # Errors
    ///
    /// Any failure creating the layout, mesh, swap chain, pipeline or
    /// command buffers.
    pub fn new(context: D, surface: S, shaders: ShaderPair, vertices: &[Vertex]) -> RhiResult<Self> {
        let pipeline_layout = context.create_pipeline_layout()?;
        let mesh = context.create_mesh(vertices)?;

        let mut controller = Self {
            command_buffers: Vec::new(),
            pipeline: None,
            swap_chain: None,
            pipeline_layout,
            mesh,
            shaders,
            context,
            surface,
            state: FrameState::Idle,
            rebuild: RebuildRequest::None,
            stats: FrameStats::new(FrameStats::DEFAULT_INTERVAL),
        };

        controller.recreate_swap_chain()?;

        info!(
            "Frame controller ready: {} vertices, {} command buffers",
            controller.mesh.vertex_count(),
            controller.command_buffers.len()
        );

        Ok(controller)
    }

    /// Runs frames until the surface asks to close.
    pub fn run(&mut self) -> RhiResult<()> {
        info!("Entering render loop");

        loop {
            if self.run_frame()? == FrameOutcome::Closed {
                break;
            }
        }

        info!(
            "Render loop finished after {} frames",
            self.stats.total_frames()
        );

        // Let in-flight frames retire before the caller starts tearing down.
        self.context.wait_idle()
    }

    /// Polls the surface and draws one frame.
    ///
    /// # Errors
    ///
    /// Anything other than an out-of-date or suboptimal swap chain is fatal
    /// and returned as is.
    pub fn run_frame(&mut self) -> RhiResult<FrameOutcome> {
        self.surface.poll_events();
        if self.surface.should_close() {
            return Ok(FrameOutcome::Closed);
        }

        if self.swap_chain.is_none() {
            // A previous rebuild was interrupted by a close request.
            return self.rebuild_now(false);
        }

        self.draw_frame()
    }

    /// Replaces the swap chain and pipeline with ones matching the surface.
    ///
    /// Blocks on window events while the surface has a zero dimension,
    /// whether the window reports it or the device does. Returns `false` if
    /// the surface asked to close during that wait, in which case no new
    /// swap chain exists.
    pub fn recreate_swap_chain(&mut self) -> RhiResult<bool> {
        self.set_state(FrameState::Rebuilding);

        let swap_chain = loop {
            while self.surface.is_degenerate() {
                if !self.wait_for_surface() {
                    return Ok(false);
                }
            }

            self.context.wait_idle()?;

            // The pipeline was built against the old render pass.
            self.pipeline = None;
            self.swap_chain = None;

            match self.context.create_swap_chain(self.surface.extent())? {
                Some(swap_chain) => break swap_chain,
                None => {
                    debug!("Device reports a zero-sized surface");
                    if !self.wait_for_surface() {
                        return Ok(false);
                    }
                }
            }
        };
        let extent = swap_chain.extent();

        let mut config = default_pipeline_config(extent.width, extent.height);
        config.render_pass = swap_chain.render_pass();
        config.pipeline_layout = self.pipeline_layout.handle();
        let pipeline = self.context.create_pipeline(&self.shaders, &config)?;

        let image_count = swap_chain.image_count();
        if self.command_buffers.len() != image_count {
            let old = std::mem::take(&mut self.command_buffers);
            if !old.is_empty() {
                debug!(
                    "Image count changed from {} to {}, reallocating command buffers",
                    old.len(),
                    image_count
                );
                self.context.free_command_buffers(old);
            }
            self.command_buffers = self.context.allocate_command_buffers(image_count)?;
        }

        self.swap_chain = Some(swap_chain);
        self.pipeline = Some(pipeline);
        self.rebuild = RebuildRequest::None;
        self.surface.clear_resized_flag();

        debug!(
            "Swap chain rebuilt at {}x{} with {} images",
            extent.width, extent.height, image_count
        );
        self.set_state(FrameState::Idle);

        Ok(true)
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    pub fn rebuild_request(&self) -> RebuildRequest {
        self.rebuild
    }

    /// Extent of the current swap chain, if there is one.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swap_chain.as_ref().map(SwapChainOps::extent)
    }

    /// Extent baked into the current pipeline, if there is one.
    pub fn pipeline_extent(&self) -> Option<vk::Extent2D> {
        self.pipeline.as_ref().map(PipelineOps::extent)
    }

    pub fn frames_presented(&self) -> u64 {
        self.stats.total_frames()
    }

    fn draw_frame(&mut self) -> RhiResult<FrameOutcome> {
        self.set_state(FrameState::Acquiring);

        let acquire = self
            .swap_chain
            .as_mut()
            .ok_or_else(missing_swap_chain)?
            .acquire_next_image()?;

        let image_index = match acquire {
            Acquire::OutOfDate => {
                debug!("Swap chain out of date on acquire, rebuilding");
                self.request_rebuild(RebuildRequest::OutOfDate);
                return self.rebuild_now(false);
            }
            Acquire::Ready {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    debug!("Swap chain suboptimal on acquire, rebuilding after present");
                    self.request_rebuild(RebuildRequest::Stale);
                }
                image_index
            }
        };

        self.set_state(FrameState::Recording);
        self.record_command_buffer(image_index)?;

        self.set_state(FrameState::Submitting);
        let command_buffer = self
            .command_buffers
            .get(image_index as usize)
            .map(CommandRecorder::handle)
            .ok_or_else(|| missing_command_buffer(image_index))?;
        let status = self
            .swap_chain
            .as_mut()
            .ok_or_else(missing_swap_chain)?
            .submit(command_buffer, image_index)?;

        if let Some(report) = self.stats.record_frame() {
            debug!(
                "{:.1} fps ({} frames in {:.2}s)",
                report.fps,
                report.frames,
                report.elapsed.as_secs_f32()
            );
        }

        if status != SurfaceStatus::Optimal {
            debug!("Present reported {:?}", status);
            self.request_rebuild(status.into());
        }
        if self.surface.was_resized() {
            debug!("Surface resized since last frame");
            self.surface.clear_resized_flag();
            self.request_rebuild(RebuildRequest::Stale);
        }

        if self.rebuild.is_pending() {
            return self.rebuild_now(true);
        }

        self.set_state(FrameState::Idle);
        Ok(FrameOutcome::Presented)
    }

    /// Blocks for one batch of window events. Returns `false` if the surface
    /// asked to close instead.
    fn wait_for_surface(&mut self) -> bool {
        if !self.surface.should_close() {
            let extent = self.surface.extent();
            debug!(
                "Surface is {}x{}, waiting for events",
                extent.width, extent.height
            );
            self.surface.wait_events();
        }

        if self.surface.should_close() {
            debug!("Close requested while the surface is zero-sized");
            self.set_state(FrameState::Idle);
            return false;
        }
        true
    }

    fn rebuild_now(&mut self, presented: bool) -> RhiResult<FrameOutcome> {
        if self.recreate_swap_chain()? {
            Ok(FrameOutcome::Rebuilt { presented })
        } else {
            Ok(FrameOutcome::Closed)
        }
    }

    fn record_command_buffer(&self, image_index: u32) -> RhiResult<()> {
        let swap_chain = self.swap_chain.as_ref().ok_or_else(missing_swap_chain)?;
        let pipeline = self.pipeline.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("No pipeline to record with".to_string())
        })?;
        let command_buffer = self
            .command_buffers
            .get(image_index as usize)
            .ok_or_else(|| missing_command_buffer(image_index))?;

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: swap_chain.extent(),
        };
        let clear_values = clear_values();

        command_buffer.begin()?;
        command_buffer.begin_render_pass(
            swap_chain.render_pass(),
            swap_chain.framebuffer(image_index as usize),
            render_area,
            &clear_values,
        );
        pipeline.bind(command_buffer);
        self.mesh.bind(command_buffer);
        self.mesh.draw(command_buffer);
        command_buffer.end_render_pass();
        command_buffer.end()
    }

    fn request_rebuild(&mut self, request: RebuildRequest) {
        self.rebuild = self.rebuild.escalate(request);
    }

    fn set_state(&mut self, state: FrameState) {
        if self.state != state {
            trace!("Frame state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

impl<D: DeviceContext, S: PresentationSurface> Drop for FrameController<D, S> {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            error!("Failed to wait for device idle during shutdown: {}", e);
        }

        let buffers = std::mem::take(&mut self.command_buffers);
        if !buffers.is_empty() {
            self.context.free_command_buffers(buffers);
        }

        debug!("Frame controller shut down");
    }
}

fn missing_swap_chain() -> RhiError {
    RhiError::InvalidHandle("No swap chain to render with".to_string())
}

fn missing_command_buffer(image_index: u32) -> RhiError {
    RhiError::InvalidHandle(format!("No command buffer for image {}", image_index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebuild_request_escalates() {
        let none = RebuildRequest::None;
        let stale = RebuildRequest::Stale;
        let out_of_date = RebuildRequest::OutOfDate;

        assert_eq!(none.escalate(stale), stale);
        assert_eq!(stale.escalate(none), stale);
        assert_eq!(stale.escalate(out_of_date), out_of_date);
        assert_eq!(out_of_date.escalate(stale), out_of_date);
        assert!(!none.is_pending());
        assert!(stale.is_pending());
    }

    #[test]
    fn test_rebuild_request_from_status() {
        assert_eq!(
            RebuildRequest::from(SurfaceStatus::Optimal),
            RebuildRequest::None
        );
        assert_eq!(
            RebuildRequest::from(SurfaceStatus::Suboptimal),
            RebuildRequest::Stale
        );
        assert_eq!(
            RebuildRequest::from(SurfaceStatus::OutOfDate),
            RebuildRequest::OutOfDate
        );
    }

    #[test]
    fn test_clear_values() {
        let values = clear_values();

        // SAFETY: Each union member read is the one written.
        let (color, depth) = unsafe { (values[0].color.float32, values[1].depth_stencil) };
        assert_eq!(color, [0.1, 0.1, 0.1, 1.0]);
        assert_eq!(depth.depth, 1.0);
        assert_eq!(depth.stencil, 0);
    }
}
