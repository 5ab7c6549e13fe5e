//! Command pool and command buffer wrappers.
//!
//! A [`CommandPool`] owns the `VkCommandPool`; a [`CommandBuffer`] is a thin
//! handle for recording into one buffer allocated from it. Buffers are
//! returned to the pool explicitly with [`CommandPool::free_command_buffers`]
//! or implicitly when the pool is destroyed.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiResult;

/// Command pool whose buffers can be reset individually.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a pool for `queue_family_index` with `RESET_COMMAND_BUFFER`,
    /// so each buffer can be re-recorded every frame.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        // SAFETY: The device is live and create_info is valid for the call.
        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        info!(
            "Command pool created for queue family {}",
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Allocates `count` primary command buffers.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        // SAFETY: The pool belongs to this device.
        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };

        debug!("Allocated {} command buffer(s)", buffers.len());

        Ok(buffers
            .into_iter()
            .map(|buffer| CommandBuffer::from_handle(self.device.clone(), buffer))
            .collect())
    }

    /// Returns command buffers to the pool.
    ///
    /// The caller must ensure none of them is still pending execution.
    pub fn free_command_buffers(&self, buffers: Vec<CommandBuffer>) {
        if buffers.is_empty() {
            return;
        }

        let handles: Vec<vk::CommandBuffer> = buffers.iter().map(CommandBuffer::handle).collect();

        // SAFETY: The buffers were allocated from this pool and the caller has
        // waited for their execution to finish.
        unsafe {
            self.device
                .handle()
                .free_command_buffers(self.pool, &handles);
        }

        debug!("Freed {} command buffer(s)", handles.len());
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // SAFETY: Owners wait for device idle before the pool is dropped.
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        info!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// Recording interface for one primary command buffer.
///
/// The buffer's memory belongs to its pool; dropping this wrapper does not
/// free it.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Begins recording for a single submission. Implicitly resets the buffer.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        // SAFETY: The buffer is not pending execution; the caller waited on its fence.
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }

        Ok(())
    }

    pub fn end(&self) -> RhiResult<()> {
        // SAFETY: The buffer is in the recording state.
        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }

        Ok(())
    }

    /// Begins `render_pass` on `framebuffer` with inline subpass contents.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        // SAFETY: The framebuffer was created against a compatible render pass.
        unsafe {
            self.device.handle().cmd_begin_render_pass(
                self.buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    pub fn end_render_pass(&self) {
        // SAFETY: A render pass is active in this buffer.
        unsafe {
            self.device.handle().cmd_end_render_pass(self.buffer);
        }
    }

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        // SAFETY: The pipeline outlives the submission of this buffer.
        unsafe {
            self.device
                .handle()
                .cmd_bind_pipeline(self.buffer, bind_point, pipeline);
        }
    }

    pub fn bind_vertex_buffers(
        &self,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        // SAFETY: buffers and offsets have equal length and the buffers outlive
        // the submission.
        unsafe {
            self.device.handle().cmd_bind_vertex_buffers(
                self.buffer,
                first_binding,
                buffers,
                offsets,
            );
        }
    }

    pub fn draw(
        &self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        // SAFETY: A graphics pipeline is bound inside an active render pass.
        unsafe {
            self.device.handle().cmd_draw(
                self.buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }
}
