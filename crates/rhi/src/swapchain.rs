//! Swap chain management.
//!
//! A [`SwapChain`] owns everything tied to one surface extent: the presentable
//! images and their views, a render pass, one depth buffer and framebuffer per
//! image, and a ring of [`MAX_FRAMES_IN_FLIGHT`] synchronization slots. It is
//! never resized; a new extent means a new swap chain.
//!
//! Per-frame protocol:
//!
//! 1. [`SwapChain::acquire_next_image`] waits on the current slot's fence,
//!    acquires an image, then waits on whichever fence last used that image.
//! 2. The caller records into the command buffer for that image.
//! 3. [`SwapChain::submit`] submits the buffer, presents the image and
//!    advances the slot.
//!
//! `VK_ERROR_OUT_OF_DATE_KHR` and `VK_SUBOPTIMAL_KHR` are reported as values,
//! never as errors.

use std::sync::Arc;
use std::time::Duration;

use ash::prelude::VkResult;
use ash::vk;
use tracing::{debug, info, warn};

use crate::depth_buffer::{DepthBuffer, find_depth_format};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::SwapchainSupport;
use crate::render_pass::{Framebuffer, RenderPass};
use crate::sync::{FrameRing, FrameSync, MAX_FRAMES_IN_FLIGHT, check_wait, timeout_nanos};

/// Outcome of acquiring the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    /// The image may be rendered to; `suboptimal` advises a rebuild soon.
    Ready { image_index: u32, suboptimal: bool },
    /// The surface changed; the swap chain must be rebuilt before any rendering.
    OutOfDate,
}

/// How well the swap chain still matches the surface after presenting.
///
/// Ordered by severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SurfaceStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

/// Presentable image chain with its render targets and frame synchronization.
pub struct SwapChain {
    // Dropped in declaration order after `Drop::drop` runs.
    framebuffers: Vec<Framebuffer>,
    depth_buffers: Vec<DepthBuffer>,
    render_pass: RenderPass,
    frames: Vec<FrameSync>,
    ring: FrameRing,
    image_views: Vec<vk::ImageView>,
    images: Vec<vk::Image>,
    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    device: Arc<Device>,
    format: vk::Format,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    fence_timeout: Duration,
}

impl SwapChain {
    /// Creates a swap chain for `surface` sized as close to `extent` as the surface allows.
    ///
    /// Returns `Ok(None)` without creating anything when either the requested
    /// extent or the surface's current extent has a zero dimension, as happens
    /// while a window is minimized.
    ///
    /// # Errors
    ///
    /// Fails if the surface offers no format or present mode, or if any
    /// Vulkan object cannot be created.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        fence_timeout: Duration,
    ) -> RhiResult<Option<Self>> {
        if is_zero(extent) {
            debug!(
                "Requested extent {}x{} is empty, not creating a swap chain",
                extent.width, extent.height
            );
            return Ok(None);
        }

        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let support = SwapchainSupport::query(device.physical_device(), surface, &surface_loader)?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let Some(extent) = choose_extent(&support.capabilities, extent) else {
            let current = support.capabilities.current_extent;
            debug!(
                "Surface reports a {}x{} extent, not creating a swap chain",
                current.width, current.height
            );
            return Ok(None);
        };
        let image_count = determine_image_count(&support.capabilities);

        let queue_families = *device.queue_families();
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::SwapchainError(
                "Device has no graphics or present queue".to_string(),
            ));
        };
        let family_indices = [graphics_family, present_family];
        let (sharing_mode, shared_families) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, &family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        // SAFETY: surface belongs to the instance and create_info is valid.
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        let depth_format = match find_depth_format(&device) {
            Ok(format) => format,
            Err(e) => {
                // SAFETY: Nothing references the swapchain yet.
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        let render_pass = match RenderPass::new(device.clone(), surface_format.format, depth_format)
        {
            Ok(render_pass) => render_pass,
            Err(e) => {
                // SAFETY: Nothing references the swapchain yet.
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        // From here on, a failure drops `chain`, which releases what exists so far.
        let mut chain = Self {
            framebuffers: Vec::new(),
            depth_buffers: Vec::new(),
            render_pass,
            frames: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            ring: FrameRing::new(0),
            image_views: Vec::new(),
            images: Vec::new(),
            swapchain,
            swapchain_loader,
            device,
            format: surface_format.format,
            depth_format,
            extent,
            present_mode,
            fence_timeout,
        };

        // SAFETY: swapchain was created above.
        chain.images = unsafe { chain.swapchain_loader.get_swapchain_images(chain.swapchain)? };
        chain.create_image_views()?;
        chain.create_depth_buffers()?;
        chain.create_framebuffers()?;
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            chain.frames.push(FrameSync::new(chain.device.clone())?);
        }
        chain.ring = FrameRing::new(chain.images.len());

        info!(
            "Swap chain created: {}x{}, {} images, format {:?}, depth {:?}, present mode {:?}",
            extent.width,
            extent.height,
            chain.images.len(),
            chain.format,
            chain.depth_format,
            chain.present_mode
        );

        Ok(Some(chain))
    }

    /// Waits for the current frame slot, then acquires the next image.
    ///
    /// On success the image's previous work has also finished, so its
    /// command buffer may be re-recorded.
    ///
    /// # Errors
    ///
    /// [`RhiError::Timeout`] if a wait exceeds the fence timeout; any other
    /// Vulkan failure is returned as is.
    pub fn acquire_next_image(&mut self) -> RhiResult<Acquire> {
        let frame = &self.frames[self.ring.current_slot()];
        frame.in_flight().wait(self.fence_timeout)?;

        // SAFETY: The semaphore is unsignaled; the slot's previous use completed.
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_nanos(self.fence_timeout),
                frame.image_available().handle(),
                vk::Fence::null(),
            )
        };

        let acquire = acquire_status(result, self.fence_timeout)?;
        if let Acquire::Ready { image_index, .. } = acquire {
            if let Some(owner) = self.ring.owner_to_wait(image_index as usize)? {
                self.frames[owner].in_flight().wait(self.fence_timeout)?;
            }
        }

        Ok(acquire)
    }

    /// Submits `command_buffer` for `image_index` and presents the image.
    ///
    /// Advances the frame slot whether or not presentation succeeded.
    pub fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<SurfaceStatus> {
        let slot = self.ring.submit(image_index as usize)?;
        let frame = &self.frames[slot];
        frame.in_flight().reset()?;

        let wait_semaphores = [frame.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished().handle()];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: The command buffer finished recording and every handle is alive.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.in_flight().handle())?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: The image was acquired from this swapchain and rendering signals
        // the semaphore presentation waits on.
        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        };

        present_status(result)
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Framebuffer for image `index`.
    #[inline]
    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index].handle()
    }

    fn create_image_views(&mut self) -> RhiResult<()> {
        for (i, &image) in self.images.iter().enumerate() {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            // SAFETY: image belongs to this swapchain.
            let view = unsafe {
                self.device
                    .handle()
                    .create_image_view(&create_info, None)
                    .map_err(|e| {
                        RhiError::SwapchainError(format!(
                            "Failed to create image view {}: {:?}",
                            i, e
                        ))
                    })?
            };
            self.image_views.push(view);
        }

        debug!("Created {} image views", self.image_views.len());
        Ok(())
    }

    fn create_depth_buffers(&mut self) -> RhiResult<()> {
        for _ in 0..self.images.len() {
            self.depth_buffers.push(DepthBuffer::new(
                self.device.clone(),
                self.extent,
                self.depth_format,
            )?);
        }
        Ok(())
    }

    fn create_framebuffers(&mut self) -> RhiResult<()> {
        for (view, depth) in self.image_views.iter().zip(&self.depth_buffers) {
            self.framebuffers.push(Framebuffer::new(
                self.device.clone(),
                &self.render_pass,
                *view,
                depth.image_view(),
                self.extent,
            )?);
        }
        debug!("Created {} framebuffers", self.framebuffers.len());
        Ok(())
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        // Framebuffers reference the views, which reference the swapchain images.
        self.framebuffers.clear();

        // SAFETY: The owner waited for device idle before dropping the swap chain.
        unsafe {
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }

        info!(
            "Swap chain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Maps the result of `vkAcquireNextImageKHR`.
fn acquire_status(result: VkResult<(u32, bool)>, timeout: Duration) -> RhiResult<Acquire> {
    match result {
        Ok((image_index, suboptimal)) => Ok(Acquire::Ready {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::OutOfDate),
        Err(e) => check_wait(Err(e), "image acquisition", timeout),
    }
}

/// Maps the result of `vkQueuePresentKHR`.
fn present_status(result: VkResult<bool>) -> RhiResult<SurfaceStatus> {
    match result {
        Ok(false) => Ok(SurfaceStatus::Optimal),
        Ok(true) => Ok(SurfaceStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let find = |format: vk::Format| {
        formats
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    };

    if let Some(format) = find(vk::Format::B8G8R8A8_SRGB) {
        return format;
    }

    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format: B8G8R8A8_UNORM with SRGB_NONLINEAR");
        return format;
    }

    let first = formats.first().copied().unwrap_or_default();
    warn!("Using first available surface format: {:?}", first.format);
    first
}

fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        debug!("Selected MAILBOX present mode");
        return vk::PresentModeKHR::MAILBOX;
    }

    // Always available.
    debug!("Selected FIFO present mode (vsync)");
    vk::PresentModeKHR::FIFO
}

/// Picks the image extent, or `None` if the surface cannot take a non-empty one.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> Option<vk::Extent2D> {
    if capabilities.current_extent.width != u32::MAX {
        let current = capabilities.current_extent;
        return (!is_zero(current)).then_some(current);
    }

    let clamped = vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };
    (!is_zero(clamped)).then_some(clamped)
}

#[inline]
fn is_zero(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    // A max of 0 means no limit.
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_surface_format_prefers_srgb() {
        let formats = [
            srgb(vk::Format::R8G8B8A8_UNORM),
            srgb(vk::Format::B8G8R8A8_UNORM),
            srgb(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn test_surface_format_fallbacks() {
        let formats = [
            srgb(vk::Format::R8G8B8A8_UNORM),
            srgb(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_UNORM
        );

        let formats = [srgb(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_present_mode() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);

        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_extent_follows_current_extent() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1024, 768),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };
        assert_eq!(
            choose_extent(&capabilities, extent(800, 600)),
            Some(extent(1024, 768))
        );
    }

    #[test]
    fn test_extent_clamped_when_surface_defers() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(100, 100),
            max_image_extent: extent(2000, 2000),
            ..Default::default()
        };
        assert_eq!(
            choose_extent(&capabilities, extent(800, 600)),
            Some(extent(800, 600))
        );
        assert_eq!(
            choose_extent(&capabilities, extent(50, 3000)),
            Some(extent(100, 2000))
        );
    }

    #[test]
    fn test_extent_of_minimized_surface_is_refused() {
        // What a minimized window reports: current, min and max all 0x0.
        let minimized = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(0, 0),
            min_image_extent: extent(0, 0),
            max_image_extent: extent(0, 0),
            ..Default::default()
        };
        assert_eq!(choose_extent(&minimized, extent(800, 600)), None);

        let collapsed_height = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(800, 0),
            ..minimized
        };
        assert_eq!(choose_extent(&collapsed_height, extent(800, 600)), None);

        let deferred_but_empty = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(0, 0),
            max_image_extent: extent(0, 0),
            ..Default::default()
        };
        assert_eq!(choose_extent(&deferred_but_empty, extent(800, 600)), None);
    }

    #[test]
    fn test_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let unlimited = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unlimited), 3);
    }

    #[test]
    fn test_acquire_status() {
        let timeout = Duration::from_secs(1);
        assert_eq!(
            acquire_status(Ok((2, false)), timeout).unwrap(),
            Acquire::Ready {
                image_index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            acquire_status(Ok((0, true)), timeout).unwrap(),
            Acquire::Ready {
                image_index: 0,
                suboptimal: true
            }
        );
        assert_eq!(
            acquire_status(Err(vk::Result::ERROR_OUT_OF_DATE_KHR), timeout).unwrap(),
            Acquire::OutOfDate
        );
        assert!(matches!(
            acquire_status(Err(vk::Result::TIMEOUT), timeout),
            Err(RhiError::Timeout(_))
        ));
        assert!(matches!(
            acquire_status(Err(vk::Result::ERROR_SURFACE_LOST_KHR), timeout),
            Err(RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
    }

    #[test]
    fn test_present_status() {
        assert_eq!(present_status(Ok(false)).unwrap(), SurfaceStatus::Optimal);
        assert_eq!(present_status(Ok(true)).unwrap(), SurfaceStatus::Suboptimal);
        assert_eq!(
            present_status(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            SurfaceStatus::OutOfDate
        );
        assert!(present_status(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn test_surface_status_severity() {
        assert!(SurfaceStatus::Optimal < SurfaceStatus::Suboptimal);
        assert!(SurfaceStatus::Suboptimal < SurfaceStatus::OutOfDate);
        assert_eq!(
            SurfaceStatus::Suboptimal.max(SurfaceStatus::OutOfDate),
            SurfaceStatus::OutOfDate
        );
    }
}
