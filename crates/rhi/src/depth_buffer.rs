//! Depth buffer management.
//!
//! A [`DepthBuffer`] is a GPU-only depth image with its view. The format is
//! the first of [`DEPTH_FORMAT_CANDIDATES`] the device can use as an
//! optimal-tiling depth attachment.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Picks the first candidate whose optimal-tiling features include depth attachment use.
pub fn choose_depth_format(
    candidates: &[vk::Format],
    mut properties: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        properties(format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

/// The depth format this device supports.
///
/// # Errors
///
/// Returns [`RhiError::SwapchainError`] if no candidate is supported.
pub fn find_depth_format(device: &Device) -> RhiResult<vk::Format> {
    choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
        device.format_properties(format)
    })
    .ok_or_else(|| RhiError::SwapchainError("No supported depth format".to_string()))
}

/// GPU-only depth image and view.
pub struct DepthBuffer {
    device: Arc<Device>,
    image: vk::Image,
    image_view: vk::ImageView,
    allocation: Option<Allocation>,
    extent: vk::Extent2D,
}

impl DepthBuffer {
    /// Creates a depth buffer of `extent` in `format`.
    pub fn new(device: Arc<Device>, extent: vk::Extent2D, format: vk::Format) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(
                "Depth buffer dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        // SAFETY: The device is live and image_info is valid.
        let image = unsafe { device.handle().create_image(&image_info, None)? };

        // Cleans up whatever has been created if a later step fails.
        let mut depth = Self {
            device,
            image,
            image_view: vk::ImageView::null(),
            allocation: None,
            extent,
        };

        // SAFETY: image was just created from this device.
        let requirements = unsafe {
            depth
                .device
                .handle()
                .get_image_memory_requirements(depth.image)
        };

        let allocation = depth.device.allocator()?.allocate(&AllocationCreateDesc {
            name: "depth_buffer",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        let device = &depth.device;
        let image = depth.image;
        bind_held(&mut depth.allocation, allocation, |allocation| {
            // SAFETY: The allocation satisfies the image's memory requirements.
            unsafe {
                device
                    .handle()
                    .bind_image_memory(image, allocation.memory(), allocation.offset())?;
            }
            Ok(())
        })?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(depth.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::DEPTH)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        // SAFETY: The image has memory bound.
        depth.image_view = unsafe { depth.device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created depth buffer: {}x{} ({:?})",
            extent.width, extent.height, format
        );

        Ok(depth)
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

/// Hands `allocation` to its owner's slot before binding it, so that a failed
/// bind still leaves it where `Drop` frees it.
fn bind_held<A>(
    slot: &mut Option<A>,
    allocation: A,
    bind: impl FnOnce(&A) -> RhiResult<()>,
) -> RhiResult<()> {
    let allocation = slot.insert(allocation);
    bind(allocation)
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        // SAFETY: The owner waited for device idle; a null view is ignored.
        unsafe {
            self.device
                .handle()
                .destroy_image_view(self.image_view, None);
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free depth buffer allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Failed to free depth buffer allocation: {}", e),
            }
        }
    }
}
