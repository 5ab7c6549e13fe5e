//! GPU buffer management.
//!
//! Buffers are backed by gpu-allocator. Host-visible buffers are persistently
//! mapped, so uploads are a plain copy.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fractal_rhi::device::Device;
//! use fractal_rhi::buffer::Buffer;
//! use fractal_rhi::vertex::Vertex;
//!
//! # fn example(device: Arc<Device>, vertices: &[Vertex]) -> Result<(), fractal_rhi::RhiError> {
//! let vertex_buffer = Buffer::new_vertex(device, vertices)?;
//! assert_eq!(vertex_buffer.size(), std::mem::size_of_val(vertices) as u64);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::vertex::Vertex;

/// A `VkBuffer` with its memory allocation.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    name: &'static str,
}

impl Buffer {
    /// Creates a buffer of `size` bytes in `location`.
    ///
    /// # Errors
    ///
    /// Fails for a zero size, or when buffer creation, allocation or binding fails.
    pub fn new(
        device: Arc<Device>,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        size: vk::DeviceSize,
        name: &'static str,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "{} buffer size must be greater than 0",
                name
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        // SAFETY: The device is live and buffer_info is valid.
        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        // SAFETY: buffer was just created from this device.
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                // SAFETY: The buffer has no memory bound and is unused.
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // Dropping `this` releases both the buffer and the allocation on bind failure.
        let this = Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            name,
        };

        if let Some(allocation) = &this.allocation {
            // SAFETY: The allocation satisfies the buffer's memory requirements.
            unsafe {
                this.device.handle().bind_buffer_memory(
                    this.buffer,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        debug!("Created {} buffer: {} bytes ({:?})", name, size, location);

        Ok(this)
    }

    /// Creates a host-visible vertex buffer filled with `vertices`.
    pub fn new_vertex(device: Arc<Device>, vertices: &[Vertex]) -> RhiResult<Self> {
        let data: &[u8] = bytemuck::cast_slice(vertices);
        let buffer = Self::new(
            device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryLocation::CpuToGpu,
            data.len() as vk::DeviceSize,
            "vertex",
        )?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Copies `data` into the mapped buffer memory at `offset`.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        check_write_range(self.size, offset, data.len())?;

        let allocation = self.allocation.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;

        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        // SAFETY: The range was checked against the buffer size and the mapping
        // covers the whole allocation.
        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free {} buffer allocation: {:?}", self.name, e);
                    }
                }
                Err(e) => error!("Failed to free {} buffer allocation: {}", self.name, e),
            }
        }

        // SAFETY: The owner waited for the GPU to stop using the buffer.
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.name);
    }
}

fn check_write_range(size: vk::DeviceSize, offset: vk::DeviceSize, len: usize) -> RhiResult<()> {
    let end = offset.checked_add(len as vk::DeviceSize);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(RhiError::InvalidHandle(format!(
            "Write exceeds buffer size: offset {} + data {} > buffer {}",
            offset, len, size
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_range_within_bounds() {
        assert!(check_write_range(64, 0, 64).is_ok());
        assert!(check_write_range(64, 60, 4).is_ok());
    }

    #[test]
    fn test_write_range_out_of_bounds() {
        assert!(check_write_range(64, 0, 65).is_err());
        assert!(check_write_range(64, 61, 4).is_err());
        assert!(check_write_range(64, u64::MAX, 1).is_err());
    }
}
