//! Device-resident vertex data.

use std::sync::Arc;

use ash::vk;
use fractal_rhi::buffer::Buffer;
use fractal_rhi::device::Device;
use fractal_rhi::vertex::Vertex;
use fractal_rhi::{RhiError, RhiResult};
use tracing::info;

use crate::backend::MeshOps;

/// A vertex buffer uploaded once and drawn as a triangle list.
pub struct Mesh {
    vertex_buffer: Buffer,
    vertex_count: u32,
}

impl Mesh {
    /// Uploads `vertices` into a host-visible vertex buffer.
    ///
    /// # Errors
    ///
    /// Fails for fewer than three vertices, or if the buffer cannot be created.
    pub fn new(device: Arc<Device>, vertices: &[Vertex]) -> RhiResult<Self> {
        if vertices.len() < 3 {
            return Err(RhiError::InvalidHandle(format!(
                "A mesh needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }

        let vertex_count = u32::try_from(vertices.len()).map_err(|_| {
            RhiError::InvalidHandle(format!("Too many vertices: {}", vertices.len()))
        })?;

        let vertex_buffer = Buffer::new_vertex(device, vertices)?;

        info!(
            "Mesh uploaded: {} vertices ({} bytes)",
            vertex_count,
            vertex_buffer.size()
        );

        Ok(Self {
            vertex_buffer,
            vertex_count,
        })
    }
}

impl MeshOps for Mesh {
    fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}
