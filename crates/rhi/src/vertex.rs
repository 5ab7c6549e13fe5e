//! Vertex format and its input descriptions.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// A 2D position with an RGB color.
///
/// Layout (`repr(C)`, 20 bytes):
/// - offset 0: position, location 0 (`vec2`)
/// - offset 8: color, location 1 (`vec3`)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec2,
    pub color: Vec3,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec2, color: Vec3) -> Self {
        Self { position, color }
    }

    /// Binding 0, advanced per vertex.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 20);
    }

    #[test]
    fn test_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 20);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_attribute_descriptions() {
        let [position, color] = Vertex::attribute_descriptions();

        assert_eq!(position.location, 0);
        assert_eq!(position.format, vk::Format::R32G32_SFLOAT);
        assert_eq!(position.offset, 0);

        assert_eq!(color.location, 1);
        assert_eq!(color.format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(color.offset, 8);
    }

    #[test]
    fn test_vertex_bytes() {
        let vertex = Vertex::new(Vec2::new(1.0, 2.0), Vec3::new(0.25, 0.5, 0.75));
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&vertex));
        assert_eq!(floats, &[1.0, 2.0, 0.25, 0.5, 0.75]);
    }
}
