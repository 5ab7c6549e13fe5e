//! Sierpinski triangle geometry.
//!
//! Each level replaces a triangle with the three corner triangles formed by
//! its edge midpoints. Depth `d` yields `3^d` triangles, so `3 * 3^d` vertices
//! as a plain triangle list.

use fractal_core::MAX_FRACTAL_DEPTH;
use fractal_rhi::vertex::Vertex;
use glam::{Vec2, Vec3};
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Outer triangle in normalized device coordinates.
pub const SEED_TRIANGLE: [Vec2; 3] = [
    Vec2::new(0.0, -0.7),
    Vec2::new(0.7, 0.7),
    Vec2::new(-0.7, 0.7),
];

/// Depth used when nothing else is configured.
pub const DEFAULT_DEPTH: u32 = 6;

/// Number of vertices produced at `depth`.
pub fn vertex_count(depth: u32) -> usize {
    3 * 3usize.pow(depth)
}

/// Triangle-list corners of the fractal subdivided `depth` times.
///
/// # Errors
///
/// [`ResourceError::DepthTooLarge`] above [`MAX_FRACTAL_DEPTH`].
pub fn sierpinski_points(seed: [Vec2; 3], depth: u32) -> ResourceResult<Vec<Vec2>> {
    if depth > MAX_FRACTAL_DEPTH {
        return Err(ResourceError::DepthTooLarge {
            depth,
            max: MAX_FRACTAL_DEPTH,
        });
    }

    let mut points = Vec::with_capacity(vertex_count(depth));
    subdivide(seed, depth, &mut points);
    Ok(points)
}

/// Colored vertices for the fractal built from [`SEED_TRIANGLE`].
pub fn sierpinski_vertices(depth: u32) -> ResourceResult<Vec<Vertex>> {
    let vertices: Vec<Vertex> = sierpinski_points(SEED_TRIANGLE, depth)?
        .into_iter()
        .map(|position| Vertex::new(position, position_color(position)))
        .collect();

    debug!(
        "Generated Sierpinski triangle: depth {}, {} vertices",
        depth,
        vertices.len()
    );

    Ok(vertices)
}

/// Maps a position in [-1, 1]^2 to a red/green gradient on full blue.
pub fn position_color(position: Vec2) -> Vec3 {
    Vec3::new(position.x / 2.0 + 0.5, position.y / 2.0 + 0.5, 1.0)
}

#[inline]
fn middle(a: Vec2, b: Vec2) -> Vec2 {
    (a + b) * 0.5
}

fn subdivide(corners: [Vec2; 3], depth: u32, out: &mut Vec<Vec2>) {
    if depth == 0 {
        out.extend_from_slice(&corners);
        return;
    }

    let [a, b, c] = corners;
    let ab = middle(a, b);
    let ac = middle(a, c);
    let bc = middle(b, c);

    subdivide([a, ab, ac], depth - 1, out);
    subdivide([b, bc, ab], depth - 1, out);
    subdivide([c, ac, bc], depth - 1, out);
}
