//! Resources consumed by the renderer.
//!
//! - Sierpinski triangle geometry
//! - Compiled shader binaries

mod error;

pub mod shader;
pub mod sierpinski;

pub use error::{ResourceError, ResourceResult};
pub use shader::ShaderPair;
pub use sierpinski::{sierpinski_points, sierpinski_vertices};
