//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// A shader binary could not be read.
    #[error("Failed to read shader '{path}': {source}")]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A shader binary was read but is not valid SPIR-V.
    #[error("Invalid shader '{path}': {message}")]
    InvalidShader { path: PathBuf, message: String },

    /// Recursion depth beyond what the vertex count can reasonably hold.
    #[error("Fractal depth {depth} exceeds the maximum of {max}")]
    DepthTooLarge { depth: u32, max: u32 },
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
