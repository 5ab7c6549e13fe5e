//! Shader binary loading.

use std::path::{Path, PathBuf};

use fractal_rhi::shader::spirv_words;
use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Compiled SPIR-V for the vertex and fragment stages, read once at startup.
#[derive(Clone, Debug)]
pub struct ShaderPair {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
}

impl ShaderPair {
    /// Reads both binaries and checks that each is well-formed SPIR-V.
    pub fn load(vertex_path: &Path, fragment_path: &Path) -> ResourceResult<Self> {
        let vertex = read_spirv(vertex_path)?;
        let fragment = read_spirv(fragment_path)?;

        info!(
            "Loaded shaders: {} ({} bytes), {} ({} bytes)",
            vertex_path.display(),
            vertex.len(),
            fragment_path.display(),
            fragment.len()
        );

        Ok(Self { vertex, fragment })
    }
}

fn read_spirv(path: &Path) -> ResourceResult<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|source| ResourceError::ShaderRead {
        path: PathBuf::from(path),
        source,
    })?;

    spirv_words(&bytes).map_err(|e| ResourceError::InvalidShader {
        path: PathBuf::from(path),
        message: e.to_string(),
    })?;

    Ok(bytes)
}
