//! Shader module management.
//!
//! Turns SPIR-V byte code into `VkShaderModule`s and the stage descriptions
//! used for pipeline creation. Reading the files is left to the caller.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fractal_rhi::device::Device;
//! use fractal_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), fractal_rhi::RhiError> {
//! let bytes = std::fs::read("shaders/simple_shader.vert.spv").unwrap();
//! let vertex_shader = Shader::from_spirv_bytes(device, &bytes, ShaderStage::Vertex, "main")?;
//! let _stage_info = vertex_shader.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Programmable stages used by the graphics pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decodes SPIR-V byte code into little-endian words.
///
/// # Errors
///
/// Fails if the input is empty, not a multiple of four bytes, or does not
/// start with the SPIR-V magic number.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() {
        return Err(RhiError::ShaderError("SPIR-V code is empty".to_string()));
    }

    if bytes.len() % 4 != 0 {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be 4-byte aligned, got {} bytes",
            bytes.len()
        )));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if words[0] != SPIRV_MAGIC {
        return Err(RhiError::ShaderError(format!(
            "Invalid SPIR-V magic number {:#010x}",
            words[0]
        )));
    }

    Ok(words)
}

/// A shader module together with its stage and entry point.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// Creates a shader module from SPIR-V bytes.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let code = spirv_words(bytes)
            .map_err(|e| RhiError::ShaderError(format!("{} shader: {}", stage, e)))?;

        let entry_point = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {}", e)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        // SAFETY: code is a validated, word-aligned SPIR-V stream.
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        debug!(
            "Created {} shader module ({} bytes, entry '{}')",
            stage,
            bytes.len(),
            entry_point.to_string_lossy()
        );

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        // SAFETY: Pipelines built from this module no longer need it once created.
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Vertex), "vertex");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_spirv_words_decodes_little_endian() {
        let bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0000, 42]);
        assert_eq!(
            spirv_words(&bytes).unwrap(),
            vec![SPIRV_MAGIC, 0x0001_0000, 42]
        );
    }

    #[test]
    fn test_spirv_words_rejects_empty() {
        assert!(matches!(spirv_words(&[]), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_spirv_words_rejects_misaligned() {
        let mut bytes = module_bytes(&[SPIRV_MAGIC]);
        bytes.push(0);
        assert!(matches!(spirv_words(&bytes), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_spirv_words_rejects_bad_magic() {
        let bytes = module_bytes(&[SPIRV_MAGIC.swap_bytes(), 0]);
        assert!(matches!(spirv_words(&bytes), Err(RhiError::ShaderError(_))));
    }
}
