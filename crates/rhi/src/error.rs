//! RHI error types.

use thiserror::Error;

/// Errors raised by the Vulkan wrappers.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No GPU offers graphics, presentation and the swapchain extension
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Invalid shader binary or module creation failure
    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Surface error: {0}")]
    SurfaceError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A fence or image acquisition did not complete within the configured timeout
    #[error("Timed out: {0}")]
    Timeout(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
