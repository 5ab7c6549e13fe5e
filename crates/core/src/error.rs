//! Error types for the application layers above the GPU wrappers.

use thiserror::Error;

/// Main error type for window, configuration and startup failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors raised outside the RHI (surface creation, extension queries)
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
