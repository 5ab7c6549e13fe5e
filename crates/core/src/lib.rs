//! Core utilities shared by every crate in the workspace.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Configuration loading
//! - Frame statistics

mod config;
mod error;
mod logging;
mod stats;

pub use config::{
    CONFIG_ENV_VAR, Config, DEFAULT_CONFIG_PATH, FractalConfig, GpuConfig, MAX_FRACTAL_DEPTH,
    ShaderConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use stats::{FpsReport, FrameStats};
