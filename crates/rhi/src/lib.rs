//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Thin, owning wrappers over `ash`. It handles:
//! - Instance, physical device and logical device creation
//! - Swap chain management with its render pass, depth buffers and frame sync
//! - Command pool and command buffer recording
//! - Vertex buffers backed by gpu-allocator
//! - Graphics pipeline creation from a fixed-function config
//!
//! Every wrapper holds an `Arc<Device>` and destroys its handle on drop.
//! Owners are responsible for waiting on device idle first.

mod error;

pub mod buffer;
pub mod command;
pub mod depth_buffer;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
