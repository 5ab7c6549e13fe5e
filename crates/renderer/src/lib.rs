//! Frame rendering for the fractal viewer.
//!
//! - [`FrameController`] drives acquire, record, submit and swap chain rebuilds
//! - [`DeviceContext`] and friends are the seam between the loop and the GPU
//! - [`VulkanContext`] implements that seam on top of `fractal-rhi`
//! - [`Mesh`] holds the uploaded vertex buffer

pub mod backend;
mod context;
mod frame_controller;
mod mesh;

pub use backend::{
    CommandRecorder, DeviceContext, MeshOps, PipelineLayoutOps, PipelineOps, SwapChainOps,
};
pub use context::VulkanContext;
pub use frame_controller::{
    CLEAR_COLOR, FrameController, FrameOutcome, FrameState, RebuildRequest, clear_values,
};
pub use mesh::Mesh;
