//! Platform layer for the fractal renderer.
//!
//! This crate provides:
//! - A winit window driven by event pumping instead of a callback loop
//! - The [`PresentationSurface`] seam the frame loop is written against
//! - Vulkan surface creation for the window

mod presentation;
mod window;

pub use presentation::PresentationSurface;
pub use window::{Surface, Window};
