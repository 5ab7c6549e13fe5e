//! Sierpinski triangle viewer - main entry point.
//!
//! Opens a window, uploads the fractal once and presents it every frame until
//! the window is closed, rebuilding the swap chain whenever the surface changes.

use anyhow::{Context, Result};
use tracing::info;

use fractal_core::Config;
use fractal_platform::Window;
use fractal_renderer::{FrameController, VulkanContext};
use fractal_resources::{ShaderPair, sierpinski_vertices};

fn main() -> Result<()> {
    fractal_core::init_logging();
    info!("Starting fractal viewer");

    let config = Config::load_default_location().context("Failed to load configuration")?;

    let window = Window::new(&config.window).context("Failed to create window")?;
    let context =
        VulkanContext::new(&window, &config.gpu).context("Failed to initialize Vulkan")?;

    let shaders = ShaderPair::load(&config.shaders.vertex, &config.shaders.fragment)
        .context("Failed to load shaders")?;
    let vertices = sierpinski_vertices(config.fractal.depth)
        .context("Failed to generate fractal geometry")?;

    let mut controller = FrameController::new(context, window, shaders, &vertices)
        .context("Failed to build the frame controller")?;

    controller.run().context("Render loop failed")?;

    info!("Shutting down");
    Ok(())
}
