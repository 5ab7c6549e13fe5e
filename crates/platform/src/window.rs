//! Window management using winit.
//!
//! The window owns its event loop and drives it with `pump_app_events`, so the
//! render loop stays in control of the thread and can either poll or block.

use std::ffi::c_char;
use std::time::Duration;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window as WinitWindow, WindowAttributes, WindowId};

use fractal_core::{Error, Result, WindowConfig};

use crate::PresentationSurface;

/// Pump iterations allowed for the platform to deliver the window.
const MAX_STARTUP_PUMPS: u32 = 500;
const STARTUP_PUMP_TIMEOUT: Duration = Duration::from_millis(10);

/// RAII wrapper for a Vulkan surface.
///
/// The caller must ensure that the Vulkan instance outlives this surface.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Get the raw Vulkan surface handle.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader used to query surface capabilities, formats and present modes.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: The handle was created by ash_window::create_surface from the
        // same instance as the loader, and is destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// Event-side state, updated from inside `pump_app_events`.
struct WindowState {
    attributes: Option<WindowAttributes>,
    window: Option<WinitWindow>,
    window_id: Option<WindowId>,
    creation_error: Option<String>,
    resized: bool,
    close_requested: bool,
}

impl WindowState {
    fn new(attributes: WindowAttributes) -> Self {
        Self {
            attributes: Some(attributes),
            window: None,
            window_id: None,
            creation_error: None,
            resized: false,
            close_requested: false,
        }
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(attributes) = self.attributes.take() else {
            return;
        };

        match event_loop.create_window(attributes) {
            Ok(window) => {
                self.window_id = Some(window.id());
                self.window = Some(window);
            }
            Err(e) => self.creation_error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window_id != Some(id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                tracing::debug!("Close requested");
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                tracing::debug!("Escape pressed, closing");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                tracing::debug!("Window resized: {}x{}", size.width, size.height);
                self.resized = true;
            }
            _ => {}
        }
    }
}

/// A native window plus the event loop that feeds it.
pub struct Window {
    // Destroyed before the event loop.
    window: WinitWindow,
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl Window {
    /// Create the window described by `config` and wait until the platform has mapped it.
    ///
    /// # Errors
    /// Returns [`Error::Window`] if the event loop or window cannot be created,
    /// or if the platform does not deliver the window in time.
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let mut event_loop =
            EventLoop::new().map_err(|e| Error::Window(format!("Failed to create event loop: {}", e)))?;

        let attributes = WindowAttributes::default()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(config.resizable);
        let mut state = WindowState::new(attributes);

        let mut window = None;
        for _ in 0..MAX_STARTUP_PUMPS {
            if let PumpStatus::Exit(code) =
                event_loop.pump_app_events(Some(STARTUP_PUMP_TIMEOUT), &mut state)
            {
                return Err(Error::Window(format!(
                    "Event loop exited with code {} before the window was created",
                    code
                )));
            }
            if let Some(message) = state.creation_error.take() {
                return Err(Error::Window(format!("Failed to create window: {}", message)));
            }
            if let Some(created) = state.window.take() {
                window = Some(created);
                break;
            }
        }

        let window = window
            .ok_or_else(|| Error::Window("Timed out waiting for the window to be created".to_string()))?;

        // Startup configure events are not resizes of a live swap chain.
        state.resized = false;

        let size = window.inner_size();
        tracing::info!(
            "Window created: \"{}\" {}x{}",
            config.title,
            size.width,
            size.height
        );

        Ok(Self {
            window,
            state,
            event_loop,
        })
    }

    /// Instance extensions needed to present to this window's display.
    pub fn required_extensions(&self) -> Result<&'static [*const c_char]> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| Error::Vulkan(format!("Failed to enumerate required extensions: {}", e)))?;

        tracing::debug!(
            "Required Vulkan extensions for surface: {:?}",
            extensions
                .iter()
                // SAFETY: ash_window returns pointers to static, null-terminated
                // extension names.
                .map(|&ext| unsafe { std::ffi::CStr::from_ptr(ext) })
                .collect::<Vec<_>>()
        );

        Ok(extensions)
    }

    /// Create a Vulkan surface for this window.
    ///
    /// # Errors
    /// Returns an error if the raw handles are unavailable or the driver
    /// rejects surface creation.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: entry and instance are valid for the duration of the call and
        // the handles come from a live winit window. The surface is destroyed in
        // Surface::drop.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Vulkan(format!("Failed to create Vulkan surface: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            tracing::debug!("Event loop exited with code {}", code);
            self.state.close_requested = true;
        }
    }
}

impl PresentationSurface for Window {
    fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn extent(&self) -> vk::Extent2D {
        extent_from_size(self.window.inner_size())
    }

    fn was_resized(&self) -> bool {
        self.state.resized
    }

    fn clear_resized_flag(&mut self) {
        self.state.resized = false;
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }
}

fn extent_from_size(size: PhysicalSize<u32>) -> vk::Extent2D {
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSurface(vk::Extent2D);

    impl PresentationSurface for FixedSurface {
        fn poll_events(&mut self) {}
        fn wait_events(&mut self) {}
        fn extent(&self) -> vk::Extent2D {
            self.0
        }
        fn was_resized(&self) -> bool {
            false
        }
        fn clear_resized_flag(&mut self) {}
        fn should_close(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_extent_from_size() {
        let extent = extent_from_size(PhysicalSize::new(800, 600));
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn test_degenerate_extent() {
        let minimized = FixedSurface(extent_from_size(PhysicalSize::new(0, 600)));
        assert!(minimized.is_degenerate());

        let flattened = FixedSurface(extent_from_size(PhysicalSize::new(800, 0)));
        assert!(flattened.is_degenerate());

        let normal = FixedSurface(extent_from_size(PhysicalSize::new(800, 600)));
        assert!(!normal.is_degenerate());
    }
}
