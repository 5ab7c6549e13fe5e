use ash::vk;

/// The window-side operations the frame loop relies on.
///
/// [`crate::Window`] is the real implementation; tests substitute a scripted
/// fake.
pub trait PresentationSurface {
    /// Processes pending window events without blocking.
    fn poll_events(&mut self);

    /// Blocks until at least one window event arrives, then processes it.
    fn wait_events(&mut self);

    /// Current drawable size in physical pixels.
    fn extent(&self) -> vk::Extent2D;

    /// Whether a resize happened since the flag was last cleared.
    fn was_resized(&self) -> bool;

    fn clear_resized_flag(&mut self);

    fn should_close(&self) -> bool;

    /// A zero-area surface (e.g. minimized) cannot back a swap chain.
    fn is_degenerate(&self) -> bool {
        let extent = self.extent();
        extent.width == 0 || extent.height == 0
    }
}
