//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] orders work between queue operations on the GPU
//! - [`Fence`] lets the host wait for GPU work
//! - [`FrameSync`] groups the objects one in-flight frame slot needs
//! - [`FrameRing`] tracks the current slot and which slot last used each image
//!
//! Every host wait is bounded. A wait that runs out becomes
//! [`RhiError::Timeout`] instead of blocking forever.

use std::sync::Arc;
use std::time::Duration;

use ash::prelude::VkResult;
use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Number of frames the host may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Binary semaphore.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        // SAFETY: The device is live.
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: The owning swap chain waits for device idle before dropping.
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence for host-side waits on submitted work.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled so the first wait returns at once.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        // SAFETY: The device is live.
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits until the fence is signaled or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> RhiResult<()> {
        wait_for_fences(&self.device, &[self.fence], timeout)
    }

    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        // SAFETY: The fence is not part of a pending submission; it was just waited on.
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        // SAFETY: The owning swap chain waits for device idle before dropping.
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Waits for all `fences` with a bounded timeout.
///
/// Null handles are skipped; an empty list returns immediately.
pub fn wait_for_fences(device: &Device, fences: &[vk::Fence], timeout: Duration) -> RhiResult<()> {
    let fences: Vec<vk::Fence> = fences
        .iter()
        .copied()
        .filter(|fence| *fence != vk::Fence::null())
        .collect();
    if fences.is_empty() {
        return Ok(());
    }

    // SAFETY: Every fence was created from this device and is still alive.
    let result = unsafe {
        device
            .handle()
            .wait_for_fences(&fences, true, timeout_nanos(timeout))
    };
    check_wait(result, "fence wait", timeout)
}

/// Converts a timeout to the nanosecond count Vulkan expects, saturating.
pub fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

/// Maps `VK_TIMEOUT` from a bounded wait to [`RhiError::Timeout`].
pub(crate) fn check_wait<T>(result: VkResult<T>, what: &str, timeout: Duration) -> RhiResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(RhiError::Timeout(format!(
            "{} exceeded {} ms",
            what,
            timeout.as_millis()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Synchronization objects for one in-flight frame slot.
pub struct FrameSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSync {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        // Start signaled so the first wait on this slot does not block.
        let in_flight = Fence::new(device, true)?;

        debug!("Created frame synchronization primitives");

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Signaled when the acquired image may be written.
    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    /// Signaled when rendering finishes; presentation waits on it.
    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    /// Signaled when the slot's submission completes.
    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}

/// Index of the slot after `current` in a ring of [`MAX_FRAMES_IN_FLIGHT`].
#[inline]
pub fn next_frame_index(current: usize) -> usize {
    (current + 1) % MAX_FRAMES_IN_FLIGHT
}

/// Slot bookkeeping for a ring of [`MAX_FRAMES_IN_FLIGHT`] frames over a set
/// of swap-chain images.
///
/// Slot `s` is guarded by the fence of the `s`th [`FrameSync`]. Before an
/// image is recorded again, the host waits on the current slot's fence and
/// then on the fence of the slot that last submitted work for that image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRing {
    current: usize,
    image_owners: Vec<Option<usize>>,
}

impl FrameRing {
    pub fn new(image_count: usize) -> Self {
        Self {
            current: 0,
            image_owners: vec![None; image_count],
        }
    }

    /// Slot the next acquire and submit use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.image_owners.len()
    }

    /// Slot whose fence still has to be waited on before `image_index` is
    /// recorded, if any.
    ///
    /// The current slot is never returned; its fence was waited on before
    /// the image was acquired.
    pub fn owner_to_wait(&self, image_index: usize) -> RhiResult<Option<usize>> {
        let owner = *self.owner(image_index)?;
        Ok(owner.filter(|&slot| slot != self.current))
    }

    /// Marks `image_index` as used by the current slot and advances the ring.
    ///
    /// Returns the slot whose sync objects the submission uses.
    pub fn submit(&mut self, image_index: usize) -> RhiResult<usize> {
        let slot = self.current;
        *self.owner_mut(image_index)? = Some(slot);
        self.current = next_frame_index(slot);
        Ok(slot)
    }

    fn owner(&self, image_index: usize) -> RhiResult<&Option<usize>> {
        let count = self.image_owners.len();
        self.image_owners
            .get(image_index)
            .ok_or_else(|| image_out_of_range(image_index, count))
    }

    fn owner_mut(&mut self, image_index: usize) -> RhiResult<&mut Option<usize>> {
        let count = self.image_owners.len();
        self.image_owners
            .get_mut(image_index)
            .ok_or_else(|| image_out_of_range(image_index, count))
    }
}

fn image_out_of_range(image_index: usize, count: usize) -> RhiError {
    RhiError::InvalidHandle(format!(
        "Image index {} out of range for {} images",
        image_index, count
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_ring_wraps() {
        let mut index = 0;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(index);
            index = next_frame_index(index);
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_timeout_nanos() {
        assert_eq!(timeout_nanos(Duration::from_millis(5)), 5_000_000);
        assert_eq!(timeout_nanos(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_check_wait_maps_timeout() {
        let timeout = Duration::from_millis(100);

        assert!(check_wait(Ok(()), "fence wait", timeout).is_ok());

        let err = check_wait::<()>(Err(vk::Result::TIMEOUT), "fence wait", timeout).unwrap_err();
        assert!(matches!(err, RhiError::Timeout(ref msg) if msg == "fence wait exceeded 100 ms"));

        let err =
            check_wait::<()>(Err(vk::Result::ERROR_DEVICE_LOST), "fence wait", timeout).unwrap_err();
        assert!(matches!(
            err,
            RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
        ));
    }

    #[test]
    fn test_ring_first_use_waits_on_nothing() {
        let ring = FrameRing::new(3);
        for image in 0..3 {
            assert_eq!(ring.owner_to_wait(image).unwrap(), None);
        }
        assert_eq!(ring.current_slot(), 0);
    }

    #[test]
    fn test_ring_tracks_image_owners() {
        let mut ring = FrameRing::new(3);

        assert_eq!(ring.submit(0).unwrap(), 0);
        assert_eq!(ring.submit(1).unwrap(), 1);
        assert_eq!(ring.current_slot(), 0);

        // Image 2 is fresh; only the current slot's own fence applies.
        assert_eq!(ring.owner_to_wait(2).unwrap(), None);
        assert_eq!(ring.submit(2).unwrap(), 0);

        // Out of order: image 0 comes back while slot 1 is current, so slot 0's
        // fence (now guarding image 2 as well) must be waited on.
        assert_eq!(ring.current_slot(), 1);
        assert_eq!(ring.owner_to_wait(0).unwrap(), Some(0));
        assert_eq!(ring.owner_to_wait(1).unwrap(), None);
        assert_eq!(ring.owner_to_wait(2).unwrap(), Some(0));
    }

    #[test]
    fn test_ring_rejects_unknown_image() {
        let mut ring = FrameRing::new(2);
        assert!(matches!(
            ring.owner_to_wait(2),
            Err(RhiError::InvalidHandle(_))
        ));
        assert!(matches!(ring.submit(5), Err(RhiError::InvalidHandle(_))));
        assert_eq!(ring.current_slot(), 0);
    }

    /// Replays acquire/record/submit with simulated fences that only signal
    /// when waited on, checking that no image is recorded while the work that
    /// last used it may still be running.
    #[test]
    fn test_ring_never_records_over_pending_work() {
        let images = [0, 1, 2, 0, 2, 1, 1, 0, 2, 2, 0, 1];
        let mut ring = FrameRing::new(3);
        let mut pending = [false; MAX_FRAMES_IN_FLIGHT];
        let mut last_slot_for_image: [Option<usize>; 3] = [None; 3];

        for &image in &images {
            pending[ring.current_slot()] = false;
            if let Some(owner) = ring.owner_to_wait(image).unwrap() {
                pending[owner] = false;
            }

            if let Some(slot) = last_slot_for_image[image] {
                assert!(!pending[slot], "image {} recorded while slot {} pending", image, slot);
            }

            let slot = ring.submit(image).unwrap();
            pending[slot] = true;
            last_slot_for_image[image] = Some(slot);
        }
    }

    #[test]
    fn test_frame_sync_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FrameSync>();
    }
}
