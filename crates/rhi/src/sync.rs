//! Synchronization primitives and the frame-slot ring.
//!
//! - [`Semaphore`] and [`Fence`] own single Vulkan objects.
//! - [`FrameSync`] bundles what one frame slot needs: an image-acquired
//!   semaphore, a render-finished semaphore and a submit fence.
//! - [`SyncSlots`] is the fixed ring of `F` frame slots.
//! - [`ImageFences`] maps each swapchain image to the submit fence of the
//!   frame that last rendered into it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkpresent_rhi::device::Device;
//! use vkpresent_rhi::sync::{SyncSlots, next_slot, wait_for_fence};
//!
//! # fn example(device: Arc<Device>) -> vkpresent_rhi::RhiResult<()> {
//! let slots = SyncSlots::new(device.clone(), 2)?;
//! let mut slot = 0;
//! wait_for_fence(&device, slots.frame(slot).submit_fence().handle(), u64::MAX)?;
//! slot = next_slot(slot, slots.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiResult, VkResultExt};

/// Advances a frame-slot index around a ring of `count` slots.
#[inline]
pub fn next_slot(index: usize, count: usize) -> usize {
    (index + 1) % count
}

/// Binary semaphore for queue-to-queue ordering.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe {
            device
                .handle()
                .create_semaphore(&create_info, None)
                .with_op("vkCreateSemaphore")?
        };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence the host can wait on.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe {
            device
                .handle()
                .create_fence(&create_info, None)
                .with_op("vkCreateFence")?
        };
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Waits on a raw fence handle owned elsewhere.
pub fn wait_for_fence(device: &Device, fence: vk::Fence, timeout: u64) -> RhiResult<()> {
    unsafe {
        device
            .handle()
            .wait_for_fences(&[fence], true, timeout)
            .with_op("vkWaitForFences")
    }
}

/// Resets a raw fence handle owned elsewhere to the unsignaled state.
pub fn reset_fence(device: &Device, fence: vk::Fence) -> RhiResult<()> {
    unsafe {
        device
            .handle()
            .reset_fences(&[fence])
            .with_op("vkResetFences")
    }
}

/// Synchronization objects owned by one frame slot.
pub struct FrameSync {
    image_acquired: Semaphore,
    render_finished: Semaphore,
    /// Created signaled so the first wait on a fresh slot returns at once.
    submit_fence: Fence,
}

impl FrameSync {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_acquired: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            submit_fence: Fence::new(device, true)?,
        })
    }

    #[inline]
    pub fn image_acquired(&self) -> &Semaphore {
        &self.image_acquired
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    #[inline]
    pub fn submit_fence(&self) -> &Fence {
        &self.submit_fence
    }
}

/// Ring of `F` frame slots. Lives for the whole renderer lifetime and is
/// untouched by swapchain recreation.
pub struct SyncSlots {
    frames: Vec<FrameSync>,
}

impl SyncSlots {
    pub fn new(device: Arc<Device>, frames_in_flight: usize) -> RhiResult<Self> {
        let frames = (0..frames_in_flight.max(1))
            .map(|_| FrameSync::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        debug!("Created {} frame slots", frames.len());
        Ok(Self { frames })
    }

    /// Slot `slot`; callers keep `slot < len()`.
    #[inline]
    pub fn frame(&self, slot: usize) -> &FrameSync {
        &self.frames[slot]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Per-image record of the submit fence that last claimed each image.
///
/// Entries start empty and are reset whenever the swapchain is rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFences {
    fences: Vec<vk::Fence>,
}

impl ImageFences {
    /// `image_count` empty entries.
    pub fn new(image_count: usize) -> Self {
        Self {
            fences: vec![vk::Fence::null(); image_count],
        }
    }

    /// Clears every entry and resizes to `image_count`.
    pub fn reset(&mut self, image_count: usize) {
        self.fences.clear();
        self.fences.resize(image_count, vk::Fence::null());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fences.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    /// Fence currently holding `image`, if any.
    pub fn get(&self, image: usize) -> Option<vk::Fence> {
        self.fences
            .get(image)
            .copied()
            .filter(|&fence| fence != vk::Fence::null())
    }

    /// Records `fence` as the owner of `image`.
    pub fn claim(&mut self, image: usize, fence: vk::Fence) {
        if let Some(entry) = self.fences.get_mut(image) {
            *entry = fence;
        }
    }

    /// All entries, empty ones as `None`.
    pub fn entries(&self) -> impl Iterator<Item = Option<vk::Fence>> + '_ {
        self.fences
            .iter()
            .map(|&fence| (fence != vk::Fence::null()).then_some(fence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_next_slot_wraps() {
        assert_eq!(next_slot(0, 3), 1);
        assert_eq!(next_slot(1, 3), 2);
        assert_eq!(next_slot(2, 3), 0);
        assert_eq!(next_slot(0, 1), 0);
    }

    #[test]
    fn test_image_fences_start_empty() {
        let fences = ImageFences::new(3);
        assert_eq!(fences.len(), 3);
        assert!(fences.entries().all(|entry| entry.is_none()));
        assert_eq!(fences.get(5), None);
    }

    #[test]
    fn test_image_fences_claim_and_reset() {
        let a = vk::Fence::from_raw(0x10);
        let b = vk::Fence::from_raw(0x20);

        let mut fences = ImageFences::new(2);
        fences.claim(0, a);
        fences.claim(1, b);
        fences.claim(7, a);
        assert_eq!(fences.get(0), Some(a));
        assert_eq!(fences.get(1), Some(b));

        fences.claim(0, b);
        assert_eq!(fences.get(0), Some(b));

        fences.reset(4);
        assert_eq!(fences.len(), 4);
        assert!(fences.entries().all(|entry| entry.is_none()));
    }

    #[test]
    fn test_sync_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
        assert_send_sync::<ImageFences>();
    }
}
