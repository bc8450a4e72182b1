//! Frame scheduler.
//!
//! Drives one frame at a time through
//! `Idle -> Acquiring -> Submitting -> Presenting -> Idle`, detouring
//! through `Recreating` when the swapchain goes stale. The GPU side is
//! abstracted behind [`FrameBackend`] so the protocol can be exercised
//! without a device.
//!
//! Per frame, with slot `s = frame_counter mod F`:
//!
//! 1. wait on the submit fence of `s`
//! 2. acquire image `i`; on out-of-date, recreate and return
//! 3. wait on the fence still holding `i`, if it belongs to another slot
//! 4. record `i` as held by the submit fence of `s`
//! 5. reset that fence and submit
//! 6. present; on a stale chain or a pending resize, recreate
//! 7. advance the frame counter

use ash::vk;
use tracing::{debug, trace};

use vkpresent_rhi::swapchain::{AcquireOutcome, PresentOutcome};
use vkpresent_rhi::sync::{ImageFences, next_slot};

use crate::error::RenderResult;

/// GPU operations the scheduler sequences.
pub trait FrameBackend {
    /// Number of frame slots (F).
    fn frames_in_flight(&self) -> usize;

    /// Number of swapchain images (N).
    fn image_count(&self) -> usize;

    /// Submit fence owned by `slot`.
    fn submit_fence(&self, slot: usize) -> vk::Fence;

    /// Blocks until `fence` signals.
    fn wait_fence(&mut self, fence: vk::Fence) -> RenderResult<()>;

    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()>;

    /// Acquires the next image, signalling the image-acquired semaphore of `slot`.
    fn acquire(&mut self, slot: usize) -> RenderResult<AcquireOutcome>;

    /// Submits the prerecorded commands for `image_index`, waiting on the
    /// image-acquired semaphore of `slot` and signalling its render-finished
    /// semaphore and submit fence.
    fn submit(&mut self, slot: usize, image_index: u32) -> RenderResult<()>;

    /// Presents `image_index` after the render-finished semaphore of `slot`.
    fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<PresentOutcome>;

    /// Idles the device, rebuilds the swapchain and re-records every
    /// per-image command buffer.
    fn recreate(&mut self) -> RenderResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Submitting,
    Presenting,
    Recreating,
}

/// What a call to [`FrameScheduler::draw_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was presented.
    Presented { slot: usize, image_index: u32 },
    /// The frame was presented, then the swapchain was rebuilt.
    PresentedAndRecreated { slot: usize, image_index: u32 },
    /// Acquire found the swapchain out of date; it was rebuilt and nothing
    /// was submitted.
    Recreated,
}

/// Frame-slot ring position plus the per-image fence table.
#[derive(Debug)]
pub struct FrameScheduler {
    frames_in_flight: usize,
    frame_counter: u64,
    slot: usize,
    image_fences: ImageFences,
    resize_pending: bool,
    state: FrameState,
    recreations: u64,
}

impl FrameScheduler {
    pub fn new(frames_in_flight: usize, image_count: usize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            frame_counter: 0,
            slot: 0,
            image_fences: ImageFences::new(image_count),
            resize_pending: false,
            state: FrameState::Idle,
            recreations: 0,
        }
    }

    /// Marks the framebuffer as resized; the next present triggers a rebuild.
    pub fn notify_resized(&mut self) {
        self.resize_pending = true;
    }

    pub fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    /// Frames presented so far.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Slot the next frame will use.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn image_fences(&self) -> &ImageFences {
        &self.image_fences
    }

    /// Swapchain rebuilds performed so far.
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    fn enter(&mut self, state: FrameState) {
        trace!("Frame {}: {:?} -> {:?}", self.frame_counter, self.state, state);
        self.state = state;
    }

    /// Runs one frame of the acquire/submit/present protocol.
    ///
    /// Swapchain invalidation is handled here and never returned as an
    /// error; every error returned is fatal.
    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B) -> RenderResult<FrameOutcome> {
        let slot = self.slot;
        let slot_fence = backend.submit_fence(slot);

        self.enter(FrameState::Acquiring);
        backend.wait_fence(slot_fence)?;

        let image_index = match backend.acquire(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    debug!("Acquired image {} from a suboptimal swapchain", image_index);
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date on acquire");
                self.recreate(backend)?;
                return Ok(FrameOutcome::Recreated);
            }
        };
        let image = image_index as usize;

        self.enter(FrameState::Submitting);
        if let Some(held_by) = self.image_fences.get(image)
            && held_by != slot_fence
        {
            backend.wait_fence(held_by)?;
        }
        self.image_fences.claim(image, slot_fence);

        backend.reset_fence(slot_fence)?;
        backend.submit(slot, image_index)?;

        self.enter(FrameState::Presenting);
        let outcome = backend.present(slot, image_index)?;
        let stale = outcome == PresentOutcome::Stale;
        let resized = std::mem::take(&mut self.resize_pending);

        self.frame_counter += 1;
        self.slot = next_slot(slot, self.frames_in_flight);

        if stale || resized {
            debug!(
                "Rebuilding after present (stale: {}, resized: {})",
                stale, resized
            );
            self.recreate(backend)?;
            return Ok(FrameOutcome::PresentedAndRecreated { slot, image_index });
        }

        self.enter(FrameState::Idle);
        Ok(FrameOutcome::Presented { slot, image_index })
    }

    fn recreate<B: FrameBackend>(&mut self, backend: &mut B) -> RenderResult<()> {
        self.enter(FrameState::Recreating);
        backend.recreate()?;
        self.image_fences.reset(backend.image_count());
        self.resize_pending = false;
        self.recreations += 1;
        self.enter(FrameState::Idle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_scheduler_is_idle() {
        let scheduler = FrameScheduler::new(2, 3);
        assert_eq!(scheduler.state(), FrameState::Idle);
        assert_eq!(scheduler.frame_counter(), 0);
        assert_eq!(scheduler.slot(), 0);
        assert_eq!(scheduler.image_fences().len(), 3);
        assert!(!scheduler.resize_pending());
    }

    #[test]
    fn test_zero_frames_in_flight_is_clamped() {
        let scheduler = FrameScheduler::new(0, 2);
        assert_eq!(scheduler.frames_in_flight, 1);
    }

    #[test]
    fn test_notify_resized_sets_pending() {
        let mut scheduler = FrameScheduler::new(2, 2);
        scheduler.notify_resized();
        assert!(scheduler.resize_pending());
    }
}
