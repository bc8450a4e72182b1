//! Frame scheduler protocol tests against a simulated GPU.

use std::collections::VecDeque;

use ash::vk::{self, Handle};

use vkpresent_renderer::{FrameBackend, FrameOutcome, FrameScheduler, FrameState, RenderResult};
use vkpresent_rhi::swapchain::{AcquireOutcome, PresentOutcome};

#[derive(Debug, Clone, Copy)]
struct Submission {
    slot: usize,
    image: usize,
}

/// In-order GPU: work completes only when the host waits for it.
struct MockGpu {
    frames_in_flight: usize,
    min_image_count: usize,

    slot_fences: Vec<vk::Fence>,
    fence_signaled: Vec<bool>,
    pending: VecDeque<Submission>,
    max_pending: usize,

    images: usize,
    views: usize,
    framebuffers: usize,
    extent: (u32, u32),
    framebuffer_extent: (u32, u32),
    resize_to: Option<(u32, u32)>,
    next_image: usize,

    out_of_date_acquires: usize,
    stale_presents: usize,
    recreations: usize,
    submissions: Vec<Submission>,
    presents: usize,
    violations: Vec<String>,
}

impl MockGpu {
    fn new(frames_in_flight: usize, min_image_count: usize) -> Self {
        let mut gpu = Self {
            frames_in_flight,
            min_image_count,
            slot_fences: (0..frames_in_flight)
                .map(|slot| vk::Fence::from_raw(0x100 + slot as u64))
                .collect(),
            fence_signaled: vec![true; frames_in_flight],
            pending: VecDeque::new(),
            max_pending: 0,
            images: 0,
            views: 0,
            framebuffers: 0,
            extent: (800, 600),
            framebuffer_extent: (0, 0),
            resize_to: None,
            next_image: 0,
            out_of_date_acquires: 0,
            stale_presents: 0,
            recreations: 0,
            submissions: Vec::new(),
            presents: 0,
            violations: Vec::new(),
        };
        gpu.build_chain();
        gpu
    }

    fn slot_of(&self, fence: vk::Fence) -> usize {
        self.slot_fences
            .iter()
            .position(|&f| f == fence)
            .unwrap_or(usize::MAX)
    }

    fn complete_front(&mut self) {
        if let Some(done) = self.pending.pop_front() {
            self.fence_signaled[done.slot] = true;
        }
    }

    fn idle(&mut self) {
        while !self.pending.is_empty() {
            self.complete_front();
        }
    }

    fn build_chain(&mut self) {
        self.images = self.min_image_count;
        self.views = self.images;
        self.framebuffers = self.images;
        self.framebuffer_extent = self.extent;
        self.next_image = 0;
    }
}

impl FrameBackend for MockGpu {
    fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    fn image_count(&self) -> usize {
        self.images
    }

    fn submit_fence(&self, slot: usize) -> vk::Fence {
        self.slot_fences[slot]
    }

    fn wait_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        let slot = self.slot_of(fence);
        if slot == usize::MAX {
            self.violations.push(format!("wait on unknown fence {:?}", fence));
            return Ok(());
        }
        while !self.fence_signaled[slot] {
            if self.pending.is_empty() {
                self.violations
                    .push(format!("wait on fence of slot {} that can never signal", slot));
                return Ok(());
            }
            self.complete_front();
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        let slot = self.slot_of(fence);
        if self.pending.iter().any(|s| s.slot == slot) {
            self.violations
                .push(format!("reset of fence for slot {} while in use", slot));
        }
        self.fence_signaled[slot] = false;
        Ok(())
    }

    fn acquire(&mut self, _slot: usize) -> RenderResult<AcquireOutcome> {
        if self.out_of_date_acquires > 0 {
            self.out_of_date_acquires -= 1;
            return Ok(AcquireOutcome::OutOfDate);
        }
        let image_index = (self.next_image % self.images) as u32;
        self.next_image += 1;
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
        let image = image_index as usize;
        if image >= self.framebuffers {
            self.violations
                .push(format!("submit for image {} without a framebuffer", image));
        }
        if self.pending.iter().any(|s| s.image == image) {
            self.violations
                .push(format!("image {} submitted while still in use", image));
        }
        if self.fence_signaled[slot] {
            self.violations
                .push(format!("submit on slot {} with a signaled fence", slot));
        }
        let submission = Submission { slot, image };
        self.pending.push_back(submission);
        self.submissions.push(submission);
        self.max_pending = self.max_pending.max(self.pending.len());
        Ok(())
    }

    fn present(&mut self, _slot: usize, _image_index: u32) -> RenderResult<PresentOutcome> {
        self.presents += 1;
        if self.stale_presents > 0 {
            self.stale_presents -= 1;
            return Ok(PresentOutcome::Stale);
        }
        Ok(PresentOutcome::Presented)
    }

    fn recreate(&mut self) -> RenderResult<()> {
        self.idle();
        self.views = 0;
        self.framebuffers = 0;
        if let Some(extent) = self.resize_to.take() {
            self.extent = extent;
        }
        self.build_chain();
        self.recreations += 1;
        Ok(())
    }
}

fn run_frames(scheduler: &mut FrameScheduler, gpu: &mut MockGpu, frames: usize) {
    for _ in 0..frames {
        scheduler.draw_frame(gpu).unwrap();
    }
}

#[test]
fn test_three_frames_claim_every_image() {
    let mut gpu = MockGpu::new(3, 3);
    let mut scheduler = FrameScheduler::new(3, gpu.image_count());

    run_frames(&mut scheduler, &mut gpu, 3);

    assert_eq!(scheduler.frame_counter(), 3);
    assert_eq!(scheduler.state(), FrameState::Idle);
    assert!(gpu.violations.is_empty(), "{:?}", gpu.violations);

    let entries: Vec<_> = scheduler.image_fences().entries().collect();
    assert_eq!(entries.len(), 3);
    for entry in entries {
        let fence = entry.expect("every image was claimed");
        assert!(gpu.slot_fences.contains(&fence));
    }
}

#[test]
fn test_in_flight_never_exceeds_frame_slots() {
    for frames_in_flight in 1..=4 {
        let mut gpu = MockGpu::new(frames_in_flight, 3);
        let mut scheduler = FrameScheduler::new(frames_in_flight, gpu.image_count());

        run_frames(&mut scheduler, &mut gpu, 40);

        assert!(
            gpu.max_pending <= frames_in_flight,
            "F={} saw {} pending",
            frames_in_flight,
            gpu.max_pending
        );
        assert!(gpu.violations.is_empty(), "{:?}", gpu.violations);
        assert_eq!(scheduler.frame_counter(), 40);
    }
}

#[test]
fn test_image_reuse_waits_for_previous_owner() {
    // Two images cycled by three slots: image 0 comes back while the slot
    // that last rendered it is still pending.
    let mut gpu = MockGpu::new(3, 2);
    let mut scheduler = FrameScheduler::new(3, gpu.image_count());

    run_frames(&mut scheduler, &mut gpu, 12);

    assert!(gpu.violations.is_empty(), "{:?}", gpu.violations);
    assert_eq!(gpu.submissions.len(), 12);
    assert_eq!(gpu.submissions[2].image, 0);
    assert_eq!(gpu.submissions[2].slot, 2);
}

#[test]
fn test_slots_rotate_with_frame_counter() {
    let mut gpu = MockGpu::new(2, 3);
    let mut scheduler = FrameScheduler::new(2, gpu.image_count());

    run_frames(&mut scheduler, &mut gpu, 5);

    let slots: Vec<_> = gpu.submissions.iter().map(|s| s.slot).collect();
    assert_eq!(slots, vec![0, 1, 0, 1, 0]);
    assert_eq!(scheduler.slot(), 1);
}

#[test]
fn test_resize_between_frames_recreates_once() {
    let mut gpu = MockGpu::new(3, 3);
    let mut scheduler = FrameScheduler::new(3, gpu.image_count());

    run_frames(&mut scheduler, &mut gpu, 5);
    assert_eq!(scheduler.frame_counter(), 5);

    gpu.resize_to = Some((1024, 768));
    scheduler.notify_resized();

    let outcome = scheduler.draw_frame(&mut gpu).unwrap();
    assert!(matches!(outcome, FrameOutcome::PresentedAndRecreated { .. }));
    assert_eq!(scheduler.frame_counter(), 6);
    assert_eq!(scheduler.recreations(), 1);
    assert!(!scheduler.resize_pending());

    assert_eq!(gpu.recreations, 1);
    assert_eq!(gpu.framebuffers, 3);
    assert_eq!(gpu.framebuffer_extent, (1024, 768));
    assert!(scheduler.image_fences().entries().all(|e| e.is_none()));

    run_frames(&mut scheduler, &mut gpu, 3);
    assert_eq!(scheduler.frame_counter(), 9);
    assert_eq!(gpu.recreations, 1);
    assert!(gpu.violations.is_empty(), "{:?}", gpu.violations);
}

#[test]
fn test_out_of_date_acquire_skips_submission() {
    let mut gpu = MockGpu::new(2, 3);
    let mut scheduler = FrameScheduler::new(2, gpu.image_count());

    run_frames(&mut scheduler, &mut gpu, 2);
    gpu.out_of_date_acquires = 1;

    let outcome = scheduler.draw_frame(&mut gpu).unwrap();
    assert_eq!(outcome, FrameOutcome::Recreated);
    assert_eq!(scheduler.frame_counter(), 2);
    assert_eq!(gpu.submissions.len(), 2);
    assert_eq!(gpu.presents, 2);
    assert_eq!(gpu.recreations, 1);

    let outcome = scheduler.draw_frame(&mut gpu).unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(scheduler.frame_counter(), 3);
    assert!(gpu.violations.is_empty(), "{:?}", gpu.violations);
}

#[test]
fn test_consecutive_stale_presents_keep_counts_consistent() {
    let mut gpu = MockGpu::new(2, 3);
    let mut scheduler = FrameScheduler::new(2, gpu.image_count());

    gpu.stale_presents = 2;
    run_frames(&mut scheduler, &mut gpu, 2);

    assert_eq!(gpu.recreations, 2);
    assert_eq!(scheduler.recreations(), 2);
    assert_eq!(gpu.images, gpu.views);
    assert_eq!(gpu.views, gpu.framebuffers);
    assert_eq!(scheduler.image_fences().len(), gpu.images);
    assert_eq!(scheduler.frame_counter(), 2);

    run_frames(&mut scheduler, &mut gpu, 4);
    assert!(gpu.violations.is_empty(), "{:?}", gpu.violations);
}

#[test]
fn test_image_count_change_resizes_fence_table() {
    let mut gpu = MockGpu::new(2, 3);
    let mut scheduler = FrameScheduler::new(2, gpu.image_count());
    run_frames(&mut scheduler, &mut gpu, 3);

    gpu.min_image_count = 4;
    gpu.stale_presents = 1;
    run_frames(&mut scheduler, &mut gpu, 1);

    assert_eq!(scheduler.image_fences().len(), 4);
    run_frames(&mut scheduler, &mut gpu, 8);
    assert!(gpu.submissions.iter().any(|s| s.image == 3));
    assert!(gpu.violations.is_empty(), "{:?}", gpu.violations);
}
