//! Vulkan implementation of [`FrameBackend`].

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use vkpresent_rhi::command::{CommandBuffer, clear_values};
use vkpresent_rhi::device::Device;
use vkpresent_rhi::instance::Instance;
use vkpresent_rhi::pipeline::{PipelineDescription, PipelineState};
use vkpresent_rhi::swapchain::{
    AcquireOutcome, PresentOutcome, SwapchainPreferences, SwapchainState,
};
use vkpresent_rhi::sync::{self, SyncSlots};

use crate::error::RenderResult;
use crate::scheduler::FrameBackend;

/// Handle to a pipeline registered with [`VulkanFrameBackend::add_pipeline`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineId(pub usize);

/// Swapchain, frame slots, pipelines and the per-image primary command
/// buffers that stitch the pipelines together.
///
/// Fields drop in declaration order: pipelines before the swapchain that
/// owns their render pass, everything before the device.
pub struct VulkanFrameBackend {
    pipelines: Vec<PipelineState>,
    sync: SyncSlots,
    swapchain: SwapchainState,
    primary_buffers: Vec<vk::CommandBuffer>,
    clear_color: [f32; 4],
    framebuffer_size: (u32, u32),
    device: Arc<Device>,
}

impl VulkanFrameBackend {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        framebuffer_size: (u32, u32),
        preferences: SwapchainPreferences,
        frames_in_flight: usize,
        clear_color: [f32; 4],
    ) -> RenderResult<Self> {
        let swapchain = SwapchainState::new(
            instance,
            device.clone(),
            surface,
            surface_loader,
            framebuffer_size,
            preferences,
        )?;
        let sync = SyncSlots::new(device.clone(), frames_in_flight)?;

        let mut backend = Self {
            pipelines: Vec::new(),
            sync,
            swapchain,
            primary_buffers: Vec::new(),
            clear_color,
            framebuffer_size,
            device,
        };
        backend.record_primary_buffers()?;

        info!(
            "Frame backend ready: {} images, {} frame slots, {:?}",
            backend.swapchain.image_count(),
            backend.sync.len(),
            backend.swapchain.present_mode()
        );
        Ok(backend)
    }

    /// Builds `description` against the current swapchain and appends it
    /// to the draw order.
    pub fn add_pipeline(&mut self, description: PipelineDescription) -> RenderResult<PipelineId> {
        let mut pipeline = PipelineState::new(self.device.clone(), description)?;
        pipeline.build(&self.swapchain)?;

        // The primaries are about to be re-recorded; none may be pending.
        self.device.wait_idle()?;
        self.pipelines.push(pipeline);
        self.record_primary_buffers()?;

        Ok(PipelineId(self.pipelines.len() - 1))
    }

    pub fn pipeline(&self, id: PipelineId) -> Option<&PipelineState> {
        self.pipelines.get(id.0)
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn swapchain(&self) -> &SwapchainState {
        &self.swapchain
    }

    /// Size used by the next swapchain rebuild.
    pub fn set_framebuffer_size(&mut self, size: (u32, u32)) {
        self.framebuffer_size = size;
    }

    pub fn wait_idle(&self) -> RenderResult<()> {
        Ok(self.device.wait_idle()?)
    }

    /// One primary buffer per image: open the render pass, run every
    /// pipeline's secondary buffer for that image in registration order,
    /// close the render pass.
    fn record_primary_buffers(&mut self) -> RenderResult<()> {
        self.free_primary_buffers();

        let render_pass = self.swapchain.render_pass()?.handle();
        let extent = self.swapchain.extent();
        let clear = clear_values(self.clear_color, 1.0);
        let framebuffers = self.swapchain.framebuffers();

        self.primary_buffers = self
            .device
            .allocate_command_buffers(vk::CommandBufferLevel::PRIMARY, framebuffers.len() as u32)?;

        for (image_index, (&buffer, framebuffer)) in
            self.primary_buffers.iter().zip(framebuffers).enumerate()
        {
            let secondaries: Vec<vk::CommandBuffer> = self
                .pipelines
                .iter()
                .filter_map(|pipeline| pipeline.command_buffer(image_index))
                .collect();

            let cmd = CommandBuffer::from_handle(self.device.clone(), buffer);
            cmd.begin_primary()?;
            cmd.begin_render_pass(render_pass, framebuffer.handle(), extent, &clear);
            cmd.execute_commands(&secondaries);
            cmd.end_render_pass();
            cmd.end()?;
        }

        debug!(
            "Recorded {} primary command buffers ({} pipelines)",
            self.primary_buffers.len(),
            self.pipelines.len()
        );
        Ok(())
    }

    fn free_primary_buffers(&mut self) {
        let buffers = std::mem::take(&mut self.primary_buffers);
        self.device.free_command_buffers(&buffers);
    }
}

impl FrameBackend for VulkanFrameBackend {
    fn frames_in_flight(&self) -> usize {
        self.sync.len()
    }

    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn submit_fence(&self, slot: usize) -> vk::Fence {
        self.sync.frame(slot).submit_fence().handle()
    }

    fn wait_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        Ok(sync::wait_for_fence(&self.device, fence, u64::MAX)?)
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        Ok(sync::reset_fence(&self.device, fence)?)
    }

    fn acquire(&mut self, slot: usize) -> RenderResult<AcquireOutcome> {
        let semaphore = self.sync.frame(slot).image_acquired().handle();
        Ok(self.swapchain.acquire_next_image(semaphore)?)
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
        let frame = self.sync.frame(slot);
        let wait_semaphores = [frame.image_acquired().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished().handle()];
        let command_buffers = [self.primary_buffers[image_index as usize]];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the primary buffer is fully recorded, the acquire
        // semaphore has a pending signal from this frame's acquire and the
        // fence was reset by the scheduler just before this call.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.submit_fence().handle())?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<PresentOutcome> {
        let semaphore = self.sync.frame(slot).render_finished().handle();
        Ok(self
            .swapchain
            .present(self.device.present_queue(), image_index, semaphore)?)
    }

    fn recreate(&mut self) -> RenderResult<()> {
        self.swapchain.recreate(self.framebuffer_size)?;
        for pipeline in &mut self.pipelines {
            pipeline.rebuild_for_resize(&self.swapchain)?;
        }
        self.record_primary_buffers()?;

        let extent = self.swapchain.extent();
        info!(
            "Swapchain rebuilt: {}x{}, {} images, generation {}",
            extent.width,
            extent.height,
            self.swapchain.image_count(),
            self.swapchain.generation()
        );
        Ok(())
    }
}

impl Drop for VulkanFrameBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to idle device before teardown: {}", e);
        }
        self.free_primary_buffers();
    }
}
