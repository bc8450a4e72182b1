//! Render context: the object the application drives.
//!
//! Construction order is instance, surface, device, swapchain; teardown
//! runs in reverse from [`RenderContext::cleanup`] or on drop.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use vkpresent_core::RendererConfig;
use vkpresent_platform::{Surface, SurfaceProvider};
use vkpresent_rhi::device::Device;
use vkpresent_rhi::instance::{Instance, InstanceDesc};
use vkpresent_rhi::physical_device::{QueueRoles, select_gpu};
use vkpresent_rhi::pipeline::PipelineDescription;
use vkpresent_rhi::swapchain::SwapchainPreferences;

use crate::backend::{PipelineId, VulkanFrameBackend};
use crate::error::{RenderError, RenderResult};
use crate::scheduler::{FrameBackend, FrameOutcome, FrameScheduler};

const APPLICATION_NAME: &std::ffi::CStr = c"vkpresent";

/// Owns every GPU object of the renderer.
///
/// Fields are `Option`s so [`cleanup`](Self::cleanup) can release them in
/// order and be called more than once.
pub struct RenderContext {
    backend: Option<VulkanFrameBackend>,
    device: Option<Arc<Device>>,
    surface: Option<Surface>,
    instance: Option<Instance>,
    scheduler: FrameScheduler,
}

impl RenderContext {
    /// Creates the instance, surface, device, swapchain and frame slots.
    pub fn init(provider: &impl SurfaceProvider, config: &RendererConfig) -> RenderResult<Self> {
        config.validate()?;
        let framebuffer_size = provider.framebuffer_size();
        info!(
            "Initializing render context ({}x{}, {} frames in flight)",
            framebuffer_size.0, framebuffer_size.1, config.frames_in_flight
        );

        let surface_extensions = provider.required_extensions()?;
        let instance = Instance::new(&InstanceDesc {
            application_name: APPLICATION_NAME,
            enable_validation: config.validation,
            surface_extensions: &surface_extensions,
        })?;

        let surface = provider.create_surface(instance.entry(), instance.handle())?;
        let gpu = select_gpu(
            instance.handle(),
            surface.handle(),
            surface.loader(),
            QueueRoles::default(),
        )?;
        let device = Device::new(&instance, &gpu)?;

        let preferences = SwapchainPreferences {
            vsync: config.vsync,
            ..Default::default()
        };
        let backend = VulkanFrameBackend::new(
            &instance,
            device.clone(),
            surface.handle(),
            surface.loader().clone(),
            framebuffer_size,
            preferences,
            config.frames_in_flight,
            config.clear_color,
        )?;
        let scheduler = FrameScheduler::new(backend.frames_in_flight(), backend.image_count());

        Ok(Self {
            backend: Some(backend),
            device: Some(device),
            surface: Some(surface),
            instance: Some(instance),
            scheduler,
        })
    }

    fn backend_mut(&mut self) -> RenderResult<&mut VulkanFrameBackend> {
        self.backend.as_mut().ok_or(RenderError::NotInitialized)
    }

    fn backend(&self) -> RenderResult<&VulkanFrameBackend> {
        self.backend.as_ref().ok_or(RenderError::NotInitialized)
    }

    /// Draws one frame.
    ///
    /// Returns `Ok(None)` without touching the GPU while the framebuffer
    /// has zero area.
    pub fn draw_frame(
        &mut self,
        provider: &impl SurfaceProvider,
    ) -> RenderResult<Option<FrameOutcome>> {
        if provider.take_resized() {
            self.scheduler.notify_resized();
        }

        let size = provider.framebuffer_size();
        if size.0 == 0 || size.1 == 0 {
            return Ok(None);
        }

        let backend = self.backend.as_mut().ok_or(RenderError::NotInitialized)?;
        backend.set_framebuffer_size(size);
        self.scheduler.draw_frame(backend).map(Some)
    }

    /// Registers a pipeline; it is drawn after every earlier one.
    pub fn add_pipeline(&mut self, description: PipelineDescription) -> RenderResult<PipelineId> {
        let id = self.backend_mut()?.add_pipeline(description)?;
        debug!("Registered pipeline {:?}", id);
        Ok(id)
    }

    /// Blocks until the GPU is idle.
    pub fn wait_device(&self) -> RenderResult<()> {
        self.backend()?.wait_idle()
    }

    /// Color format of the swapchain images.
    pub fn current_color_format(&self) -> RenderResult<vk::Format> {
        Ok(self.backend()?.swapchain().format())
    }

    pub fn extent(&self) -> RenderResult<vk::Extent2D> {
        Ok(self.backend()?.swapchain().extent())
    }

    pub fn frame_counter(&self) -> u64 {
        self.scheduler.frame_counter()
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    /// Releases every GPU object: swapchain and pipelines, device, surface,
    /// instance. Later calls do nothing.
    pub fn cleanup(&mut self) {
        if self.instance.is_none() {
            return;
        }
        if let Some(backend) = &self.backend
            && let Err(e) = backend.wait_idle()
        {
            warn!("Device did not idle before cleanup: {}", e);
        }
        self.backend = None;
        self.device = None;
        self.surface = None;
        self.instance = None;
        info!(
            "Render context destroyed after {} frames",
            self.scheduler.frame_counter()
        );
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.cleanup();
    }
}
