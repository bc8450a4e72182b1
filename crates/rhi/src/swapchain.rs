//! Swapchain management.
//!
//! [`SwapchainState`] owns the presentable image chain together with
//! everything sized by it: one view and one framebuffer per image, the
//! shared depth texture, and the default render pass.
//!
//! Recreation tears down only the extent-dependent half (framebuffers,
//! depth texture, views), builds a new chain with the old handle as the
//! `oldSwapchain` hint and retires the old chain afterwards. The render
//! pass survives, so pipelines built against it stay valid.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkpresent_rhi::device::Device;
//! use vkpresent_rhi::instance::Instance;
//! use vkpresent_rhi::swapchain::{SwapchainPreferences, SwapchainState};
//! use ash::vk;
//!
//! # fn example(
//! #     instance: &Instance,
//! #     device: Arc<Device>,
//! #     surface: vk::SurfaceKHR,
//! #     surface_loader: ash::khr::surface::Instance,
//! # ) -> vkpresent_rhi::RhiResult<()> {
//! let mut swapchain = SwapchainState::new(
//!     instance,
//!     device,
//!     surface,
//!     surface_loader,
//!     (800, 600),
//!     SwapchainPreferences::default(),
//! )?;
//!
//! // After the window was resized:
//! swapchain.recreate((1024, 768))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult, VkResultExt};
use crate::image::{DepthTexture, ImageView, find_depth_format};
use crate::instance::Instance;
use crate::physical_device::SurfaceSupport;
use crate::render_pass::{Framebuffer, RenderPass};

/// Caller preferences applied when the surface supports them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainPreferences {
    pub surface_format: vk::SurfaceFormatKHR,
    /// `false` prefers MAILBOX, then IMMEDIATE, over FIFO.
    pub vsync: bool,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl Default for SwapchainPreferences {
    fn default() -> Self {
        Self {
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vsync: true,
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        }
    }
}

/// Result of asking the chain for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is (or will be, once the semaphore signals) available.
    Acquired { image_index: u32, suboptimal: bool },
    /// The surface changed; nothing was acquired and the semaphore is untouched.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented or dropped, but the chain no longer matches the surface.
    Stale,
}

/// The presentable image chain and everything sized by it.
pub struct SwapchainState {
    device: Arc<Device>,
    loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    preferences: SwapchainPreferences,

    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<ImageView>,
    framebuffers: Vec<Framebuffer>,
    depth: Option<DepthTexture>,
    render_pass: Option<RenderPass>,

    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    min_image_count: u32,
    /// Bumped on every successful create.
    generation: u64,
}

impl SwapchainState {
    /// Builds the first generation of the chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface cannot be queried, reports no
    /// formats or present modes, or any Vulkan object creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        framebuffer_size: (u32, u32),
        preferences: SwapchainPreferences,
    ) -> RhiResult<Self> {
        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let mut state = Self {
            device,
            loader,
            surface_loader,
            surface,
            preferences,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            depth: None,
            render_pass: None,
            surface_format: preferences.surface_format,
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            min_image_count: 0,
            generation: 0,
        };
        state.create(framebuffer_size)?;
        Ok(state)
    }

    /// Builds a chain generation, handing the current chain (if any) to the
    /// driver as `oldSwapchain` and retiring it once the new one exists.
    fn create(&mut self, framebuffer_size: (u32, u32)) -> RhiResult<()> {
        let support = SurfaceSupport::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "surface reports no formats or present modes".to_string(),
            ));
        }

        let caps = &support.capabilities;
        let extent = choose_extent(caps, framebuffer_size.0, framebuffer_size.1);
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "surface extent is {}x{}",
                extent.width, extent.height
            )));
        }

        // Once the render pass exists its color format is fixed.
        let surface_format = if self.render_pass.is_some() {
            require_surface_format(&support.formats, self.surface_format)?
        } else {
            choose_surface_format(&support.formats, self.preferences.surface_format)
        };
        let present_mode = choose_present_mode(&support.present_modes, self.preferences.vsync);
        let min_image_count = determine_image_count(caps);
        let pre_transform = choose_pre_transform(caps, self.preferences.pre_transform);
        let composite_alpha = choose_composite_alpha(caps, self.preferences.composite_alpha);
        let image_usage = choose_image_usage(caps);

        let families = self.device.queue_families();
        let family_indices: Vec<u32> = [families.graphics_family, families.present_family]
            .into_iter()
            .flatten()
            .collect();
        let concurrent = family_indices.len() == 2 && family_indices[0] != family_indices[1];
        let (sharing_mode, shared_families) = if concurrent {
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(image_usage)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(pre_transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            self.loader
                .create_swapchain(&create_info, None)
                .with_op("vkCreateSwapchainKHR")?
        };

        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(old_swapchain, None) };
            debug!("Retired previous swapchain");
        }
        self.swapchain = swapchain;
        self.surface_format = surface_format;
        self.present_mode = present_mode;
        self.extent = extent;
        self.min_image_count = min_image_count;

        self.images = unsafe {
            self.loader
                .get_swapchain_images(swapchain)
                .with_op("vkGetSwapchainImagesKHR")?
        };

        self.image_views = self
            .images
            .iter()
            .map(|&image| {
                ImageView::new_2d(
                    self.device.clone(),
                    image,
                    surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                )
            })
            .collect::<RhiResult<_>>()?;

        if self.render_pass.is_none() {
            let depth_format = find_depth_format(&self.device)?;
            self.render_pass = Some(RenderPass::new_default(
                self.device.clone(),
                surface_format.format,
                depth_format,
            )?);
        }
        let Some(render_pass) = self.render_pass.as_ref() else {
            return Err(RhiError::SwapchainError("render pass missing".to_string()));
        };

        let depth = DepthTexture::new(self.device.clone(), extent, render_pass.depth_format())?;

        self.framebuffers = self
            .image_views
            .iter()
            .map(|view| {
                Framebuffer::new(
                    self.device.clone(),
                    render_pass,
                    view.handle(),
                    depth.view(),
                    extent,
                )
            })
            .collect::<RhiResult<_>>()?;
        self.depth = Some(depth);
        self.generation += 1;

        debug_assert_eq!(self.images.len(), self.image_views.len());
        debug_assert_eq!(self.images.len(), self.framebuffers.len());

        info!(
            "Swapchain generation {}: {}x{}, {:?}/{:?}, {:?}, {} images (min {})",
            self.generation,
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            self.images.len(),
            min_image_count
        );
        Ok(())
    }

    /// Releases chain-sized resources.
    ///
    /// Framebuffers, the depth texture and views always go. With `full`,
    /// the render pass and the chain itself go too.
    pub fn destroy(&mut self, full: bool) {
        self.framebuffers.clear();
        self.depth = None;
        self.image_views.clear();

        if full {
            self.render_pass = None;
            if self.swapchain != vk::SwapchainKHR::null() {
                unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
                self.swapchain = vk::SwapchainKHR::null();
            }
            self.images.clear();
            debug!("Swapchain destroyed");
        }
    }

    /// Rebuilds the chain for a new framebuffer size.
    ///
    /// Idles the device first; nothing may still reference the old
    /// framebuffers afterwards.
    pub fn recreate(&mut self, framebuffer_size: (u32, u32)) -> RhiResult<()> {
        self.device.wait_idle()?;
        debug!(
            "Recreating swapchain for {}x{}",
            framebuffer_size.0, framebuffer_size.1
        );
        self.destroy(false);
        self.create(framebuffer_size)
    }

    /// Acquires the next image, signalling `semaphore` when it is ready.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e).with_op("vkAcquireNextImageKHR"),
        }
    }

    /// Queues `image_index` for presentation after `wait_semaphore`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR) => {
                Ok(PresentOutcome::Stale)
            }
            Err(e) => Err(e).with_op("vkQueuePresentKHR"),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn min_image_count(&self) -> u32 {
        self.min_image_count
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_view_count(&self) -> usize {
        self.image_views.len()
    }

    #[inline]
    pub fn framebuffers(&self) -> &[Framebuffer] {
        &self.framebuffers
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Default render pass; present from the first successful create on.
    pub fn render_pass(&self) -> RhiResult<&RenderPass> {
        self.render_pass
            .as_ref()
            .ok_or_else(|| RhiError::SwapchainError("swapchain has no render pass".to_string()))
    }
}

impl Drop for SwapchainState {
    fn drop(&mut self) {
        self.destroy(true);
    }
}

/// Returns `preferred` if the surface lists it, else the first listed pair.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> vk::SurfaceFormatKHR {
    if formats.contains(&preferred) {
        return preferred;
    }
    match formats.first() {
        Some(&first) => {
            warn!(
                "Preferred surface format {:?}/{:?} unavailable, using {:?}/{:?}",
                preferred.format, preferred.color_space, first.format, first.color_space
            );
            first
        }
        None => preferred,
    }
}

/// Picks a format compatible with an existing render pass.
///
/// The exact pair wins; otherwise any entry with the same pixel format.
pub fn require_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    fixed: vk::SurfaceFormatKHR,
) -> RhiResult<vk::SurfaceFormatKHR> {
    if formats.contains(&fixed) {
        return Ok(fixed);
    }
    formats
        .iter()
        .copied()
        .find(|candidate| candidate.format == fixed.format)
        .ok_or_else(|| {
            RhiError::SwapchainError(format!(
                "surface no longer offers {:?}, required by the render pass",
                fixed.format
            ))
        })
}

/// FIFO unless vsync is off and MAILBOX or IMMEDIATE is supported.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync {
        for candidate in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
            if modes.contains(&candidate) {
                return candidate;
            }
        }
        debug!("No tear-free low-latency mode available, falling back to FIFO");
    }
    vk::PresentModeKHR::FIFO
}

/// The surface's current extent, or the framebuffer size clamped to its limits.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped at the maximum when there is one.
pub fn determine_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        preferred.min(caps.max_image_count)
    } else {
        preferred
    }
}

/// `preferred` if supported, else the surface's current transform.
pub fn choose_pre_transform(
    caps: &vk::SurfaceCapabilitiesKHR,
    preferred: vk::SurfaceTransformFlagsKHR,
) -> vk::SurfaceTransformFlagsKHR {
    if caps.supported_transforms.contains(preferred) {
        preferred
    } else {
        caps.current_transform
    }
}

/// `preferred` if supported, else the first supported mode in a fixed order.
pub fn choose_composite_alpha(
    caps: &vk::SurfaceCapabilitiesKHR,
    preferred: vk::CompositeAlphaFlagsKHR,
) -> vk::CompositeAlphaFlagsKHR {
    if caps.supported_composite_alpha.contains(preferred) {
        return preferred;
    }
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&mode| caps.supported_composite_alpha.contains(mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Color attachment usage plus transfer source/destination where supported.
pub fn choose_image_usage(caps: &vk::SurfaceCapabilitiesKHR) -> vk::ImageUsageFlags {
    let optional = vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
    vk::ImageUsageFlags::COLOR_ATTACHMENT | (caps.supported_usage_flags & optional)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srgb() -> vk::SurfaceFormatKHR {
        SwapchainPreferences::default().surface_format
    }

    #[test]
    fn test_choose_surface_format_prefers_requested_pair() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            srgb(),
        ];
        assert_eq!(choose_surface_format(&formats, srgb()), srgb());
    }

    #[test]
    fn test_choose_surface_format_needs_matching_color_space() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            },
        ];
        let selected = choose_surface_format(&formats, srgb());
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_recreate_keeps_render_pass_format() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(require_surface_format(&[unorm, srgb()], srgb()).ok(), Some(srgb()));

        let other_space = vk::SurfaceFormatKHR {
            format: srgb().format,
            color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
        };
        assert_eq!(
            require_surface_format(&[unorm, other_space], srgb()).ok(),
            Some(other_space)
        );
    }

    #[test]
    fn test_recreate_rejects_lost_render_pass_format() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let result = require_surface_format(&[unorm], srgb());
        assert!(matches!(result, Err(RhiError::SwapchainError(_))));
        assert!(require_surface_format(&[], srgb()).is_err());
    }

    #[test]
    fn test_choose_present_mode_vsync_is_fifo() {
        let modes = [
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_present_mode_without_vsync() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);

        let no_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&no_mailbox, false),
            vk::PresentModeKHR::IMMEDIATE
        );

        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&fifo_only, false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        assert_eq!(
            choose_extent(&caps, 800, 600),
            vk::Extent2D {
                width: 1920,
                height: 1080
            }
        );
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&caps, 3000, 50);
        assert_eq!(extent.width, 2000);
        assert_eq!(extent.height, 100);

        let extent = choose_extent(&caps, 800, 600);
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let roomy = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&roomy), 3);

        let unlimited = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unlimited), 3);
    }

    #[test]
    fn test_pre_transform_fallback() {
        let caps = vk::SurfaceCapabilitiesKHR {
            supported_transforms: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            ..Default::default()
        };
        assert_eq!(
            choose_pre_transform(&caps, vk::SurfaceTransformFlagsKHR::IDENTITY),
            vk::SurfaceTransformFlagsKHR::ROTATE_90
        );

        let caps = vk::SurfaceCapabilitiesKHR {
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY
                | vk::SurfaceTransformFlagsKHR::ROTATE_90,
            current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            ..Default::default()
        };
        assert_eq!(
            choose_pre_transform(&caps, vk::SurfaceTransformFlagsKHR::IDENTITY),
            vk::SurfaceTransformFlagsKHR::IDENTITY
        );
    }

    #[test]
    fn test_composite_alpha_fallback() {
        let caps = vk::SurfaceCapabilitiesKHR {
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
                | vk::CompositeAlphaFlagsKHR::INHERIT,
            ..Default::default()
        };
        assert_eq!(
            choose_composite_alpha(&caps, vk::CompositeAlphaFlagsKHR::OPAQUE),
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
        );
        assert_eq!(
            choose_composite_alpha(&caps, vk::CompositeAlphaFlagsKHR::INHERIT),
            vk::CompositeAlphaFlagsKHR::INHERIT
        );
    }

    #[test]
    fn test_image_usage_adds_supported_transfer_bits() {
        let caps = vk::SurfaceCapabilitiesKHR {
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::STORAGE,
            ..Default::default()
        };
        assert_eq!(
            choose_image_usage(&caps),
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST
        );

        let bare = vk::SurfaceCapabilitiesKHR::default();
        assert_eq!(
            choose_image_usage(&bare),
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        );
    }

    #[test]
    fn test_surface_support_is_adequate() {
        let adequate = SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![srgb()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_modes = SurfaceSupport {
            present_modes: vec![],
            ..adequate.clone()
        };
        assert!(!no_modes.is_adequate());
    }
}
