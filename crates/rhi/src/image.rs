//! Image views and the depth texture.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult, VkResultExt};

/// Depth formats tried in order.
pub const DEPTH_FORMAT_CANDIDATES: &[vk::Format] = &[
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Whether `format` carries a stencil component.
pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::S8_UINT
    )
}

/// Aspect mask for a depth attachment view of `format`.
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

/// Picks the first depth format usable as an optimal-tiling attachment.
pub fn find_depth_format(device: &Device) -> RhiResult<vk::Format> {
    device
        .find_supported_format(
            DEPTH_FORMAT_CANDIDATES,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
        .ok_or_else(|| RhiError::SwapchainError("no supported depth format".to_string()))
}

/// Owned 2D image view.
pub struct ImageView {
    device: Arc<Device>,
    view: vk::ImageView,
}

impl ImageView {
    /// Creates a single-mip, single-layer 2D view of `image`.
    pub fn new_2d(
        device: Arc<Device>,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> RhiResult<Self> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = unsafe {
            device
                .handle()
                .create_image_view(&view_info, None)
                .with_op("vkCreateImageView")?
        };

        Ok(Self { device, view })
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_image_view(self.view, None) };
    }
}

/// Depth attachment shared by every framebuffer of a swapchain generation.
///
/// Dropped in order: view, image, allocation.
pub struct DepthTexture {
    device: Arc<Device>,
    image: vk::Image,
    view: Option<ImageView>,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl DepthTexture {
    /// Creates a GPU-only depth image of `extent` and its view.
    pub fn new(device: Arc<Device>, extent: vk::Extent2D, format: vk::Format) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "depth texture extent must be non-zero, got {}x{}",
                extent.width, extent.height
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe {
            device
                .handle()
                .create_image(&image_info, None)
                .with_op("vkCreateImage")?
        };

        // From here on, an early return drops `texture` and releases what exists.
        let mut texture = Self {
            device: device.clone(),
            image,
            view: None,
            allocation: None,
            format,
            extent,
        };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let allocation = device
            .allocator()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .allocate(&AllocationCreateDesc {
                name: "depth_texture",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?;

        let bind = unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        texture.allocation = Some(allocation);
        bind.with_op("vkBindImageMemory")?;

        texture.view = Some(ImageView::new_2d(
            device,
            image,
            format,
            depth_aspect(format),
        )?);

        debug!(
            "Created depth texture {}x{} ({:?})",
            extent.width, extent.height, format
        );
        Ok(texture)
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// View handle; null only while construction is unwinding.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
            .as_ref()
            .map_or(vk::ImageView::null(), ImageView::handle)
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for DepthTexture {
    fn drop(&mut self) {
        self.view = None;
        unsafe { self.device.handle().destroy_image(self.image, None) };

        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self
                .device
                .allocator()
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err(e) = allocator.free(allocation) {
                error!("Failed to free depth texture memory: {}", e);
            }
        }
        debug!(
            "Destroyed depth texture {}x{}",
            self.extent.width, self.extent.height
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_aspect() {
        assert_eq!(
            depth_aspect(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_candidates_prefer_pure_depth() {
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
        assert!(DEPTH_FORMAT_CANDIDATES[1..].iter().all(|&f| has_stencil(f)));
    }
}
