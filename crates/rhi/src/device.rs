//! Vulkan logical device, queues and the shared command pool.
//!
//! # Example
//!
//! ```no_run
//! use vkpresent_rhi::device::Device;
//! use vkpresent_rhi::instance::Instance;
//! use vkpresent_rhi::physical_device::Gpu;
//!
//! # fn example(instance: &Instance, gpu: &Gpu) -> vkpresent_rhi::RhiResult<()> {
//! let device = Device::new(instance, gpu)?;
//! let graphics_queue = device.graphics_queue();
//! let present_queue = device.present_queue();
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult, VkResultExt};
use crate::instance::Instance;
use crate::physical_device::{Gpu, QueueFamilyIndices};

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// One queue-create request per distinct family, each with a single queue at priority 1.0.
pub fn queue_create_infos(
    families: &QueueFamilyIndices,
) -> Vec<vk::DeviceQueueCreateInfo<'static>> {
    families
        .unique_families()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITIES)
        })
        .collect()
}

/// Vulkan logical device wrapper.
///
/// Owns the queues, the GPU memory allocator and the single command pool
/// (bound to the graphics family) every command buffer is allocated from.
/// Shared through `Arc`; the last owner destroys the pool, then the
/// allocator, then the device.
pub struct Device {
    /// Kept for format and limit queries after selection.
    instance: ash::Instance,
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// GPU memory allocator.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Command pool for all primary and secondary buffers.
    command_pool: Mutex<vk::CommandPool>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    compute_queue: Option<vk::Queue>,
    transfer_queue: Option<vk::Queue>,
    /// Queue family indices.
    queue_families: QueueFamilyIndices,
}

impl Device {
    /// Creates the logical device for `gpu`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The graphics or present family is unresolved
    /// - Device, command pool or allocator creation fails
    pub fn new(instance: &Instance, gpu: &Gpu) -> RhiResult<Arc<Self>> {
        let queue_families = gpu.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let queue_infos = queue_create_infos(&queue_families);
        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_infos.len(),
            queue_families.unique_families()
        );

        let extension_names: Vec<*const std::ffi::c_char> =
            gpu.extensions.iter().map(|ext| ext.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(gpu.device, &create_info, None)
                .with_op("vkCreateDevice")?
        };

        info!(
            "Logical device created with extensions {:?}",
            gpu.extensions
        );

        // Roles that share a family get the same queue handle.
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        let compute_queue = queue_families
            .compute_family
            .map(|family| unsafe { device.get_device_queue(family, 0) });
        let transfer_queue = queue_families
            .transfer_family
            .map(|family| unsafe { device.get_device_queue(family, 0) });

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(graphics_family);

        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(result) => {
                unsafe { device.destroy_device(None) };
                return Err(result).with_op("vkCreateCommandPool");
            }
        };
        debug!("Command pool created for graphics family {}", graphics_family);

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: gpu.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe {
                    device.destroy_command_pool(command_pool, None);
                    device.destroy_device(None);
                }
                return Err(e.into());
            }
        };
        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            instance: instance.handle().clone(),
            device,
            physical_device: gpu.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            command_pool: Mutex::new(command_pool),
            graphics_queue,
            present_queue,
            compute_queue,
            transfer_queue,
            queue_families,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the instance function table the device was created from.
    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn compute_queue(&self) -> Option<vk::Queue> {
        self.compute_queue
    }

    #[inline]
    pub fn transfer_queue(&self) -> Option<vk::Queue> {
        self.transfer_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Returns the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    fn lock_pool(&self) -> MutexGuard<'_, vk::CommandPool> {
        self.command_pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocates `count` command buffers of `level` from the shared pool.
    pub fn allocate_command_buffers(
        &self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> RhiResult<Vec<vk::CommandBuffer>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let pool = self.lock_pool();
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(level)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .with_op("vkAllocateCommandBuffers")
        }
    }

    /// Returns command buffers to the shared pool.
    ///
    /// The buffers must not be pending execution.
    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        let pool = self.lock_pool();
        unsafe { self.device.free_command_buffers(*pool, buffers) };
    }

    /// Blocks until every queue is idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle().with_op("vkDeviceWaitIdle") }
    }

    /// Submits work to the graphics queue.
    ///
    /// # Safety
    ///
    /// The command buffers must be fully recorded, the semaphores and fence
    /// referenced by `submit_infos`/`fence` must be in a state that allows
    /// the submission.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)
                .with_op("vkQueueSubmit")
        }
    }

    /// First format in `candidates` whose optimal-tiling features include `features`.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        candidates.iter().copied().find(|&format| {
            let props = unsafe {
                self.instance
                    .get_physical_device_format_properties(self.physical_device, format)
            };
            props.optimal_tiling_features.contains(features)
        })
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            let pool = *self.lock_pool();
            self.device.destroy_command_pool(pool, None);

            // Outstanding allocations are reported by gpu-allocator here.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// SAFETY: ash::Device and ash::Instance are plain function tables, queue and
// pool handles are Copy, and the allocator and pool are behind mutexes.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_family_yields_one_request() {
        let families = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
            ..Default::default()
        };
        let infos = queue_create_infos(&families);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].queue_family_index, 0);
        assert_eq!(infos[0].queue_count, 1);
    }

    #[test]
    fn test_distinct_families_yield_one_request_each() {
        let families = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
            compute_family: Some(0),
            transfer_family: Some(1),
        };
        let infos = queue_create_infos(&families);
        let indices: Vec<u32> = infos.iter().map(|info| info.queue_family_index).collect();
        assert_eq!(indices, vec![0, 2, 1]);

        for info in &infos {
            assert_eq!(info.queue_count, 1);
            let priorities =
                unsafe { std::slice::from_raw_parts(info.p_queue_priorities, 1) };
            assert_eq!(priorities, &[1.0]);
        }
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
