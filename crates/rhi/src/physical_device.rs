//! Physical device probing and selection.
//!
//! Each candidate GPU is probed into a [`CapabilityReport`]: queue family
//! roles, surface support and device-extension support. Viable reports are
//! scored and the best one becomes the [`Gpu`] the logical device is built on.
//!
//! # Example
//!
//! ```no_run
//! use vkpresent_rhi::physical_device::{QueueRoles, select_gpu};
//! use ash::vk;
//!
//! # fn example(
//! #     instance: &ash::Instance,
//! #     surface: vk::SurfaceKHR,
//! #     surface_loader: &ash::khr::surface::Instance,
//! # ) -> vkpresent_rhi::RhiResult<()> {
//! let gpu = select_gpu(instance, surface, surface_loader, QueueRoles::default())?;
//! println!("Selected GPU: {}", gpu.device_name());
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult, VkResultExt};

/// Device extensions every selected GPU must support.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Enabled whenever the device advertises it (MoltenVK and other layered drivers).
pub const PORTABILITY_SUBSET_EXTENSION: &CStr = c"VK_KHR_portability_subset";

/// Score bonus for discrete GPUs.
const DISCRETE_GPU_BONUS: u32 = 1000;

/// Queue roles the caller wants resolved.
///
/// Graphics and present are always needed for presentation; compute and
/// transfer are searched for only when requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueRoles {
    pub graphics: bool,
    pub present: bool,
    pub compute: bool,
    pub transfer: bool,
}

impl Default for QueueRoles {
    fn default() -> Self {
        Self {
            graphics: true,
            present: true,
            compute: false,
            transfer: false,
        }
    }
}

/// Queue family indices for different queue types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to a surface.
    pub present_family: Option<u32>,
    /// Index of the queue family that supports compute operations.
    pub compute_family: Option<u32>,
    /// Index of the queue family that supports transfer operations.
    pub transfer_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Graphics and present are both resolved.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Every role in `roles` has a family.
    pub fn satisfies(&self, roles: QueueRoles) -> bool {
        (!roles.graphics || self.graphics_family.is_some())
            && (!roles.present || self.present_family.is_some())
            && (!roles.compute || self.compute_family.is_some())
            && (!roles.transfer || self.transfer_family.is_some())
    }

    /// Returns the distinct family indices in role order.
    ///
    /// The logical device creates exactly one queue per entry.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(4);

        for family in [
            self.graphics_family,
            self.present_family,
            self.compute_family,
            self.transfer_family,
        ]
        .into_iter()
        .flatten()
        {
            if !families.contains(&family) {
                families.push(family);
            }
        }

        families
    }
}

/// Walks the queue families in order and assigns roles.
///
/// Roles are filled first-come. Within one family graphics is considered
/// before present, and a present-capable family is taken only while no
/// graphics family is chosen or when it differs from the chosen one. The
/// walk stops as soon as every requested role is filled. `supports_present`
/// is only called for families that could still take the present role.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    roles: QueueRoles,
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;

        if family.queue_count == 0 {
            continue;
        }

        if roles.graphics
            && indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(i);
        }

        if roles.present
            && indices.present_family.is_none()
            && indices.graphics_family.is_none_or(|graphics| graphics != i)
            && supports_present(i)
        {
            indices.present_family = Some(i);
        }

        if roles.compute
            && indices.compute_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::COMPUTE)
        {
            indices.compute_family = Some(i);
        }

        if roles.transfer
            && indices.transfer_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::TRANSFER)
        {
            indices.transfer_family = Some(i);
        }

        if indices.satisfies(roles) {
            break;
        }
    }

    indices
}

/// What a surface offers a particular physical device.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    /// Image count and extent limits, transforms, composite alpha, usage flags.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format and color space pairs.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Queries the surface, failing on the first error.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .with_op("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?
        };
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .with_op("vkGetPhysicalDeviceSurfaceFormatsKHR")?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .with_op("vkGetPhysicalDeviceSurfacePresentModesKHR")?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Returns the extensions to enable, or `None` if a required one is missing.
pub fn resolve_device_extensions(available: &[&CStr]) -> Option<Vec<&'static CStr>> {
    let mut enabled = Vec::with_capacity(REQUIRED_DEVICE_EXTENSIONS.len() + 1);

    for &required in REQUIRED_DEVICE_EXTENSIONS {
        if !available.contains(&required) {
            return None;
        }
        enabled.push(required);
    }

    if available.contains(&PORTABILITY_SUBSET_EXTENSION) {
        enabled.push(PORTABILITY_SUBSET_EXTENSION);
    }

    Some(enabled)
}

/// Everything learned about one physical device candidate.
///
/// Probing never fails; queries that error leave their fields empty, which
/// makes the report non-viable.
#[derive(Clone)]
pub struct CapabilityReport {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
    pub surface: SurfaceSupport,
    /// `None` when a required device extension is missing.
    pub extensions: Option<Vec<&'static CStr>>,
}

impl CapabilityReport {
    /// Graphics and present resolved, extensions supported, surface adequate.
    pub fn is_viable(&self) -> bool {
        self.queue_families.is_complete() && self.extensions.is_some() && self.surface.is_adequate()
    }

    /// Selection score; zero for non-viable candidates.
    pub fn score(&self) -> u32 {
        score_candidate(
            self.is_viable(),
            self.properties.device_type,
            self.properties.limits.max_image_dimension2_d,
        )
    }

    pub fn device_name(&self) -> String {
        device_name(&self.properties)
    }
}

/// `1000 * discrete + maxImageDimension2D`, or zero when not viable.
pub fn score_candidate(
    viable: bool,
    device_type: vk::PhysicalDeviceType,
    max_image_dimension_2d: u32,
) -> u32 {
    if !viable {
        return 0;
    }

    let discrete = if device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        DISCRETE_GPU_BONUS
    } else {
        0
    };
    discrete.saturating_add(max_image_dimension_2d)
}

/// Index of the first highest positive score.
pub fn pick_best(scores: &[u32]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score == 0 {
            continue;
        }
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

/// Probes one candidate against `surface`.
pub fn probe(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
    roles: QueueRoles,
) -> CapabilityReport {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(device) };

    let queue_families = find_queue_families(&family_properties, roles, |i| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, i, surface)
            .unwrap_or(false)
    });

    let available = unsafe {
        instance
            .enumerate_device_extension_properties(device)
            .unwrap_or_default()
    };
    let available_names: Vec<&CStr> = available
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .collect();
    let extensions = resolve_device_extensions(&available_names);

    // Surface details only matter once the extension set is known to be usable.
    let surface_support = if extensions.is_some() {
        SurfaceSupport::query(device, surface, surface_loader).unwrap_or_default()
    } else {
        SurfaceSupport::default()
    };

    CapabilityReport {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
        surface: surface_support,
        extensions,
    }
}

/// The physical device chosen for rendering.
#[derive(Clone)]
pub struct Gpu {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for the requested roles.
    pub queue_families: QueueFamilyIndices,
    /// Device extensions to enable at logical device creation.
    pub extensions: Vec<&'static CStr>,
    /// Selection score.
    pub score: u32,
}

impl Gpu {
    fn from_report(report: CapabilityReport) -> Option<Self> {
        let score = report.score();
        let extensions = report.extensions?;
        Some(Self {
            device: report.device,
            properties: report.properties,
            features: report.features,
            memory_properties: report.memory_properties,
            queue_families: report.queue_families,
            extensions,
            score,
        })
    }

    pub fn device_name(&self) -> String {
        device_name(&self.properties)
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }
}

impl std::fmt::Debug for Gpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = self.properties.api_version;
        f.debug_struct("Gpu")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field(
                "api_version",
                &format!(
                    "{}.{}.{}",
                    vk::api_version_major(version),
                    vk::api_version_minor(version),
                    vk::api_version_patch(version)
                ),
            )
            .field("queue_families", &self.queue_families)
            .field("score", &self.score)
            .finish()
    }
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| String::from("Unknown Device"))
}

/// Probes every physical device and returns the best-scoring one.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when no candidate scores above zero.
pub fn select_gpu(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
    roles: QueueRoles,
) -> RhiResult<Gpu> {
    let devices = unsafe {
        instance
            .enumerate_physical_devices()
            .with_op("vkEnumeratePhysicalDevices")?
    };
    info!("Found {} GPU(s)", devices.len());

    let mut reports: Vec<CapabilityReport> = devices
        .into_iter()
        .map(|device| probe(instance, device, surface, surface_loader, roles))
        .collect();

    let scores: Vec<u32> = reports
        .iter()
        .map(|report| {
            let score = report.score();
            debug!(
                "GPU '{}': queues={:?} extensions={} formats={} present_modes={} score={}",
                report.device_name(),
                report.queue_families,
                report.extensions.is_some(),
                report.surface.formats.len(),
                report.surface.present_modes.len(),
                score
            );
            score
        })
        .collect();

    let Some(best) = pick_best(&scores) else {
        warn!("No GPU satisfies the presentation requirements");
        return Err(RhiError::NoSuitableGpu);
    };

    let gpu = Gpu::from_report(reports.swap_remove(best)).ok_or(RhiError::NoSuitableGpu)?;
    info!("Selected {:?}", gpu);
    Ok(gpu)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn viable_report(device_type: vk::PhysicalDeviceType, max_dim: u32) -> CapabilityReport {
        let mut properties = vk::PhysicalDeviceProperties {
            device_type,
            ..Default::default()
        };
        properties.limits.max_image_dimension2_d = max_dim;

        CapabilityReport {
            device: vk::PhysicalDevice::null(),
            properties,
            features: vk::PhysicalDeviceFeatures::default(),
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            queue_families: QueueFamilyIndices {
                graphics_family: Some(0),
                present_family: Some(1),
                ..Default::default()
            },
            surface: SurfaceSupport {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: vec![vk::SurfaceFormatKHR::default()],
                present_modes: vec![vk::PresentModeKHR::FIFO],
            },
            extensions: Some(vec![ash::khr::swapchain::NAME]),
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(indices.graphics_family.is_none());
        assert!(indices.present_family.is_none());
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_unique_families_graphics_present_shared() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
            ..Default::default()
        };
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn test_unique_families_keeps_role_order() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(2),
            present_family: Some(0),
            compute_family: Some(2),
            transfer_family: Some(1),
        };
        assert_eq!(indices.unique_families(), vec![2, 0, 1]);
    }

    #[test]
    fn test_find_graphics_and_present_in_different_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = find_queue_families(&families, QueueRoles::default(), |_| true);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_present_before_graphics_is_accepted() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let indices = find_queue_families(&families, QueueRoles::default(), |i| i == 0);
        assert_eq!(indices.present_family, Some(0));
        assert_eq!(indices.graphics_family, Some(1));
    }

    #[test]
    fn test_present_on_chosen_graphics_family_is_rejected() {
        // A lone graphics+present family never fills the present role.
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = find_queue_families(&families, QueueRoles::default(), |_| true);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, None);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_search_stops_once_roles_filled() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut queried = Vec::new();
        let indices = find_queue_families(&families, QueueRoles::default(), |i| {
            queried.push(i);
            true
        });
        assert_eq!(indices.present_family, Some(1));
        assert_eq!(queried, vec![1]);
    }

    #[test]
    fn test_optional_roles_only_when_requested() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        ];

        let indices = find_queue_families(&families, QueueRoles::default(), |_| true);
        assert_eq!(indices.compute_family, None);
        assert_eq!(indices.transfer_family, None);

        let roles = QueueRoles {
            compute: true,
            transfer: true,
            ..Default::default()
        };
        let indices = find_queue_families(&families, roles, |_| true);
        assert_eq!(indices.compute_family, Some(0));
        assert_eq!(indices.transfer_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_empty_families_are_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::empty())];
        let indices = find_queue_families(&families, QueueRoles::default(), |_| true);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(2));
    }

    #[test]
    fn test_extension_resolution() {
        let portability = PORTABILITY_SUBSET_EXTENSION;
        let swapchain = ash::khr::swapchain::NAME;

        assert_eq!(resolve_device_extensions(&[]), None);
        assert_eq!(resolve_device_extensions(&[portability]), None);
        assert_eq!(
            resolve_device_extensions(&[swapchain]),
            Some(vec![swapchain])
        );
        assert_eq!(
            resolve_device_extensions(&[portability, swapchain]),
            Some(vec![swapchain, portability])
        );
    }

    #[test]
    fn test_viable_candidates_score_positive() {
        let discrete = viable_report(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        let integrated = viable_report(vk::PhysicalDeviceType::INTEGRATED_GPU, 8192);
        assert_eq!(discrete.score(), 1000 + 16384);
        assert_eq!(integrated.score(), 8192);
    }

    #[test]
    fn test_non_viable_candidates_score_zero() {
        let mut no_present = viable_report(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        no_present.queue_families.present_family = None;
        assert_eq!(no_present.score(), 0);

        let mut no_graphics = viable_report(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        no_graphics.queue_families.graphics_family = None;
        assert_eq!(no_graphics.score(), 0);

        let mut no_extensions = viable_report(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        no_extensions.extensions = None;
        assert_eq!(no_extensions.score(), 0);

        let mut no_formats = viable_report(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        no_formats.surface.formats.clear();
        assert_eq!(no_formats.score(), 0);

        let mut no_modes = viable_report(vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        no_modes.surface.present_modes.clear();
        assert_eq!(no_modes.score(), 0);
    }

    #[test]
    fn test_pick_best_never_picks_zero() {
        assert_eq!(pick_best(&[]), None);
        assert_eq!(pick_best(&[0, 0]), None);
        assert_eq!(pick_best(&[0, 5]), Some(1));
        assert_eq!(pick_best(&[3, 0, 9, 2]), Some(2));
    }

    #[test]
    fn test_pick_best_ties_keep_first() {
        assert_eq!(pick_best(&[7, 9, 9, 1]), Some(1));
    }

    #[test]
    fn test_gpu_from_report() {
        let report = viable_report(vk::PhysicalDeviceType::DISCRETE_GPU, 4096);
        let gpu = Gpu::from_report(report).unwrap();
        assert_eq!(gpu.score, 5096);
        assert_eq!(gpu.device_type_name(), "Discrete GPU");
        assert_eq!(gpu.extensions, vec![ash::khr::swapchain::NAME]);
    }
}
