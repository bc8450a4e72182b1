//! RHI-specific error types.

use std::panic::Location;

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
///
/// Every variant is fatal to the render loop. Swapchain invalidation is not
/// an error here; it is reported through the acquire/present outcome enums.
#[derive(Error, Debug)]
pub enum RhiError {
    /// A Vulkan call failed. Carries the entry point name and the call site.
    #[error("{op} failed with {result} at {}:{}", location.file(), location.line())]
    Vulkan {
        op: &'static str,
        result: vk::Result,
        location: &'static Location<'static>,
    },

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No physical device scored above zero
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A requested instance layer is not installed
    #[error("Required layer not available: {0}")]
    MissingLayer(String),

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RhiError {
    /// The raw Vulkan result, when this error came from an API call.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Self::Vulkan { result, .. } => Some(*result),
            _ => None,
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

/// Attaches the Vulkan entry point name and call site to a raw result.
pub trait VkResultExt<T> {
    /// Convert into an [`RhiError::Vulkan`] naming `op` and the caller's location.
    fn with_op(self, op: &'static str) -> RhiResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    #[track_caller]
    fn with_op(self, op: &'static str) -> RhiResult<T> {
        let location = Location::caller();
        self.map_err(|result| RhiError::Vulkan {
            op,
            result,
            location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_op_records_call_site() {
        let failed: Result<(), vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        let line = line!() + 1;
        let err = failed.with_op("vkQueueSubmit").unwrap_err();

        match &err {
            RhiError::Vulkan {
                op,
                result,
                location,
            } => {
                assert_eq!(*op, "vkQueueSubmit");
                assert_eq!(*result, vk::Result::ERROR_DEVICE_LOST);
                assert_eq!(location.line(), line);
                assert!(location.file().ends_with("error.rs"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let text = err.to_string();
        assert!(text.starts_with("vkQueueSubmit failed with"));
        assert!(text.contains("error.rs:"));
        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_DEVICE_LOST));
    }

    #[test]
    fn test_with_op_passes_success_through() {
        let ok: Result<u32, vk::Result> = Ok(7);
        assert_eq!(ok.with_op("vkAcquireNextImageKHR").unwrap(), 7);
    }

    #[test]
    fn test_non_vulkan_error_has_no_result() {
        assert_eq!(RhiError::NoSuitableGpu.vk_result(), None);
    }
}
