//! Vulkan layer for the presentation core.
//!
//! Covers instance creation with the validation sink, GPU capability
//! probing and selection, the logical device, the swapchain with its render
//! pass, depth attachment and framebuffers, frame-slot synchronization,
//! shader loading and the graphics pipeline builder.

mod error;

pub mod command;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult, VkResultExt};

pub use ash::vk;
