//! Frame scheduling and the render context.
//!
//! - [`FrameScheduler`] runs the per-frame acquire/submit/present protocol
//!   over any [`FrameBackend`].
//! - [`VulkanFrameBackend`] is the GPU implementation of that backend.
//! - [`RenderContext`] owns the whole Vulkan stack and is what the
//!   application calls into.

mod backend;
mod context;
mod error;
mod scheduler;

pub use backend::{PipelineId, VulkanFrameBackend};
pub use context::RenderContext;
pub use error::{RenderError, RenderResult};
pub use scheduler::{FrameBackend, FrameOutcome, FrameScheduler, FrameState};
