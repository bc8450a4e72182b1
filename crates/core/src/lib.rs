//! Shared building blocks for the presentation core.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Renderer configuration loaded from TOML
//! - Frame timing for the demo loop

mod config;
mod error;
mod logging;
mod timer;

pub use config::{DEFAULT_FRAMES_IN_FLIGHT, MAX_FRAMES_IN_FLIGHT_LIMIT, RendererConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
pub use timer::FrameTimer;
