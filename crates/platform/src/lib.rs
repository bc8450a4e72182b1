//! Platform layer: the winit window and the Vulkan surface it provides.

mod window;

pub use window::{ResizeFlag, Surface, SurfaceProvider, Window, required_extensions};
