//! Window management using winit.
//!
//! [`Window`] is the surface provider for the render context: it reports
//! the framebuffer size, creates the Vulkan surface and carries the
//! resize-notification flag the frame scheduler reads and clears.

use std::ffi::{CStr, c_char};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use vkpresent_core::{Error, Result, WindowConfig};

/// Source of a presentation surface and of framebuffer-size changes.
pub trait SurfaceProvider {
    /// Current framebuffer size in pixels. Zero in either dimension while
    /// minimized.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Instance extensions the surface needs.
    fn required_extensions(&self) -> Result<Vec<*const c_char>>;

    /// Creates a surface on `instance`, which must outlive it.
    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface>;

    /// Returns whether a resize was reported since the last call, and clears it.
    fn take_resized(&self) -> bool;
}

/// Resize notification shared between the event loop and the renderer.
#[derive(Debug, Default)]
pub struct ResizeFlag(AtomicBool);

impl ResizeFlag {
    pub fn notify(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// RAII wrapper for a Vulkan surface.
///
/// The instance the surface was created on must outlive it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle came from ash_window::create_surface on the
        // instance the loader was built from, and is destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// A winit window acting as the surface provider.
pub struct Window {
    window: Arc<WinitWindow>,
    resized: ResizeFlag,
}

impl Window {
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", config.width, config.height);

        Ok(Self {
            window: Arc::new(window),
            resized: ResizeFlag::default(),
        })
    }

    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    pub fn id(&self) -> winit::window::WindowId {
        self.window.id()
    }

    /// Records a resize reported by the event loop.
    pub fn notify_resized(&self, width: u32, height: u32) {
        self.resized.notify();
        tracing::debug!("Window resized: {}x{}", width, height);
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }
}

impl SurfaceProvider for Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;
        required_extensions(display_handle.as_raw())
    }

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: entry and instance are live, both handles come from the
        // winit window, and the surface is destroyed in Surface::drop.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Surface(format!("vkCreate*SurfaceKHR failed: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }

    fn take_resized(&self) -> bool {
        self.resized.take()
    }
}

/// Instance extensions needed to create a surface for `display_handle`.
///
/// The pointers refer to static strings owned by `ash_window`.
pub fn required_extensions(display_handle: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let extensions = ash_window::enumerate_required_extensions(display_handle)
        .map_err(|e| Error::Surface(format!("Failed to enumerate surface extensions: {}", e)))?;

    tracing::debug!(
        "Surface extensions: {:?}",
        extensions
            .iter()
            // SAFETY: ash_window returns NUL-terminated static strings.
            .map(|&ext| unsafe { CStr::from_ptr(ext) })
            .collect::<Vec<_>>()
    );

    Ok(extensions.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_flag_take_clears() {
        let flag = ResizeFlag::default();
        assert!(!flag.take());

        flag.notify();
        flag.notify();
        assert!(flag.is_set());
        assert!(flag.take());
        assert!(!flag.take());
        assert!(!flag.is_set());
    }
}
