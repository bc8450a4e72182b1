//! Vulkan instance management.
//!
//! This module handles VkInstance creation, the validation layer and the
//! debug messenger that forwards validation output to `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use vkpresent_rhi::instance::{Instance, InstanceDesc};
//!
//! # fn example(surface_extensions: &[*const std::ffi::c_char]) -> vkpresent_rhi::RhiResult<()> {
//! let instance = Instance::new(&InstanceDesc {
//!     application_name: c"demo",
//!     enable_validation: cfg!(debug_assertions),
//!     surface_extensions,
//! })?;
//! let vk_instance = instance.handle();
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::ffi::{CStr, c_char};
use std::sync::Mutex;

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult, VkResultExt};

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Parameters for [`Instance::new`].
pub struct InstanceDesc<'a> {
    pub application_name: &'a CStr,
    /// Requires the validation layer; instance creation fails without it.
    pub enable_validation: bool,
    /// Extensions the surface provider needs (see `ash_window::enumerate_required_extensions`).
    pub surface_extensions: &'a [*const c_char],
}

/// Receiver for validation messages.
///
/// Each message ID is reported once; repeats are dropped.
#[derive(Debug, Default)]
pub struct DebugSink {
    seen: Mutex<HashSet<i32>>,
}

impl DebugSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `message_id` is seen.
    pub fn should_report(&self, message_id: i32) -> bool {
        match self.seen.lock() {
            Ok(mut seen) => seen.insert(message_id),
            // A poisoned set still holds valid IDs.
            Err(poisoned) => poisoned.into_inner().insert(message_id),
        }
    }

    /// Number of distinct message IDs reported so far.
    pub fn distinct_messages(&self) -> usize {
        match self.seen.lock() {
            Ok(seen) => seen.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Vulkan instance wrapper with optional validation layer support.
pub struct Instance {
    /// Vulkan entry point loader
    entry: Entry,
    /// Vulkan instance handle
    instance: ash::Instance,
    /// Debug utils extension loader (only present when validation is enabled)
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    /// Debug messenger handle (only present when validation is enabled)
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    /// Boxed so the pointer handed to the messenger stays stable.
    debug_sink: Option<Box<DebugSink>>,
}

impl Instance {
    /// Creates a new Vulkan instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - Validation was requested and the layer is not installed
    /// - Instance or debug messenger creation fails
    pub fn new(desc: &InstanceDesc<'_>) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        if desc.enable_validation && !Self::is_validation_layer_available(&entry)? {
            error!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
            return Err(RhiError::MissingLayer(
                VALIDATION_LAYER_NAME.to_string_lossy().into_owned(),
            ));
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(desc.application_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"vkpresent")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let mut extensions = desc.surface_extensions.to_vec();
        if desc.enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let mut flags = vk::InstanceCreateFlags::empty();
        if cfg!(any(target_os = "macos", target_os = "ios")) {
            extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let layers = if desc.enable_validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .flags(flags)
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .with_op("vkCreateInstance")?
        };

        info!(
            "Vulkan instance created ({} extensions, validation {})",
            extensions.len(),
            if desc.enable_validation { "on" } else { "off" }
        );

        let mut this = Self {
            entry,
            instance,
            debug_utils: None,
            debug_messenger: None,
            debug_sink: None,
        };

        if desc.enable_validation {
            // On failure `this` drops and destroys the instance.
            this.setup_debug_messenger()?;
            info!("Debug messenger created");
        }

        Ok(this)
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation output is being forwarded.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// Checks if the Khronos validation layer is available.
    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let available_layers = unsafe {
            entry
                .enumerate_instance_layer_properties()
                .with_op("vkEnumerateInstanceLayerProperties")?
        };

        Ok(available_layers.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
        }))
    }

    fn setup_debug_messenger(&mut self) -> RhiResult<()> {
        let debug_utils = ash::ext::debug_utils::Instance::new(&self.entry, &self.instance);
        let sink = Box::new(DebugSink::new());

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(&*sink as *const DebugSink as *mut std::ffi::c_void);

        let messenger = unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .with_op("vkCreateDebugUtilsMessengerEXT")?
        };

        self.debug_utils = Some(debug_utils);
        self.debug_messenger = Some(messenger);
        self.debug_sink = Some(sink);
        Ok(())
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        if let Some(sink) = &self.debug_sink {
            debug!(
                "Debug sink saw {} distinct validation messages",
                sink.distinct_messages()
            );
        }
        info!("Vulkan instance destroyed");
    }
}

fn category_name(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    }
}

/// Forwards validation messages to `tracing`, once per message ID.
///
/// # Safety
///
/// Called by the Vulkan loader. `user_data` is either null or the
/// [`DebugSink`] owned by the [`Instance`] that registered this callback.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let sink = unsafe { (user_data as *const DebugSink).as_ref() };
    if let Some(sink) = sink
        && !sink.should_report(callback_data.message_id_number)
    {
        return vk::FALSE;
    }

    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };
    let category = category_name(message_type);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("[Vulkan {}] {}", category, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[Vulkan {}] {}", category, message);
        }
        _ => {
            info!("[Vulkan {}] {}", category, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_sink_reports_each_id_once() {
        let sink = DebugSink::new();
        assert!(sink.should_report(0x1234));
        assert!(!sink.should_report(0x1234));
        assert!(sink.should_report(-7));
        assert!(!sink.should_report(0x1234));
        assert_eq!(sink.distinct_messages(), 2);
    }

    #[test]
    fn test_category_names() {
        assert_eq!(
            category_name(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION),
            "Validation"
        );
        assert_eq!(
            category_name(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE),
            "Performance"
        );
        assert_eq!(
            category_name(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            ),
            "Unknown"
        );
    }

    #[test]
    fn test_instance_creation_without_validation() {
        // Requires a Vulkan loader; skipped otherwise.
        let desc = InstanceDesc {
            application_name: c"vkpresent-test",
            enable_validation: false,
            surface_extensions: &[],
        };
        match Instance::new(&desc) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => {
                eprintln!("Skipping test: no usable Vulkan driver ({e})");
            }
        }
    }

    #[test]
    fn test_instance_creation_with_validation() {
        let desc = InstanceDesc {
            application_name: c"vkpresent-test",
            enable_validation: true,
            surface_extensions: &[],
        };
        match Instance::new(&desc) {
            Ok(instance) => {
                assert!(instance.has_validation());
                assert!(instance.debug_sink.is_some());
            }
            Err(RhiError::MissingLayer(name)) => {
                assert_eq!(name, "VK_LAYER_KHRONOS_validation");
            }
            Err(e) => {
                eprintln!("Skipping test: Vulkan not available ({e})");
            }
        }
    }
}
