//! Renderer configuration loaded from TOML.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Upper bound accepted for `frames_in_flight`.
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 4;
/// Frame slots used when the configuration does not say otherwise.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Initial window parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: String::from("vkpresent"),
        }
    }
}

/// Settings consumed by the render context at init time.
///
/// Every field has a default, so an empty file is a valid configuration.
///
/// ```toml
/// frames_in_flight = 3
/// vsync = false
///
/// [window]
/// width = 1280
/// height = 720
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub window: WindowConfig,
    /// Number of frame slots (F).
    pub frames_in_flight: usize,
    /// `false` asks for MAILBOX or IMMEDIATE when the surface supports them.
    pub vsync: bool,
    /// Enables `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub validation: bool,
    pub clear_color: [f32; 4],
    pub log_filter: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            vsync: true,
            validation: cfg!(debug_assertions),
            clear_color: [0.02, 0.02, 0.04, 1.0],
            log_filter: String::from(crate::DEFAULT_LOG_FILTER),
        }
    }
}

impl RendererConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    ///
    /// A missing file yields the defaults; any other read failure is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                tracing::info!("Loading renderer config from {:?}", path);
                Self::from_toml_str(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reject values the renderer cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if !(1..=MAX_FRAMES_IN_FLIGHT_LIMIT).contains(&self.frames_in_flight) {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT_LIMIT, self.frames_in_flight
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.frames_in_flight, DEFAULT_FRAMES_IN_FLIGHT);
        assert!((1..=MAX_FRAMES_IN_FLIGHT_LIMIT).contains(&DEFAULT_FRAMES_IN_FLIGHT));
        assert!(config.vsync);
    }

    #[test]
    fn test_partial_override() {
        let config = RendererConfig::from_toml_str(
            r#"
            frames_in_flight = 3
            vsync = false

            [window]
            width = 1280
            "#,
        )
        .unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert!(!config.vsync);
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "vkpresent");
    }

    #[test]
    fn test_rejects_zero_frames_in_flight() {
        let err = RendererConfig::from_toml_str("frames_in_flight = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_too_many_frames_in_flight() {
        let err = RendererConfig::from_toml_str("frames_in_flight = 9").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_zero_window() {
        let err = RendererConfig::from_toml_str("[window]\nheight = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = RendererConfig::from_toml_str("vsync = maybe").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file_yields_default() {
        let config = RendererConfig::load(Path::new("definitely/not/here.toml")).unwrap();
        assert_eq!(config, RendererConfig::default());
    }
}
