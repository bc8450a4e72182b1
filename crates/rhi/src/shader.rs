//! Shader module loading.
//!
//! SPIR-V binaries live under [`SHADER_DIR`] and follow the
//! `<name>.<stage-ext>.spv` naming convention, so a pipeline only has to
//! name its shaders: `("triangle", ShaderStage::Vertex)` resolves to
//! `./assets/shaders/triangle.vert.spv`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkpresent_rhi::device::Device;
//! use vkpresent_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> vkpresent_rhi::RhiResult<()> {
//! let vertex = Shader::load(device.clone(), "triangle", ShaderStage::Vertex)?;
//! let fragment = Shader::load(device, "triangle", ShaderStage::Fragment)?;
//! let _stages = [vertex.stage_create_info(), fragment.stage_create_info()];
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult, VkResultExt};

/// Directory searched for compiled shaders, relative to the working directory.
pub const SHADER_DIR: &str = "./assets/shaders";

/// Entry point used when a description does not name one.
pub const DEFAULT_ENTRY_POINT: &str = "main";

/// Shader stage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    Geometry,
    TessControl,
    TessEvaluation,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        }
    }

    /// File extension used by the `<name>.<ext>.spv` convention.
    pub fn extension(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
            ShaderStage::Compute => "comp",
            ShaderStage::Geometry => "geom",
            ShaderStage::TessControl => "tesc",
            ShaderStage::TessEvaluation => "tese",
        }
    }

    /// Human-readable name for logs.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
            ShaderStage::Geometry => "geometry",
            ShaderStage::TessControl => "tessellation control",
            ShaderStage::TessEvaluation => "tessellation evaluation",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Resolves `<dir>/<name>.<stage-ext>.spv`.
pub fn shader_path(dir: impl AsRef<Path>, name: &str, stage: ShaderStage) -> PathBuf {
    dir.as_ref()
        .join(format!("{}.{}.spv", name, stage.extension()))
}

/// Reinterprets SPIR-V bytes as little-endian code words.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be 4-byte aligned, got {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Owned `VkShaderModule` with its stage and entry point.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// Loads `name` for `stage` from [`SHADER_DIR`] with the `main` entry point.
    pub fn load(device: Arc<Device>, name: &str, stage: ShaderStage) -> RhiResult<Self> {
        let path = shader_path(SHADER_DIR, name, stage);
        Self::from_spirv_file(device, &path, stage, DEFAULT_ENTRY_POINT)
    }

    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes, stage, entry_point)
    }

    /// Creates a shader module from SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// Fails when the byte length is not a multiple of 4, the entry point
    /// contains a NUL byte, or `vkCreateShaderModule` fails.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let entry_point = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {}", e)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe {
            device
                .handle()
                .create_shader_module(&create_info, None)
                .with_op("vkCreateShaderModule")?
        };

        debug!(
            "Created {} shader module ({} words, entry '{}')",
            stage,
            code.len(),
            entry_point.to_string_lossy()
        );

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }

    /// Stage description for pipeline creation; borrows from `self`.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}
