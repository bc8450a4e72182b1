//! Graphics pipeline builder.
//!
//! A [`PipelineDescription`] is declared once: shader names, fixed-function
//! state, push constants, a viewport/scissor declaration and the closure
//! that records draw calls. [`PipelineState`] turns it into a pipeline built
//! against the swapchain's default render pass plus one secondary command
//! buffer per framebuffer.
//!
//! # Viewport and scissor encoding
//!
//! Declared values may be negative to mean "a fraction of the current
//! swapchain extent", so a description stays correct across resizes:
//!
//! - position fields (`x`, `y`, scissor offset): `extent * (-value * 0.005)`
//! - size fields (`width`, `height`): `extent * (-value * 0.01)`
//! - a scissor extent component of `u32::MAX` becomes the current extent
//!
//! The defaults (`width = height = -100`, scissor extent `u32::MAX`) cover
//! the whole framebuffer.
//!
//! # Example
//!
//! ```no_run
//! use vkpresent_rhi::pipeline::{CullMode, FixedFunctionState, PipelineDescription};
//! use vkpresent_rhi::shader::ShaderStage;
//!
//! let description = PipelineDescription::new("triangle")
//!     .shader("triangle", ShaderStage::Vertex)
//!     .shader("triangle", ShaderStage::Fragment)
//!     .fixed_function(FixedFunctionState {
//!         cull_mode: CullMode::None,
//!         ..Default::default()
//!     })
//!     .record(|cmd, _image_index| cmd.draw(3, 1, 0, 0));
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult, VkResultExt};
use crate::shader::{Shader, ShaderStage};
use crate::swapchain::SwapchainState;

/// Scale applied to negative position fields.
pub const POSITION_PERCENT_SCALE: f64 = 0.005;
/// Scale applied to negative size fields.
pub const SIZE_PERCENT_SCALE: f64 = 0.01;

/// Closure that records draw commands into one framebuffer's secondary
/// buffer. Receives the buffer (pipeline, viewport and scissor already set)
/// and the swapchain image index.
pub type RecordFn = Box<dyn Fn(&CommandBuffer, usize) + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

impl PrimitiveTopology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

impl PolygonMode {
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
            PolygonMode::Point => vk::PolygonMode::POINT,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    LessOrEqual,
    Greater,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Fixed-function state baked into the pipeline object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedFunctionState {
    pub topology: PrimitiveTopology,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub line_width: f32,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: CompareOp,
    /// `src * src_alpha + dst * (1 - src_alpha)` on the color attachment.
    pub alpha_blend: bool,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            line_width: 1.0,
            depth_test: true,
            depth_write: true,
            depth_compare_op: CompareOp::Less,
            alpha_blend: false,
        }
    }
}

impl FixedFunctionState {
    fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        if self.alpha_blend {
            state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
        } else {
            state.blend_enable(false)
        }
    }
}

/// Full-framebuffer viewport declaration.
pub fn default_viewport() -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: -100.0,
        height: -100.0,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Full-framebuffer scissor declaration.
pub fn default_scissor() -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        },
    }
}

// Computed in f64: 0.005 and 0.01 are not exact in f32.
fn percent_of(extent: u32, value: f64, scale: f64) -> f64 {
    f64::from(extent) * (-value * scale)
}

fn resolve_component(value: f32, extent: u32, scale: f64) -> f32 {
    if value < 0.0 {
        percent_of(extent, f64::from(value), scale) as f32
    } else {
        value
    }
}

/// Resolves a declared viewport against the current swapchain extent.
pub fn resolve_viewport(declared: &vk::Viewport, extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: resolve_component(declared.x, extent.width, POSITION_PERCENT_SCALE),
        y: resolve_component(declared.y, extent.height, POSITION_PERCENT_SCALE),
        width: resolve_component(declared.width, extent.width, SIZE_PERCENT_SCALE),
        height: resolve_component(declared.height, extent.height, SIZE_PERCENT_SCALE),
        min_depth: declared.min_depth,
        max_depth: declared.max_depth,
    }
}

/// Resolves a declared scissor against the current swapchain extent.
pub fn resolve_scissor(declared: &vk::Rect2D, extent: vk::Extent2D) -> vk::Rect2D {
    let offset = |value: i32, extent: u32| {
        if value < 0 {
            percent_of(extent, f64::from(value), POSITION_PERCENT_SCALE).round() as i32
        } else {
            value
        }
    };
    let size = |value: u32, extent: u32| if value == u32::MAX { extent } else { value };

    vk::Rect2D {
        offset: vk::Offset2D {
            x: offset(declared.offset.x, extent.width),
            y: offset(declared.offset.y, extent.height),
        },
        extent: vk::Extent2D {
            width: size(declared.extent.width, extent.width),
            height: size(declared.extent.height, extent.height),
        },
    }
}

/// Everything needed to build and record one graphics pipeline.
pub struct PipelineDescription {
    name: String,
    shaders: Vec<(String, ShaderStage)>,
    fixed_function: FixedFunctionState,
    push_constant_ranges: Vec<vk::PushConstantRange>,
    viewport: vk::Viewport,
    scissor: vk::Rect2D,
    record: Option<RecordFn>,
}

impl PipelineDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shaders: Vec::new(),
            fixed_function: FixedFunctionState::default(),
            push_constant_ranges: Vec::new(),
            viewport: default_viewport(),
            scissor: default_scissor(),
            record: None,
        }
    }

    /// Adds the stage `stage` loaded from `<name>.<stage-ext>.spv`.
    pub fn shader(mut self, name: impl Into<String>, stage: ShaderStage) -> Self {
        self.shaders.push((name.into(), stage));
        self
    }

    pub fn fixed_function(mut self, state: FixedFunctionState) -> Self {
        self.fixed_function = state;
        self
    }

    pub fn push_constant_range(mut self, range: vk::PushConstantRange) -> Self {
        self.push_constant_ranges.push(range);
        self
    }

    pub fn viewport(mut self, viewport: vk::Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn scissor(mut self, scissor: vk::Rect2D) -> Self {
        self.scissor = scissor;
        self
    }

    /// Sets the per-framebuffer draw recording closure.
    pub fn record(mut self, record: impl Fn(&CommandBuffer, usize) + Send + Sync + 'static) -> Self {
        self.record = Some(Box::new(record));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shaders(&self) -> &[(String, ShaderStage)] {
        &self.shaders
    }

    pub fn fixed_function_state(&self) -> &FixedFunctionState {
        &self.fixed_function
    }

    pub fn declared_viewport(&self) -> &vk::Viewport {
        &self.viewport
    }

    pub fn declared_scissor(&self) -> &vk::Rect2D {
        &self.scissor
    }

    /// Checks the stage list before any GPU object is created.
    pub fn validate(&self) -> RhiResult<()> {
        let has = |stage| self.shaders.iter().any(|(_, s)| *s == stage);
        if !has(ShaderStage::Vertex) {
            return Err(RhiError::PipelineError(format!(
                "pipeline '{}' has no vertex shader",
                self.name
            )));
        }
        if has(ShaderStage::Compute) {
            return Err(RhiError::PipelineError(format!(
                "pipeline '{}' mixes a compute shader into a graphics pipeline",
                self.name
            )));
        }
        for (i, (_, stage)) in self.shaders.iter().enumerate() {
            if self.shaders[..i].iter().any(|(_, s)| s == stage) {
                return Err(RhiError::PipelineError(format!(
                    "pipeline '{}' declares the {} stage twice",
                    self.name, stage
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for PipelineDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDescription")
            .field("name", &self.name)
            .field("shaders", &self.shaders)
            .field("fixed_function", &self.fixed_function)
            .field("push_constant_ranges", &self.push_constant_ranges.len())
            .field("viewport", &self.viewport)
            .field("scissor", &self.scissor)
            .field("record", &self.record.is_some())
            .finish()
    }
}

/// A built pipeline plus its per-image secondary command buffers.
pub struct PipelineState {
    device: Arc<Device>,
    description: PipelineDescription,
    shaders: Vec<Shader>,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    command_buffers: Vec<vk::CommandBuffer>,
    recorded_extent: vk::Extent2D,
}

impl PipelineState {
    /// Wraps `description`; nothing is created until [`build`](Self::build).
    pub fn new(device: Arc<Device>, description: PipelineDescription) -> RhiResult<Self> {
        description.validate()?;
        Ok(Self {
            device,
            description,
            shaders: Vec::new(),
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            command_buffers: Vec::new(),
            recorded_extent: vk::Extent2D::default(),
        })
    }

    /// Creates the layout and pipeline if none exists yet, then records one
    /// secondary command buffer per framebuffer of `swapchain`.
    pub fn build(&mut self, swapchain: &SwapchainState) -> RhiResult<()> {
        if self.pipeline == vk::Pipeline::null() {
            self.create_pipeline(swapchain)?;
        }
        self.record_command_buffers(swapchain)
    }

    /// Re-records the command buffers against a recreated swapchain. The
    /// pipeline object, layout and shader modules are kept.
    pub fn rebuild_for_resize(&mut self, swapchain: &SwapchainState) -> RhiResult<()> {
        if !self.is_built() {
            return Err(RhiError::PipelineError(format!(
                "pipeline '{}' resized before it was built",
                self.description.name
            )));
        }
        self.record_command_buffers(swapchain)
    }

    fn create_pipeline(&mut self, swapchain: &SwapchainState) -> RhiResult<()> {
        let render_pass = swapchain.render_pass()?;

        let shaders = self
            .description
            .shaders
            .iter()
            .map(|(name, stage)| Shader::load(self.device.clone(), name, *stage))
            .collect::<RhiResult<Vec<_>>>()?;

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .push_constant_ranges(&self.description.push_constant_ranges);
        let layout = unsafe {
            self.device
                .handle()
                .create_pipeline_layout(&layout_info, None)
                .with_op("vkCreatePipelineLayout")?
        };
        // Owned from here so an early return below still releases it.
        self.layout = layout;

        let fixed = &self.description.fixed_function;
        let stages: Vec<_> = shaders.iter().map(Shader::stage_create_info).collect();

        // No vertex buffers: shaders generate or fetch their own geometry.
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(fixed.topology.to_vk())
            .primitive_restart_enable(false);
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(fixed.polygon_mode.to_vk())
            .line_width(fixed.line_width)
            .cull_mode(fixed.cull_mode.to_vk())
            .front_face(fixed.front_face.to_vk());
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(fixed.depth_test)
            .depth_write_enable(fixed.depth_write)
            .depth_compare_op(fixed.depth_compare_op.to_vk());
        let blend_attachments = [fixed.color_blend_attachment()];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(0);

        let pipelines = unsafe {
            self.device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)
                .with_op("vkCreateGraphicsPipelines")?
        };
        self.pipeline = pipelines.first().copied().ok_or_else(|| {
            RhiError::PipelineError("vkCreateGraphicsPipelines returned no pipeline".to_string())
        })?;
        self.shaders = shaders;

        info!(
            "Created pipeline '{}' ({} stages)",
            self.description.name,
            self.shaders.len()
        );
        Ok(())
    }

    fn record_command_buffers(&mut self, swapchain: &SwapchainState) -> RhiResult<()> {
        self.free_command_buffers();

        let render_pass = swapchain.render_pass()?.handle();
        let framebuffers = swapchain.framebuffers();
        let extent = swapchain.extent();
        let viewport = resolve_viewport(&self.description.viewport, extent);
        let scissor = resolve_scissor(&self.description.scissor, extent);

        self.command_buffers = self.device.allocate_command_buffers(
            vk::CommandBufferLevel::SECONDARY,
            framebuffers.len() as u32,
        )?;

        for (image_index, (&buffer, framebuffer)) in
            self.command_buffers.iter().zip(framebuffers).enumerate()
        {
            let cmd = CommandBuffer::from_handle(self.device.clone(), buffer);
            cmd.begin_secondary(render_pass, framebuffer.handle())?;
            cmd.bind_graphics_pipeline(self.pipeline);
            cmd.set_viewport(&viewport);
            cmd.set_scissor(&scissor);
            if let Some(record) = &self.description.record {
                record(&cmd, image_index);
            }
            cmd.end()?;
        }

        self.recorded_extent = extent;
        debug!(
            "Recorded {} command buffers for pipeline '{}' at {}x{}",
            self.command_buffers.len(),
            self.description.name,
            extent.width,
            extent.height
        );
        Ok(())
    }

    fn free_command_buffers(&mut self) {
        let buffers = std::mem::take(&mut self.command_buffers);
        self.device.free_command_buffers(&buffers);
    }

    #[inline]
    pub fn is_built(&self) -> bool {
        self.pipeline != vk::Pipeline::null()
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn name(&self) -> &str {
        &self.description.name
    }

    pub fn shader_stages(&self) -> impl Iterator<Item = ShaderStage> + '_ {
        self.shaders.iter().map(Shader::stage)
    }

    /// Secondary buffer recorded for `image_index`.
    pub fn command_buffer(&self, image_index: usize) -> Option<vk::CommandBuffer> {
        self.command_buffers.get(image_index).copied()
    }

    pub fn command_buffers(&self) -> &[vk::CommandBuffer] {
        &self.command_buffers
    }

    /// Extent the current command buffers were recorded for.
    pub fn recorded_extent(&self) -> vk::Extent2D {
        self.recorded_extent
    }
}

impl Drop for PipelineState {
    fn drop(&mut self) {
        self.free_command_buffers();
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                self.device.handle().destroy_pipeline(self.pipeline, None);
            }
            if self.layout != vk::PipelineLayout::null() {
                self.device
                    .handle()
                    .destroy_pipeline_layout(self.layout, None);
            }
        }
        debug!("Destroyed pipeline '{}'", self.description.name);
    }
}
