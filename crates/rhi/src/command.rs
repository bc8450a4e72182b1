//! Command buffer recording.
//!
//! Command buffers are allocated from the device's shared pool
//! ([`Device::allocate_command_buffers`]); [`CommandBuffer`] is a
//! non-owning recording view over one of them.
//!
//! Per-image recording uses two levels:
//!
//! - each pipeline records a *secondary* buffer per framebuffer with
//!   [`CommandBuffer::begin_secondary`], inheriting the default render pass;
//! - the context records a *primary* buffer per image that opens the render
//!   pass with [`CommandBuffer::begin_render_pass`] and runs the secondaries
//!   through [`CommandBuffer::execute_commands`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vkpresent_rhi::command::CommandBuffer;
//! use vkpresent_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> vkpresent_rhi::RhiResult<()> {
//! let handles = device.allocate_command_buffers(vk::CommandBufferLevel::PRIMARY, 1)?;
//! let cmd = CommandBuffer::from_handle(device.clone(), handles[0]);
//! cmd.begin_primary()?;
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::{RhiResult, VkResultExt};

/// Clear values for the default render pass: color, then depth/stencil.
pub fn clear_values(color: [f32; 4], depth: f32) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
        },
    ]
}

/// Recording view over a command buffer owned by the device pool.
///
/// Dropping it does not free the handle.
#[derive(Clone)]
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Raw device, for calls this wrapper does not cover.
    #[inline]
    pub fn device(&self) -> &ash::Device {
        self.device.handle()
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins a primary buffer that is resubmitted every time its image comes up.
    pub fn begin_primary(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)
                .with_op("vkBeginCommandBuffer")
        }
    }

    /// Begins a secondary buffer that continues subpass 0 of `render_pass`
    /// inside `framebuffer`.
    pub fn begin_secondary(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
    ) -> RhiResult<()> {
        let inheritance = vk::CommandBufferInheritanceInfo::default()
            .render_pass(render_pass)
            .subpass(0)
            .framebuffer(framebuffer);
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE)
            .inheritance_info(&inheritance);
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)
                .with_op("vkBeginCommandBuffer")
        }
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .end_command_buffer(self.buffer)
                .with_op("vkEndCommandBuffer")
        }
    }

    // =========================================================================
    // Render Pass
    // =========================================================================

    /// Opens `render_pass` over the whole framebuffer; contents come from
    /// secondary command buffers.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(clear_values);
        unsafe {
            self.device.handle().cmd_begin_render_pass(
                self.buffer,
                &begin_info,
                vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
            );
        }
    }

    pub fn end_render_pass(&self) {
        unsafe {
            self.device.handle().cmd_end_render_pass(self.buffer);
        }
    }

    /// Executes secondary command buffers in order.
    pub fn execute_commands(&self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        unsafe {
            self.device
                .handle()
                .cmd_execute_commands(self.buffer, command_buffers);
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    pub fn set_viewport(&self, viewport: &vk::Viewport) {
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(viewport));
        }
    }

    pub fn set_scissor(&self, scissor: &vk::Rect2D) {
        unsafe {
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(scissor));
        }
    }

    // =========================================================================
    // Drawing
    // =========================================================================

    pub fn draw(
        &self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.handle().cmd_draw(
                self.buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
    }

    #[test]
    fn test_clear_values_layout() {
        let values = clear_values([0.1, 0.2, 0.3, 1.0], 1.0);
        unsafe {
            assert_eq!(values[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
        }
    }
}
