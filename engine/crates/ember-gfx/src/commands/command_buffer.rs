use ash::vk;

use crate::{
    foundation::backend::{GfxBackend, GfxRenderPassBegin},
    gfx_error::{GfxError, GfxResult},
};

/// command buffer 的 handle，不拥有资源，由所属的 [`GfxCommandPool`](super::command_pool::GfxCommandPool) 释放
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
    level: vk::CommandBufferLevel,
}

// new & init
impl GfxCommandBuffer {
    #[inline]
    pub(crate) fn new(vk_handle: vk::CommandBuffer, level: vk::CommandBufferLevel) -> Self {
        Self { vk_handle, level }
    }
}

// getters
impl GfxCommandBuffer {
    /// getter
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }

    #[inline]
    pub fn level(&self) -> vk::CommandBufferLevel {
        self.level
    }
}

/// secondary command buffer 在 render pass 内执行时需要继承的信息
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxCommandInheritance {
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub framebuffer: vk::Framebuffer,
}

/// 在作用域内录制命令
///
/// 创建时 begin，drop 时 end。只要 begin 成功，无论是正常退出、`?` 提前返回还是 panic 展开，
/// end 都会被调用一次。
///
/// # 使用示例
/// ```ignore
/// let writer = GfxCommandWriter::begin(backend, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, None)?;
/// writer.set_viewports(0, &[viewport]);
/// writer.draw_indexed(0, 36, 0, 1);
/// writer.end()?;
/// ```
pub struct GfxCommandWriter<'a> {
    backend: &'a dyn GfxBackend,
    command_buffer: GfxCommandBuffer,
    ended: bool,
}

// new & init
impl<'a> GfxCommandWriter<'a> {
    pub fn begin(
        backend: &'a dyn GfxBackend,
        command_buffer: GfxCommandBuffer,
        usage: vk::CommandBufferUsageFlags,
        inheritance: Option<&GfxCommandInheritance>,
    ) -> GfxResult<Self> {
        backend.begin_command_buffer(command_buffer.vk_handle(), usage, inheritance)?;
        Ok(Self {
            backend,
            command_buffer,
            ended: false,
        })
    }

    /// 用于 primary command buffer，只提交一次
    #[inline]
    pub fn begin_primary(backend: &'a dyn GfxBackend, command_buffer: GfxCommandBuffer) -> GfxResult<Self> {
        Self::begin(backend, command_buffer, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, None)
    }

    /// 用于在 render pass 内执行的 secondary command buffer
    #[inline]
    pub fn begin_secondary(
        backend: &'a dyn GfxBackend,
        command_buffer: GfxCommandBuffer,
        inheritance: &GfxCommandInheritance,
    ) -> GfxResult<Self> {
        Self::begin(
            backend,
            command_buffer,
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT | vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE,
            Some(inheritance),
        )
    }

    /// 显式结束录制，可以拿到 end 的错误；不调用时由 drop 结束
    pub fn end(mut self) -> GfxResult<()> {
        self.ended = true;
        self.backend.end_command_buffer(self.command_buffer.vk_handle())
    }
}

// getters
impl GfxCommandWriter<'_> {
    #[inline]
    pub fn command_buffer(&self) -> GfxCommandBuffer {
        self.command_buffer
    }
}

// 状态类型
impl GfxCommandWriter<'_> {
    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn set_viewports(&self, first_viewport: u32, viewports: &[vk::Viewport]) {
        self.backend.cmd_set_viewports(self.command_buffer.vk_handle(), first_viewport, viewports);
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn set_scissors(&self, first_scissor: u32, scissors: &[vk::Rect2D]) {
        self.backend.cmd_set_scissors(self.command_buffer.vk_handle(), first_scissor, scissors);
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        self.backend
            .cmd_bind_pipeline(self.command_buffer.vk_handle(), vk::PipelineBindPoint::GRAPHICS, pipeline);
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn bind_graphics_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        self.backend.cmd_bind_descriptor_sets(
            self.command_buffer.vk_handle(),
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            first_set,
            descriptor_sets,
            dynamic_offsets,
        );
    }

    /// `buffers` 和 `offsets` 的长度必须一致
    ///
    /// - command type: state
    /// - supported queue types: graphics
    pub fn bind_vertex_buffers(
        &self,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) -> GfxResult<()> {
        if buffers.len() != offsets.len() {
            return Err(GfxError::InvalidArgument(format!(
                "number of vertex buffers ({}) must equal number of offsets ({})",
                buffers.len(),
                offsets.len()
            )));
        }
        self.backend
            .cmd_bind_vertex_buffers(self.command_buffer.vk_handle(), first_binding, buffers, offsets);
        Ok(())
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn bind_index_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        self.backend
            .cmd_bind_index_buffer(self.command_buffer.vk_handle(), buffer, offset, index_type);
    }
}

// action 类型
impl GfxCommandWriter<'_> {
    /// vertex offset 固定为 0
    ///
    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn draw_indexed(&self, index_offset: u32, index_count: u32, instance_offset: u32, instance_count: u32) {
        self.backend.cmd_draw_indexed(
            self.command_buffer.vk_handle(),
            index_count,
            instance_count,
            index_offset,
            0,
            instance_offset,
        );
    }

    /// 在 primary command buffer 中执行 secondary command buffer
    ///
    /// - command type: action
    /// - supported queue types: graphics, compute, transfer
    #[inline]
    pub fn execute_commands(&self, secondary_command_buffers: &[GfxCommandBuffer]) {
        if secondary_command_buffers.is_empty() {
            return;
        }
        let handles = secondary_command_buffers.iter().map(|cmd| cmd.vk_handle()).collect::<Vec<_>>();
        self.backend.cmd_execute_commands(self.command_buffer.vk_handle(), &handles);
    }
}

impl Drop for GfxCommandWriter<'_> {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        if let Err(e) = self.backend.end_command_buffer(self.command_buffer.vk_handle()) {
            log::error!("failed to end command buffer {:?}: {}", self.command_buffer.vk_handle(), e);
        }
    }
}

/// render pass 的作用域，创建时 begin render pass，drop 时 end render pass
///
/// render pass 内的命令全部来自 secondary command buffer
pub struct GfxRenderPassScope<'w, 'a> {
    writer: &'w GfxCommandWriter<'a>,
}

impl<'w, 'a> GfxRenderPassScope<'w, 'a> {
    pub fn begin(writer: &'w GfxCommandWriter<'a>, begin: &GfxRenderPassBegin) -> Self {
        writer.backend.cmd_begin_render_pass(
            writer.command_buffer.vk_handle(),
            begin,
            vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
        );
        Self { writer }
    }

    #[inline]
    pub fn writer(&self) -> &GfxCommandWriter<'a> {
        self.writer
    }
}

impl Drop for GfxRenderPassScope<'_, '_> {
    fn drop(&mut self) {
        self.writer.backend.cmd_end_render_pass(self.writer.command_buffer.vk_handle());
    }
}
