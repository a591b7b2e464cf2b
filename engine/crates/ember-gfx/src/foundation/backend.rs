use ash::vk;

use crate::{
    commands::{command_buffer::GfxCommandInheritance, submit_info::GfxSubmitInfo},
    gfx_error::GfxResult,
    resources::buffer::GfxBufferAllocation,
    swapchain::gfx_swapchain::{GfxAcquireResult, GfxPresentResult},
};

/// render pass 开始时需要的参数
#[derive(Clone)]
pub struct GfxRenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub render_area: vk::Rect2D,
    pub clear_values: Vec<vk::ClearValue>,
}

/// 帧组织层所需要的全部设备调用
///
/// 帧组织层只通过这个 trait 和 GPU 交互，不直接接触 `ash::Device`：
/// - [`GfxVulkanBackend`](crate::foundation::vulkan_backend::GfxVulkanBackend) 是真实的实现
/// - `GfxMockBackend` 记录调用顺序，用于测试 fence / reset 的先后关系
///
/// 所有的 handle 都是 Vulkan 的原始 handle，所有权由上层的封装类型（`GfxFence`，`GfxCommandPool` 等）管理。
pub trait GfxBackend: Send + Sync {
    // region 同步原语
    fn create_fence(&self, signaled: bool, debug_name: &str) -> GfxResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// 返回 `Ok(false)` 表示等待超时
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<bool>;
    fn fence_status(&self, fence: vk::Fence) -> GfxResult<bool>;
    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()>;

    fn create_semaphore(&self, debug_name: &str) -> GfxResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    // endregion

    // region command pool & command buffer
    fn create_command_pool(
        &self,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> GfxResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn reset_command_pool(&self, pool: vk::CommandPool) -> GfxResult<()>;
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> GfxResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]);

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
        inheritance: Option<&GfxCommandInheritance>,
    ) -> GfxResult<()>;
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GfxResult<()>;
    // endregion

    // region 命令录制
    fn cmd_set_viewports(&self, command_buffer: vk::CommandBuffer, first_viewport: u32, viewports: &[vk::Viewport]);
    fn cmd_set_scissors(&self, command_buffer: vk::CommandBuffer, first_scissor: u32, scissors: &[vk::Rect2D]);
    fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );
    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );
    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );
    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        begin: &GfxRenderPassBegin,
        contents: vk::SubpassContents,
    );
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
    fn cmd_execute_commands(&self, command_buffer: vk::CommandBuffer, secondary_command_buffers: &[vk::CommandBuffer]);
    // endregion

    // region descriptor
    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
        debug_name: &str,
    ) -> GfxResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(
        &self,
        pool_sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
        debug_name: &str,
    ) -> GfxResult<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> GfxResult<Vec<vk::DescriptorSet>>;
    fn update_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    );
    // endregion

    // region buffer
    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        mapped: bool,
        debug_name: &str,
    ) -> GfxResult<GfxBufferAllocation>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    fn flush_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize) -> GfxResult<()>;
    // endregion

    // region pipeline
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    // endregion

    // region queue & swapchain
    fn queue_submit(&self, queue: vk::Queue, submit_info: &GfxSubmitInfo, fence: vk::Fence) -> GfxResult<()>;
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> GfxResult<GfxAcquireResult>;
    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> GfxResult<GfxPresentResult>;
    fn queue_wait_idle(&self, queue: vk::Queue) -> GfxResult<()>;
    fn device_wait_idle(&self) -> GfxResult<()>;
    // endregion
}
