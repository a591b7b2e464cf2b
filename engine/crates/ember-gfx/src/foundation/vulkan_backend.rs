use std::{
    collections::HashMap,
    ffi::CString,
    ptr::NonNull,
    sync::{Mutex, MutexGuard, PoisonError},
};

use ash::vk;
use vk_mem::Alloc;

use crate::{
    commands::{command_buffer::GfxCommandInheritance, submit_info::GfxSubmitInfo},
    foundation::backend::{GfxBackend, GfxRenderPassBegin},
    gfx_error::{GfxError, GfxResult},
    resources::buffer::GfxBufferAllocation,
    swapchain::gfx_swapchain::{GfxAcquireResult, GfxPresentResult},
};

struct GfxVulkanAllocation {
    allocation: vk_mem::Allocation,
    mapped: bool,
}

/// 基于 ash + vk-mem 的 backend
///
/// 不拥有 `ash::Device`，device 的生命周期必须长于 backend；vma allocator 由 backend 持有，drop 时销毁
pub struct GfxVulkanBackend {
    device: ash::Device,
    swapchain: ash::khr::swapchain::Device,
    /// 只有在 instance 开启了 debug utils 扩展时才存在
    debug_utils: Option<ash::ext::debug_utils::Device>,

    allocator: vk_mem::Allocator,
    allocations: Mutex<HashMap<vk::Buffer, GfxVulkanAllocation>>,
}

// new & init
impl GfxVulkanBackend {
    /// 由于 vma 的生命周期设定：需要引用 Instance 以及 Device，
    /// 因此需要在 instance 和 device 都初始化完成后再创建 backend
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        enable_debug_utils: bool,
    ) -> GfxResult<Self> {
        tracy_client::Client::start();

        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance, &device, physical_device);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        let allocator = unsafe { vk_mem::Allocator::new(vma_ci).map_err(GfxError::vk("vmaCreateAllocator"))? };

        let swapchain = ash::khr::swapchain::Device::new(instance, &device);
        let debug_utils = enable_debug_utils.then(|| ash::ext::debug_utils::Device::new(instance, &device));

        Ok(Self {
            device,
            swapchain,
            debug_utils,
            allocator,
            allocations: Mutex::new(HashMap::new()),
        })
    }

    #[inline]
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    fn allocations(&self) -> MutexGuard<'_, HashMap<vk::Buffer, GfxVulkanAllocation>> {
        self.allocations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_debug_name<T: vk::Handle + Copy>(&self, handle: T, type_name: &str, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(format!("{}::{}", type_name, name)) else {
            log::warn!("debug name contains nul byte: {}", name);
            return;
        };
        let result = unsafe {
            debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            )
        };
        if let Err(e) = result {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }
}

impl Drop for GfxVulkanBackend {
    fn drop(&mut self) {
        let mut allocations = self.allocations();
        if !allocations.is_empty() {
            log::warn!("{} buffers are still alive when destroying the backend", allocations.len());
        }
        for (buffer, mut allocation) in allocations.drain() {
            unsafe {
                if allocation.mapped {
                    self.allocator.unmap_memory(&mut allocation.allocation);
                }
                self.allocator.destroy_buffer(buffer, &mut allocation.allocation);
            }
        }
    }
}

impl GfxBackend for GfxVulkanBackend {
    fn create_fence(&self, signaled: bool, debug_name: &str) -> GfxResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
                .map_err(GfxError::vk("vkCreateFence"))?
        };
        self.set_debug_name(fence, "Fence", debug_name);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<bool> {
        match unsafe { self.device.wait_for_fences(std::slice::from_ref(&fence), true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(GfxError::vk("vkWaitForFences")(e)),
        }
    }

    fn fence_status(&self, fence: vk::Fence) -> GfxResult<bool> {
        unsafe { self.device.get_fence_status(fence).map_err(GfxError::vk("vkGetFenceStatus")) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        unsafe { self.device.reset_fences(std::slice::from_ref(&fence)).map_err(GfxError::vk("vkResetFences")) }
    }

    fn create_semaphore(&self, debug_name: &str) -> GfxResult<vk::Semaphore> {
        let semaphore = unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(GfxError::vk("vkCreateSemaphore"))?
        };
        self.set_debug_name(semaphore, "Semaphore", debug_name);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_command_pool(
        &self,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> GfxResult<vk::CommandPool> {
        let pool = unsafe {
            self.device
                .create_command_pool(
                    &vk::CommandPoolCreateInfo::default().queue_family_index(queue_family_index).flags(flags),
                    None,
                )
                .map_err(GfxError::vk("vkCreateCommandPool"))?
        };
        self.set_debug_name(pool, "CommandPool", debug_name);
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn reset_command_pool(&self, pool: vk::CommandPool) -> GfxResult<()> {
        unsafe {
            self.device
                .reset_command_pool(pool, vk::CommandPoolResetFlags::empty())
                .map_err(GfxError::vk("vkResetCommandPool"))
        }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> GfxResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&info).map_err(GfxError::vk("vkAllocateCommandBuffers")) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, command_buffers) }
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
        inheritance: Option<&GfxCommandInheritance>,
    ) -> GfxResult<()> {
        let inheritance_info = inheritance.map(|inheritance| {
            vk::CommandBufferInheritanceInfo::default()
                .render_pass(inheritance.render_pass)
                .subpass(inheritance.subpass)
                .framebuffer(inheritance.framebuffer)
        });
        let mut begin_info = vk::CommandBufferBeginInfo::default().flags(usage);
        if let Some(inheritance_info) = &inheritance_info {
            begin_info = begin_info.inheritance_info(inheritance_info);
        }
        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(GfxError::vk("vkBeginCommandBuffer"))
        }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GfxResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer).map_err(GfxError::vk("vkEndCommandBuffer")) }
    }

    fn cmd_set_viewports(&self, command_buffer: vk::CommandBuffer, first_viewport: u32, viewports: &[vk::Viewport]) {
        unsafe { self.device.cmd_set_viewport(command_buffer, first_viewport, viewports) }
    }

    fn cmd_set_scissors(&self, command_buffer: vk::CommandBuffer, first_scissor: u32, scissors: &[vk::Rect2D]) {
        unsafe { self.device.cmd_set_scissor(command_buffer, first_scissor, scissors) }
    }

    fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe { self.device.cmd_bind_pipeline(command_buffer, bind_point, pipeline) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                bind_point,
                layout,
                first_set,
                descriptor_sets,
                dynamic_offsets,
            )
        }
    }

    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe { self.device.cmd_bind_vertex_buffers(command_buffer, first_binding, buffers, offsets) }
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe { self.device.cmd_bind_index_buffer(command_buffer, buffer, offset, index_type) }
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        }
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        begin: &GfxRenderPassBegin,
        contents: vk::SubpassContents,
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(begin.render_area)
            .clear_values(&begin.clear_values);
        unsafe { self.device.cmd_begin_render_pass(command_buffer, &begin_info, contents) }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) }
    }

    fn cmd_execute_commands(&self, command_buffer: vk::CommandBuffer, secondary_command_buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.cmd_execute_commands(command_buffer, secondary_command_buffers) }
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
        debug_name: &str,
    ) -> GfxResult<vk::DescriptorSetLayout> {
        let layout = unsafe {
            self.device
                .create_descriptor_set_layout(&vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings), None)
                .map_err(GfxError::vk("vkCreateDescriptorSetLayout"))?
        };
        self.set_debug_name(layout, "DescriptorSetLayout", debug_name);
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(
        &self,
        pool_sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
        debug_name: &str,
    ) -> GfxResult<vk::DescriptorPool> {
        let pool = unsafe {
            self.device
                .create_descriptor_pool(
                    &vk::DescriptorPoolCreateInfo::default().pool_sizes(pool_sizes).max_sets(max_sets),
                    None,
                )
                .map_err(GfxError::vk("vkCreateDescriptorPool"))?
        };
        self.set_debug_name(pool, "DescriptorPool", debug_name);
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> GfxResult<Vec<vk::DescriptorSet>> {
        let info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(layouts);
        unsafe { self.device.allocate_descriptor_sets(&info).map_err(GfxError::vk("vkAllocateDescriptorSets")) }
    }

    fn update_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) {
        let buffer_info = [vk::DescriptorBufferInfo::default().buffer(buffer).offset(0).range(range)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(descriptor_type)
            .buffer_info(&buffer_info);
        unsafe { self.device.update_descriptor_sets(std::slice::from_ref(&write), &[]) }
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        mapped: bool,
        debug_name: &str,
    ) -> GfxResult<GfxBufferAllocation> {
        if size == 0 {
            return Err(GfxError::InvalidArgument(format!("buffer {} size must be greater than zero", debug_name)));
        }

        let buffer_ci = vk::BufferCreateInfo::default().size(size).usage(usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if mapped {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let (buffer, mut allocation) = unsafe {
            self.allocator.create_buffer(&buffer_ci, &alloc_ci).map_err(GfxError::vk("vmaCreateBuffer"))?
        };

        let mut mapped_ptr = None;
        if mapped {
            match unsafe { self.allocator.map_memory(&mut allocation) } {
                Ok(ptr) => mapped_ptr = NonNull::new(ptr),
                Err(e) => {
                    unsafe { self.allocator.destroy_buffer(buffer, &mut allocation) };
                    return Err(GfxError::vk("vmaMapMemory")(e));
                }
            }
        }

        self.set_debug_name(buffer, "Buffer", debug_name);
        self.allocations().insert(buffer, GfxVulkanAllocation { allocation, mapped });

        Ok(GfxBufferAllocation {
            buffer,
            size,
            mapped_ptr,
        })
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let Some(mut allocation) = self.allocations().remove(&buffer) else {
            log::error!("destroying unknown buffer {:?}", buffer);
            return;
        };
        unsafe {
            if allocation.mapped {
                self.allocator.unmap_memory(&mut allocation.allocation);
            }
            self.allocator.destroy_buffer(buffer, &mut allocation.allocation);
        }
    }

    fn flush_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize) -> GfxResult<()> {
        let allocations = self.allocations();
        let allocation = allocations
            .get(&buffer)
            .ok_or_else(|| GfxError::InvalidArgument(format!("flushing unknown buffer {:?}", buffer)))?;
        self.allocator
            .flush_allocation(&allocation.allocation, offset, size)
            .map_err(GfxError::vk("vmaFlushAllocation"))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn queue_submit(&self, queue: vk::Queue, submit_info: &GfxSubmitInfo, fence: vk::Fence) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxVulkanBackend::queue_submit");
        let info = vk::SubmitInfo::default()
            .wait_semaphores(submit_info.wait_semaphores())
            .wait_dst_stage_mask(submit_info.wait_stages())
            .command_buffers(submit_info.command_buffers())
            .signal_semaphores(submit_info.signal_semaphores());
        unsafe {
            self.device
                .queue_submit(queue, std::slice::from_ref(&info), fence)
                .map_err(GfxError::vk("vkQueueSubmit"))
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> GfxResult<GfxAcquireResult> {
        let result = unsafe { self.swapchain.acquire_next_image(swapchain, timeout_ns, semaphore, vk::Fence::null()) };
        match result {
            Ok((image_index, suboptimal)) => Ok(GfxAcquireResult::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Ok(GfxAcquireResult::Timeout),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(GfxAcquireResult::OutOfDate),
            Err(e) => Err(GfxError::vk("vkAcquireNextImageKHR")(e)),
        }
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> GfxResult<GfxPresentResult> {
        let image_indices = [image_index];
        let swapchains = [swapchain];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(&swapchains);

        match unsafe { self.swapchain.queue_present(queue, &present_info) } {
            Ok(false) => Ok(GfxPresentResult::Presented),
            Ok(true) => Ok(GfxPresentResult::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(GfxPresentResult::OutOfDate),
            Err(e) => Err(GfxError::vk("vkQueuePresentKHR")(e)),
        }
    }

    fn queue_wait_idle(&self, queue: vk::Queue) -> GfxResult<()> {
        unsafe { self.device.queue_wait_idle(queue).map_err(GfxError::vk("vkQueueWaitIdle")) }
    }

    fn device_wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.device_wait_idle().map_err(GfxError::vk("vkDeviceWaitIdle")) }
    }
}

