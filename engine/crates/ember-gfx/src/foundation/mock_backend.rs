//! 记录调用序列的 backend，不需要 GPU
//!
//! - 提交时 fence 立即被 signal，除非调用了 [`GfxMockBackend::set_gpu_stalled`]
//! - 可以强制 fence 等待、acquire 超时
//! - mapped buffer 由 host 内存模拟
//! - 会检查一部分 Vulkan 的使用规则（例如 pool 在 GPU 使用中被 reset），违规记录在 [`GfxMockBackend::violations`]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    ptr::NonNull,
    sync::{Mutex, MutexGuard, PoisonError},
};

use ash::vk::{self, Handle};

use crate::{
    commands::{command_buffer::GfxCommandInheritance, submit_info::GfxSubmitInfo},
    foundation::backend::{GfxBackend, GfxRenderPassBegin},
    gfx_error::{GfxError, GfxResult},
    resources::buffer::GfxBufferAllocation,
    swapchain::gfx_swapchain::{GfxAcquireResult, GfxPresentResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GfxObjectKind {
    Fence,
    Semaphore,
    CommandPool,
    CommandBuffer,
    DescriptorSetLayout,
    DescriptorPool,
    DescriptorSet,
    Buffer,
    Pipeline,
    PipelineLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GfxMockEvent {
    Create(GfxObjectKind, u64),
    Destroy(GfxObjectKind, u64),

    WaitFence {
        fence: vk::Fence,
        signaled: bool,
    },
    ResetFence(vk::Fence),
    ResetCommandPool(vk::CommandPool),

    BeginCommandBuffer {
        command_buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
        inheritance: Option<GfxCommandInheritance>,
    },
    EndCommandBuffer(vk::CommandBuffer),

    SetViewports(vk::CommandBuffer),
    SetScissors(vk::CommandBuffer),
    BindPipeline {
        command_buffer: vk::CommandBuffer,
        pipeline: vk::Pipeline,
    },
    BindDescriptorSets {
        command_buffer: vk::CommandBuffer,
        descriptor_sets: Vec<vk::DescriptorSet>,
        dynamic_offsets: Vec<u32>,
    },
    BindVertexBuffers {
        command_buffer: vk::CommandBuffer,
        buffers: Vec<vk::Buffer>,
    },
    BindIndexBuffer {
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    },
    DrawIndexed {
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
    },
    BeginRenderPass {
        command_buffer: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
    },
    EndRenderPass(vk::CommandBuffer),
    ExecuteCommands {
        command_buffer: vk::CommandBuffer,
        secondary_command_buffers: Vec<vk::CommandBuffer>,
    },

    UpdateDescriptor {
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    },
    FlushBuffer(vk::Buffer),

    Submit {
        queue: vk::Queue,
        command_buffers: Vec<vk::CommandBuffer>,
        wait_semaphores: Vec<vk::Semaphore>,
        signal_semaphores: Vec<vk::Semaphore>,
        fence: vk::Fence,
    },
    Acquire(GfxAcquireResult),
    Present {
        image_index: u32,
        wait_semaphores: Vec<vk::Semaphore>,
    },
    DeviceWaitIdle,
}

/// 由 mock 分配的 host 内存，生命周期由 create_buffer / destroy_buffer 控制
struct HostAllocation(NonNull<[u8]>);

// SAFETY: 这块内存只通过 GfxBuffer 的 mapped 指针访问，mock 本身只负责分配与释放
unsafe impl Send for HostAllocation {}

impl HostAllocation {
    fn new(size: usize) -> Self {
        let boxed: Box<[u8]> = vec![0u8; size].into_boxed_slice();
        Self(NonNull::from(Box::leak(boxed)))
    }

    fn ptr(&self) -> NonNull<u8> {
        self.0.cast()
    }
}

impl Drop for HostAllocation {
    fn drop(&mut self) {
        // SAFETY: 指针来自 Box::leak，且只会被释放一次
        unsafe {
            drop(Box::from_raw(self.0.as_ptr()));
        }
    }
}

#[derive(Default)]
struct MockState {
    next_handle: u64,
    events: Vec<GfxMockEvent>,
    violations: Vec<String>,
    live: HashMap<GfxObjectKind, HashSet<u64>>,

    /// fence -> 是否 signaled
    fences: HashMap<u64, bool>,
    /// GPU 停滞时，已经提交但还没有 signal 的 fence
    pending_fences: Vec<u64>,
    /// command buffer -> 最近一次提交时使用的 fence
    in_flight: HashMap<u64, u64>,
    /// primary command buffer -> 在其中执行的 secondary command buffer
    executed: HashMap<u64, Vec<u64>>,
    recording: HashSet<u64>,
    /// acquire 已经 signal、还没有被任何 submit 等待的 semaphore
    acquired_semaphores: HashSet<u64>,

    pool_command_buffers: HashMap<u64, HashSet<u64>>,
    pool_descriptor_sets: HashMap<u64, HashSet<u64>>,
    buffers: HashMap<u64, HostAllocation>,

    image_count: u32,
    next_image: u32,
    acquire_script: VecDeque<GfxAcquireResult>,
    present_script: VecDeque<GfxPresentResult>,

    gpu_stalled: bool,
    force_fence_timeout: bool,
}

impl MockState {
    fn new_handle(&mut self, kind: GfxObjectKind) -> u64 {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.live.entry(kind).or_default().insert(raw);
        self.events.push(GfxMockEvent::Create(kind, raw));
        raw
    }

    fn release_handle(&mut self, kind: GfxObjectKind, raw: u64) {
        if raw == 0 {
            return;
        }
        let removed = self.live.get_mut(&kind).is_some_and(|set| set.remove(&raw));
        if !removed {
            self.violations.push(format!("destroying unknown {kind:?} {raw}"));
        }
        self.events.push(GfxMockEvent::Destroy(kind, raw));
    }

    fn is_fence_signaled(&self, fence: u64) -> bool {
        self.fences.get(&fence).copied().unwrap_or(false)
    }

    /// command buffer 仍然被一个没有 signal 的 fence 保护
    fn is_in_flight(&self, command_buffer: u64) -> bool {
        self.in_flight.get(&command_buffer).is_some_and(|fence| !self.is_fence_signaled(*fence))
    }

    fn check_recording(&mut self, command_buffer: vk::CommandBuffer, what: &str) {
        if !self.recording.contains(&command_buffer.as_raw()) {
            self.violations.push(format!("{what} recorded into {command_buffer:?} outside begin/end"));
        }
    }
}

/// 测试用的 backend
pub struct GfxMockBackend {
    state: Mutex<MockState>,
}

// new & init
impl GfxMockBackend {
    /// `image_count` 为模拟的 swapchain image 数量
    pub fn new(image_count: u32) -> Self {
        tracy_client::Client::start();
        Self {
            state: Mutex::new(MockState {
                image_count: image_count.max(1),
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// 测试控制
impl GfxMockBackend {
    /// GPU 停滞：之后提交的 fence 不会被 signal，直到调用 [`Self::complete_pending`]
    pub fn set_gpu_stalled(&self, stalled: bool) {
        self.lock().gpu_stalled = stalled;
    }

    /// 所有 fence 等待都返回超时
    pub fn set_force_fence_timeout(&self, timeout: bool) {
        self.lock().force_fence_timeout = timeout;
    }

    /// signal 所有已经提交但还没有完成的 fence
    pub fn complete_pending(&self) {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.pending_fences);
        for fence in pending {
            state.fences.insert(fence, true);
        }
    }

    /// 下一次 acquire 的结果，按照 push 的顺序消耗
    pub fn push_acquire_result(&self, result: GfxAcquireResult) {
        self.lock().acquire_script.push_back(result);
    }

    pub fn push_present_result(&self, result: GfxPresentResult) {
        self.lock().present_script.push_back(result);
    }

    /// pipeline 的创建不经过 backend，这里模拟外部创建的 pipeline
    pub fn create_pipeline(&self) -> vk::Pipeline {
        vk::Pipeline::from_raw(self.lock().new_handle(GfxObjectKind::Pipeline))
    }

    pub fn create_pipeline_layout(&self) -> vk::PipelineLayout {
        vk::PipelineLayout::from_raw(self.lock().new_handle(GfxObjectKind::PipelineLayout))
    }
}

// 查询
impl GfxMockBackend {
    pub fn events(&self) -> Vec<GfxMockEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    pub fn live_count(&self, kind: GfxObjectKind) -> usize {
        self.lock().live.get(&kind).map_or(0, HashSet::len)
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.lock().is_fence_signaled(fence.as_raw())
    }

    /// command buffer 是从哪个 pool 分配的
    pub fn command_buffer_pool(&self, command_buffer: vk::CommandBuffer) -> Option<vk::CommandPool> {
        self.lock()
            .pool_command_buffers
            .iter()
            .find(|(_, buffers)| buffers.contains(&command_buffer.as_raw()))
            .map(|(pool, _)| vk::CommandPool::from_raw(*pool))
    }
}

impl GfxBackend for GfxMockBackend {
    fn create_fence(&self, signaled: bool, _debug_name: &str) -> GfxResult<vk::Fence> {
        let mut state = self.lock();
        let raw = state.new_handle(GfxObjectKind::Fence);
        state.fences.insert(raw, signaled);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.lock();
        state.fences.remove(&fence.as_raw());
        state.release_handle(GfxObjectKind::Fence, fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> GfxResult<bool> {
        let mut state = self.lock();
        let signaled = !state.force_fence_timeout && state.is_fence_signaled(fence.as_raw());
        state.events.push(GfxMockEvent::WaitFence { fence, signaled });
        Ok(signaled)
    }

    fn fence_status(&self, fence: vk::Fence) -> GfxResult<bool> {
        Ok(self.lock().is_fence_signaled(fence.as_raw()))
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        let mut state = self.lock();
        state.fences.insert(fence.as_raw(), false);
        state.events.push(GfxMockEvent::ResetFence(fence));
        Ok(())
    }

    fn create_semaphore(&self, _debug_name: &str) -> GfxResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.lock().new_handle(GfxObjectKind::Semaphore)))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.lock().release_handle(GfxObjectKind::Semaphore, semaphore.as_raw());
    }

    fn create_command_pool(
        &self,
        _queue_family_index: u32,
        _flags: vk::CommandPoolCreateFlags,
        _debug_name: &str,
    ) -> GfxResult<vk::CommandPool> {
        let mut state = self.lock();
        let raw = state.new_handle(GfxObjectKind::CommandPool);
        state.pool_command_buffers.insert(raw, HashSet::new());
        Ok(vk::CommandPool::from_raw(raw))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.lock();
        let buffers = state.pool_command_buffers.remove(&pool.as_raw()).unwrap_or_default();
        for buffer in buffers {
            if state.is_in_flight(buffer) {
                state.violations.push(format!("command pool {pool:?} destroyed while {buffer} is in flight"));
            }
            if let Some(set) = state.live.get_mut(&GfxObjectKind::CommandBuffer) {
                set.remove(&buffer);
            }
        }
        state.release_handle(GfxObjectKind::CommandPool, pool.as_raw());
    }

    fn reset_command_pool(&self, pool: vk::CommandPool) -> GfxResult<()> {
        let mut state = self.lock();
        let buffers = state.pool_command_buffers.get(&pool.as_raw()).cloned().unwrap_or_default();
        for buffer in buffers {
            if state.is_in_flight(buffer) {
                state.violations.push(format!("command pool {pool:?} reset while {buffer} is in flight"));
            }
            state.recording.remove(&buffer);
            state.executed.remove(&buffer);
        }
        state.events.push(GfxMockEvent::ResetCommandPool(pool));
        Ok(())
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        _level: vk::CommandBufferLevel,
        count: u32,
    ) -> GfxResult<Vec<vk::CommandBuffer>> {
        let mut state = self.lock();
        let mut buffers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let raw = state.new_handle(GfxObjectKind::CommandBuffer);
            state.pool_command_buffers.entry(pool.as_raw()).or_default().insert(raw);
            buffers.push(vk::CommandBuffer::from_raw(raw));
        }
        Ok(buffers)
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.lock();
        for buffer in command_buffers {
            if state.is_in_flight(buffer.as_raw()) {
                state.violations.push(format!("command buffer {buffer:?} freed while in flight"));
            }
            if let Some(set) = state.pool_command_buffers.get_mut(&pool.as_raw()) {
                set.remove(&buffer.as_raw());
            }
            state.release_handle(GfxObjectKind::CommandBuffer, buffer.as_raw());
        }
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
        inheritance: Option<&GfxCommandInheritance>,
    ) -> GfxResult<()> {
        let mut state = self.lock();
        if state.is_in_flight(command_buffer.as_raw()) {
            state.violations.push(format!("command buffer {command_buffer:?} re-recorded while in flight"));
        }
        if !state.recording.insert(command_buffer.as_raw()) {
            state.violations.push(format!("command buffer {command_buffer:?} begun twice"));
        }
        state.executed.remove(&command_buffer.as_raw());
        state.events.push(GfxMockEvent::BeginCommandBuffer {
            command_buffer,
            usage,
            inheritance: inheritance.copied(),
        });
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GfxResult<()> {
        let mut state = self.lock();
        if !state.recording.remove(&command_buffer.as_raw()) {
            state.violations.push(format!("command buffer {command_buffer:?} ended without begin"));
        }
        state.events.push(GfxMockEvent::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn cmd_set_viewports(&self, command_buffer: vk::CommandBuffer, _first_viewport: u32, _viewports: &[vk::Viewport]) {
        let mut state = self.lock();
        state.check_recording(command_buffer, "set_viewports");
        state.events.push(GfxMockEvent::SetViewports(command_buffer));
    }

    fn cmd_set_scissors(&self, command_buffer: vk::CommandBuffer, _first_scissor: u32, _scissors: &[vk::Rect2D]) {
        let mut state = self.lock();
        state.check_recording(command_buffer, "set_scissors");
        state.events.push(GfxMockEvent::SetScissors(command_buffer));
    }

    fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        let mut state = self.lock();
        state.check_recording(command_buffer, "bind_pipeline");
        state.events.push(GfxMockEvent::BindPipeline {
            command_buffer,
            pipeline,
        });
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        _first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        let mut state = self.lock();
        state.check_recording(command_buffer, "bind_descriptor_sets");
        state.events.push(GfxMockEvent::BindDescriptorSets {
            command_buffer,
            descriptor_sets: descriptor_sets.to_vec(),
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        _first_binding: u32,
        buffers: &[vk::Buffer],
        _offsets: &[vk::DeviceSize],
    ) {
        let mut state = self.lock();
        state.check_recording(command_buffer, "bind_vertex_buffers");
        state.events.push(GfxMockEvent::BindVertexBuffers {
            command_buffer,
            buffers: buffers.to_vec(),
        });
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        _index_type: vk::IndexType,
    ) {
        let mut state = self.lock();
        state.check_recording(command_buffer, "bind_index_buffer");
        state.events.push(GfxMockEvent::BindIndexBuffer {
            command_buffer,
            buffer,
            offset,
        });
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        let mut state = self.lock();
        state.check_recording(command_buffer, "draw_indexed");
        state.events.push(GfxMockEvent::DrawIndexed {
            command_buffer,
            index_count,
            instance_count,
        });
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        begin: &GfxRenderPassBegin,
        _contents: vk::SubpassContents,
    ) {
        let mut state = self.lock();
        state.check_recording(command_buffer, "begin_render_pass");
        state.events.push(GfxMockEvent::BeginRenderPass {
            command_buffer,
            framebuffer: begin.framebuffer,
        });
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        let mut state = self.lock();
        state.check_recording(command_buffer, "end_render_pass");
        state.events.push(GfxMockEvent::EndRenderPass(command_buffer));
    }

    fn cmd_execute_commands(&self, command_buffer: vk::CommandBuffer, secondary_command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.lock();
        state.check_recording(command_buffer, "execute_commands");
        for secondary in secondary_command_buffers {
            if state.recording.contains(&secondary.as_raw()) {
                state.violations.push(format!("secondary command buffer {secondary:?} executed while recording"));
            }
        }
        state
            .executed
            .entry(command_buffer.as_raw())
            .or_default()
            .extend(secondary_command_buffers.iter().map(|secondary| secondary.as_raw()));
        state.events.push(GfxMockEvent::ExecuteCommands {
            command_buffer,
            secondary_command_buffers: secondary_command_buffers.to_vec(),
        });
    }

    fn create_descriptor_set_layout(
        &self,
        _bindings: &[vk::DescriptorSetLayoutBinding<'_>],
        _debug_name: &str,
    ) -> GfxResult<vk::DescriptorSetLayout> {
        Ok(vk::DescriptorSetLayout::from_raw(self.lock().new_handle(GfxObjectKind::DescriptorSetLayout)))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.lock().release_handle(GfxObjectKind::DescriptorSetLayout, layout.as_raw());
    }

    fn create_descriptor_pool(
        &self,
        _pool_sizes: &[vk::DescriptorPoolSize],
        _max_sets: u32,
        _debug_name: &str,
    ) -> GfxResult<vk::DescriptorPool> {
        let mut state = self.lock();
        let raw = state.new_handle(GfxObjectKind::DescriptorPool);
        state.pool_descriptor_sets.insert(raw, HashSet::new());
        Ok(vk::DescriptorPool::from_raw(raw))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.lock();
        let sets = state.pool_descriptor_sets.remove(&pool.as_raw()).unwrap_or_default();
        if let Some(live) = state.live.get_mut(&GfxObjectKind::DescriptorSet) {
            for set in sets {
                live.remove(&set);
            }
        }
        state.release_handle(GfxObjectKind::DescriptorPool, pool.as_raw());
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> GfxResult<Vec<vk::DescriptorSet>> {
        let mut state = self.lock();
        if !state.pool_descriptor_sets.contains_key(&pool.as_raw()) {
            return Err(GfxError::vk("vkAllocateDescriptorSets")(vk::Result::ERROR_OUT_OF_POOL_MEMORY));
        }
        let mut sets = Vec::with_capacity(layouts.len());
        for _ in layouts {
            let raw = state.new_handle(GfxObjectKind::DescriptorSet);
            state.pool_descriptor_sets.entry(pool.as_raw()).or_default().insert(raw);
            sets.push(vk::DescriptorSet::from_raw(raw));
        }
        Ok(sets)
    }

    fn update_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        _descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) {
        self.lock().events.push(GfxMockEvent::UpdateDescriptor {
            set,
            binding,
            buffer,
            range,
        });
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        _usage: vk::BufferUsageFlags,
        mapped: bool,
        _debug_name: &str,
    ) -> GfxResult<GfxBufferAllocation> {
        if size == 0 {
            return Err(GfxError::InvalidArgument("buffer size must be greater than zero".into()));
        }
        let mut state = self.lock();
        let raw = state.new_handle(GfxObjectKind::Buffer);
        let allocation = HostAllocation::new(size as usize);
        let mapped_ptr = mapped.then(|| allocation.ptr());
        state.buffers.insert(raw, allocation);

        Ok(GfxBufferAllocation {
            buffer: vk::Buffer::from_raw(raw),
            size,
            mapped_ptr,
        })
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.lock();
        state.buffers.remove(&buffer.as_raw());
        state.release_handle(GfxObjectKind::Buffer, buffer.as_raw());
    }

    fn flush_buffer(&self, buffer: vk::Buffer, _offset: vk::DeviceSize, _size: vk::DeviceSize) -> GfxResult<()> {
        self.lock().events.push(GfxMockEvent::FlushBuffer(buffer));
        Ok(())
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.lock().release_handle(GfxObjectKind::Pipeline, pipeline.as_raw());
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.lock().release_handle(GfxObjectKind::PipelineLayout, layout.as_raw());
    }

    fn queue_submit(&self, queue: vk::Queue, submit_info: &GfxSubmitInfo, fence: vk::Fence) -> GfxResult<()> {
        let mut state = self.lock();
        if fence != vk::Fence::null() && state.is_fence_signaled(fence.as_raw()) {
            return Err(GfxError::InvalidArgument(format!("fence {fence:?} submitted while signaled")));
        }
        for command_buffer in submit_info.command_buffers() {
            if state.recording.contains(&command_buffer.as_raw()) {
                state.violations.push(format!("command buffer {command_buffer:?} submitted while recording"));
            }
            if fence != vk::Fence::null() {
                state.in_flight.insert(command_buffer.as_raw(), fence.as_raw());
                let secondaries = state.executed.get(&command_buffer.as_raw()).cloned().unwrap_or_default();
                for secondary in secondaries {
                    state.in_flight.insert(secondary, fence.as_raw());
                }
            }
        }
        for semaphore in submit_info.wait_semaphores() {
            state.acquired_semaphores.remove(&semaphore.as_raw());
        }
        state.events.push(GfxMockEvent::Submit {
            queue,
            command_buffers: submit_info.command_buffers().to_vec(),
            wait_semaphores: submit_info.wait_semaphores().to_vec(),
            signal_semaphores: submit_info.signal_semaphores().to_vec(),
            fence,
        });

        if fence != vk::Fence::null() {
            if state.gpu_stalled {
                state.pending_fences.push(fence.as_raw());
            } else {
                state.fences.insert(fence.as_raw(), true);
            }
        }
        Ok(())
    }

    fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> GfxResult<GfxAcquireResult> {
        let mut state = self.lock();
        let result = match state.acquire_script.pop_front() {
            Some(result) => result,
            None => {
                let image_index = state.next_image;
                state.next_image = (state.next_image + 1) % state.image_count;
                GfxAcquireResult::Acquired {
                    image_index,
                    suboptimal: false,
                }
            }
        };
        if matches!(result, GfxAcquireResult::Acquired { .. }) && !state.acquired_semaphores.insert(semaphore.as_raw()) {
            state
                .violations
                .push(format!("semaphore {semaphore:?} acquired again while its signal is still pending"));
        }
        state.events.push(GfxMockEvent::Acquire(result));
        Ok(result)
    }

    fn queue_present(
        &self,
        _queue: vk::Queue,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> GfxResult<GfxPresentResult> {
        let mut state = self.lock();
        state.events.push(GfxMockEvent::Present {
            image_index,
            wait_semaphores: wait_semaphores.to_vec(),
        });
        Ok(state.present_script.pop_front().unwrap_or(GfxPresentResult::Presented))
    }

    fn queue_wait_idle(&self, _queue: vk::Queue) -> GfxResult<()> {
        self.complete_pending();
        Ok(())
    }

    fn device_wait_idle(&self) -> GfxResult<()> {
        self.complete_pending();
        self.lock().events.push(GfxMockEvent::DeviceWaitIdle);
        Ok(())
    }
}
