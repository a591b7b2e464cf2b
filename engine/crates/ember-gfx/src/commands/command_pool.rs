use std::sync::Arc;

use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{
        command_buffer::GfxCommandBuffer,
        command_queue::{GfxQueue, GfxQueueKind},
    },
    foundation::backend::GfxBackend,
    gfx_error::{GfxError, GfxResult},
};

/// command pool 是和 queue family 绑定的，而不是和 queue 绑定的
///
/// pool 内的 command buffer 不能单独重置，只能通过 [`GfxCommandPool::reset`] 整体重置，
/// 因此调用方必须先通过 fence 确认 GPU 已经不再使用这个 pool 里的任何 command buffer。
pub struct GfxCommandPool {
    handle: vk::CommandPool,
    queue_family_index: u32,
    backend: Arc<dyn GfxBackend>,

    debug_name: String,
}

// init & destroy
impl GfxCommandPool {
    pub fn new(backend: Arc<dyn GfxBackend>, queue_family_index: u32, debug_name: &str) -> GfxResult<Self> {
        let handle =
            backend.create_command_pool(queue_family_index, vk::CommandPoolCreateFlags::TRANSIENT, debug_name)?;
        log::info!("Created CommandPool: {}", debug_name);

        Ok(Self {
            handle,
            queue_family_index,
            backend,
            debug_name: debug_name.to_string(),
        })
    }

    #[inline]
    pub fn for_queue<K: GfxQueueKind>(
        backend: Arc<dyn GfxBackend>,
        queue: &GfxQueue<K>,
        debug_name: &str,
    ) -> GfxResult<Self> {
        Self::new(backend, queue.queue_family_index(), debug_name)
    }
}

// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

// tools
impl GfxCommandPool {
    /// 这个调用并不会释放 command buffer，而是将 pool 内的 command buffer 设置到初始状态
    ///
    /// reset 之后，pool 内的 command buffer 又可以重新录制命令
    ///
    /// # 前置条件
    /// GPU 不能还在执行这个 pool 中的任何 command buffer
    #[inline]
    pub fn reset(&self) -> GfxResult<()> {
        self.backend.reset_command_pool(self.handle)
    }

    pub fn create_buffer(&self, level: vk::CommandBufferLevel) -> GfxResult<GfxCommandBuffer> {
        let mut buffers = self.create_buffers(1, level)?;
        buffers.pop().ok_or_else(|| GfxError::InvalidArgument("command buffer allocation returned nothing".into()))
    }

    pub fn create_buffers(&self, count: u32, level: vk::CommandBufferLevel) -> GfxResult<Vec<GfxCommandBuffer>> {
        if count == 0 {
            return Err(GfxError::InvalidArgument(format!(
                "cannot create zero command buffers from pool {}",
                self.debug_name
            )));
        }

        let handles = self.backend.allocate_command_buffers(self.handle, level, count)?;
        Ok(handles.into_iter().map(|handle| GfxCommandBuffer::new(handle, level)).collect_vec())
    }

    /// 释放之后，command buffer 不能再被使用
    #[inline]
    pub fn destroy_buffer(&self, command_buffer: GfxCommandBuffer) {
        self.destroy_buffers(std::slice::from_ref(&command_buffer));
    }

    pub fn destroy_buffers(&self, command_buffers: &[GfxCommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        let handles = command_buffers.iter().map(|cmd| cmd.vk_handle()).collect_vec();
        self.backend.free_command_buffers(self.handle, &handles);
    }
}

impl Drop for GfxCommandPool {
    fn drop(&mut self) {
        log::info!("Destroying CommandPool: {}", self.debug_name);
        self.backend.destroy_command_pool(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::mock_backend::{GfxMockBackend, GfxMockEvent, GfxObjectKind};

    #[test]
    fn test_create_zero_buffers_is_error() {
        let mock = Arc::new(GfxMockBackend::new(3));
        let pool = GfxCommandPool::new(mock.clone(), 0, "test-pool").unwrap();

        let result = pool.create_buffers(0, vk::CommandBufferLevel::PRIMARY);
        assert!(matches!(result, Err(GfxError::InvalidArgument(_))));
    }

    #[test]
    fn test_buffers_are_freed_and_pool_destroyed() {
        let mock = Arc::new(GfxMockBackend::new(3));
        {
            let pool = GfxCommandPool::new(mock.clone(), 0, "test-pool").unwrap();
            let buffers = pool.create_buffers(3, vk::CommandBufferLevel::SECONDARY).unwrap();
            assert_eq!(buffers.len(), 3);
            assert!(buffers.iter().all(|cmd| cmd.level() == vk::CommandBufferLevel::SECONDARY));
            assert_eq!(mock.live_count(GfxObjectKind::CommandBuffer), 3);

            pool.destroy_buffer(buffers[2]);
            assert_eq!(mock.live_count(GfxObjectKind::CommandBuffer), 2);

            pool.reset().unwrap();
            assert!(mock.events().contains(&GfxMockEvent::ResetCommandPool(pool.handle())));
        }
        assert_eq!(mock.live_count(GfxObjectKind::CommandPool), 0);
    }
}
