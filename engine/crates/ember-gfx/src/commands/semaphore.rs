use std::sync::Arc;

use ash::vk;

use crate::{foundation::backend::GfxBackend, gfx_error::GfxResult};

/// GPU -> GPU 的同步原语，用于排列 queue 之间的操作顺序
pub struct GfxSemaphore {
    semaphore: vk::Semaphore,
    backend: Arc<dyn GfxBackend>,
}

// 创建与销毁
impl GfxSemaphore {
    pub fn new(backend: Arc<dyn GfxBackend>, debug_name: &str) -> GfxResult<Self> {
        let semaphore = backend.create_semaphore(debug_name)?;
        Ok(Self { semaphore, backend })
    }
}

// getters
impl GfxSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for GfxSemaphore {
    fn drop(&mut self) {
        self.backend.destroy_semaphore(self.semaphore);
    }
}
