use std::sync::Arc;

use ash::vk;

use crate::{foundation::backend::GfxBackend, gfx_error::GfxResult};

/// 描述符池
///
/// 容量在创建时固定，不提供 reset：池内的描述符集跟随池一起销毁
pub struct GfxDescriptorPool {
    handle: vk::DescriptorPool,
    backend: Arc<dyn GfxBackend>,

    name: String,
}

// 创建与销毁
impl GfxDescriptorPool {
    /// # 参数
    /// - pool_sizes: 每种类型描述符的最大数量
    /// - max_sets: 最大描述符集数量
    pub fn new(
        backend: Arc<dyn GfxBackend>,
        pool_sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
        name: &str,
    ) -> GfxResult<Self> {
        let handle = backend.create_descriptor_pool(pool_sizes, max_sets, name)?;
        Ok(Self {
            handle,
            backend,
            name: name.to_string(),
        })
    }
}

// getters
impl GfxDescriptorPool {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    #[inline]
    pub fn backend(&self) -> &Arc<dyn GfxBackend> {
        &self.backend
    }
}

impl Drop for GfxDescriptorPool {
    fn drop(&mut self) {
        log::info!("Destroying DescriptorPool: {}", self.name);
        self.backend.destroy_descriptor_pool(self.handle);
    }
}
