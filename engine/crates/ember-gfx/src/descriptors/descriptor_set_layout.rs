use std::sync::Arc;

use ash::vk;

use crate::{foundation::backend::GfxBackend, gfx_error::GfxResult};

/// 描述符集布局，定义了描述符集中每个绑定的类型和着色器阶段
pub struct GfxDescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
    backend: Arc<dyn GfxBackend>,
}

impl GfxDescriptorSetLayout {
    pub fn new(
        backend: Arc<dyn GfxBackend>,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
        debug_name: &str,
    ) -> GfxResult<Self> {
        let handle = backend.create_descriptor_set_layout(bindings, debug_name)?;
        Ok(Self { handle, backend })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }
}

impl Drop for GfxDescriptorSetLayout {
    fn drop(&mut self) {
        self.backend.destroy_descriptor_set_layout(self.handle);
    }
}
