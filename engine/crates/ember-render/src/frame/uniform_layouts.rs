use std::sync::Arc;

use ash::vk;
use ember_gfx::{
    descriptors::descriptor_set_layout::GfxDescriptorSetLayout, foundation::backend::GfxBackend,
    gfx_error::GfxResult, resources::uniforms::GfxUniformBlock,
};

use crate::frame::uniform_types::{GlobalUniforms, ObjectUniforms};

/// 所有 pipeline 共享的描述符集布局：set 0 为 global，set 1 为 object
pub struct UniformLayouts {
    global: GfxDescriptorSetLayout,
    object: GfxDescriptorSetLayout,
}

impl UniformLayouts {
    pub fn new(backend: Arc<dyn GfxBackend>) -> GfxResult<Self> {
        let global = GfxDescriptorSetLayout::new(
            backend.clone(),
            &[GlobalUniforms::layout_binding(vk::ShaderStageFlags::ALL_GRAPHICS)],
            "global-uniforms",
        )?;
        let object = GfxDescriptorSetLayout::new(
            backend,
            &[ObjectUniforms::layout_binding(vk::ShaderStageFlags::VERTEX)],
            "object-uniforms",
        )?;
        Ok(Self { global, object })
    }

    #[inline]
    pub fn global(&self) -> vk::DescriptorSetLayout {
        self.global.handle()
    }

    #[inline]
    pub fn object(&self) -> vk::DescriptorSetLayout {
        self.object.handle()
    }
}
