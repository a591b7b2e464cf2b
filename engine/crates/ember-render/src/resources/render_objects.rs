use std::sync::Arc;

use ash::vk;
use ember_gfx::{foundation::backend::GfxBackend, resources::buffer::GfxBuffer};

/// 绘制一种材质所需要的 GPU 管线状态
///
/// 通过 `Arc` 在多个帧、多个线程之间共享，最后一个引用释放时销毁 Vulkan 对象
pub struct GraphicsPipelineResources {
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    /// 材质独有的描述符集布局，由这里负责销毁
    set_layouts: Vec<vk::DescriptorSetLayout>,

    backend: Arc<dyn GfxBackend>,
    name: String,
}

// new & init
impl GraphicsPipelineResources {
    /// 接管外部创建的 pipeline 对象的所有权
    pub fn new(
        backend: Arc<dyn GfxBackend>,
        pipeline: vk::Pipeline,
        pipeline_layout: vk::PipelineLayout,
        set_layouts: Vec<vk::DescriptorSetLayout>,
        name: &str,
    ) -> Self {
        Self {
            pipeline,
            pipeline_layout,
            set_layouts,
            backend,
            name: name.to_string(),
        }
    }
}

// getters
impl GraphicsPipelineResources {
    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    #[inline]
    pub fn set_layouts(&self) -> &[vk::DescriptorSetLayout] {
        &self.set_layouts
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for GraphicsPipelineResources {
    fn drop(&mut self) {
        log::info!("Destroying GraphicsPipelineResources: {}", self.name);
        self.backend.destroy_pipeline(self.pipeline);
        self.backend.destroy_pipeline_layout(self.pipeline_layout);
        for layout in self.set_layouts.drain(..) {
            self.backend.destroy_descriptor_set_layout(layout);
        }
    }
}

/// 一个 mesh 的顶点和索引数据，两者位于同一个 buffer 中
pub struct MeshResources {
    buffer: GfxBuffer,

    vertex_offset: vk::DeviceSize,
    index_offset: vk::DeviceSize,
    vertex_count: u32,
    index_count: u32,
    index_type: vk::IndexType,
}

// new & init
impl MeshResources {
    pub fn new(
        buffer: GfxBuffer,
        vertex_offset: vk::DeviceSize,
        index_offset: vk::DeviceSize,
        vertex_count: u32,
        index_count: u32,
        index_type: vk::IndexType,
    ) -> Self {
        Self {
            buffer,
            vertex_offset,
            index_offset,
            vertex_count,
            index_count,
            index_type,
        }
    }
}

// getters
impl MeshResources {
    #[inline]
    pub fn buffer(&self) -> &GfxBuffer {
        &self.buffer
    }

    #[inline]
    pub fn vertex_offset(&self) -> vk::DeviceSize {
        self.vertex_offset
    }

    #[inline]
    pub fn index_offset(&self) -> vk::DeviceSize {
        self.index_offset
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    #[inline]
    pub fn index_type(&self) -> vk::IndexType {
        self.index_type
    }
}
