use std::sync::Arc;

use ash::vk;
use ember_gfx::{
    commands::{command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool},
    gfx_error::GfxResult,
};

use crate::{
    frame::view_resources::FrameCreateInfo,
    resources::{
        render_objects::{GraphicsPipelineResources, MeshResources},
        resources_collection::ResourcesCollection,
    },
};

/// 单个录制线程在一帧内使用的资源
///
/// 每个线程独占一个 command pool 和从中分配的 secondary command buffer，
/// 录制线程之间不会访问同一个 pool。
///
/// 引用的资源只会被转移到外部的 collection，不会在这里直接释放
pub struct ThreadResources {
    resources: ResourcesCollection,

    /// 随 command pool 释放
    command_buffer: GfxCommandBuffer,
    command_pool: GfxCommandPool,
}

// 创建与销毁
impl ThreadResources {
    pub const MIN_RESERVED_OBJECTS: usize = 512;

    pub fn new(info: &FrameCreateInfo, num_objects: usize, name: &str) -> GfxResult<Self> {
        let command_pool = GfxCommandPool::new(info.backend.clone(), info.queue_family_index, name)?;
        let command_buffer = command_pool.create_buffer(vk::CommandBufferLevel::SECONDARY)?;
        Ok(Self {
            resources: ResourcesCollection::with_capacity(num_objects.max(Self::MIN_RESERVED_OBJECTS)),
            command_buffer,
            command_pool,
        })
    }
}

// getters
impl ThreadResources {
    #[inline]
    pub fn command_buffer(&self) -> GfxCommandBuffer {
        self.command_buffer
    }

    #[inline]
    pub fn command_pool(&self) -> &GfxCommandPool {
        &self.command_pool
    }

    #[inline]
    pub fn resources(&self) -> &ResourcesCollection {
        &self.resources
    }
}

// tools
impl ThreadResources {
    /// 重置 command pool，把上一次录制引用的资源交给 `previous`，并为接下来的 `num_objects` 个物体预留空间
    ///
    /// # 前置条件
    /// 只在主线程调用，并且所在 slot 的 fence 已经 signal
    pub fn prepare(&mut self, num_objects: usize, previous: &mut ResourcesCollection) -> GfxResult<()> {
        self.command_pool.reset()?;
        *previous <<= &mut self.resources;
        self.resources.reserve(num_objects);
        Ok(())
    }

    /// 只交出引用的资源，用于线程资源被销毁之前
    #[inline]
    pub fn drain_into(&mut self, previous: &mut ResourcesCollection) {
        *previous <<= &mut self.resources;
    }

    #[inline]
    pub fn push(&mut self, pipeline: Arc<GraphicsPipelineResources>, mesh: Arc<MeshResources>) {
        self.resources.push_pipeline(pipeline);
        self.resources.push_mesh(mesh);
    }
}
