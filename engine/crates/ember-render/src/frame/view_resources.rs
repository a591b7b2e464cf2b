use std::sync::Arc;

use ash::vk;
use ember_gfx::{
    descriptors::{descriptor_pool::GfxDescriptorPool, descriptor_sets::GfxDescriptorSets},
    foundation::backend::GfxBackend,
    gfx_error::GfxResult,
    resources::uniforms::GfxUniforms,
};

use crate::{
    frame::{
        thread_resources::ThreadResources,
        uniform_types::{GlobalUniforms, ObjectUniforms},
    },
    resources::resources_collection::ResourcesCollection,
};

/// 创建帧内资源时需要的共享信息
#[derive(Clone)]
pub struct FrameCreateInfo {
    pub backend: Arc<dyn GfxBackend>,
    /// 所有 command pool 都创建在 graphics queue family 上
    pub queue_family_index: u32,
    pub global_layout: vk::DescriptorSetLayout,
    pub object_layout: vk::DescriptorSetLayout,
}

/// 一个视图在一帧内使用的 uniforms
///
/// 描述符集 0 为 global，1 为 object
pub struct FrameUniforms {
    global: GfxUniforms<GlobalUniforms>,
    object: GfxUniforms<ObjectUniforms>,
    sets: GfxDescriptorSets<2>,
}

impl FrameUniforms {
    pub const INITIAL_OBJECT_CAPACITY: usize = 512;

    fn new(pool: &GfxDescriptorPool, info: &FrameCreateInfo, name: &str) -> GfxResult<Self> {
        let sets = GfxDescriptorSets::new(pool, [info.global_layout, info.object_layout])?;
        let global = GfxUniforms::new(info.backend.clone(), sets[0], 1, &format!("{name}-global"))?;
        let object = GfxUniforms::new(
            info.backend.clone(),
            sets[1],
            Self::INITIAL_OBJECT_CAPACITY,
            &format!("{name}-object"),
        )?;
        Ok(Self { global, object, sets })
    }

    #[inline]
    pub fn global(&self) -> &GfxUniforms<GlobalUniforms> {
        &self.global
    }

    #[inline]
    pub fn object(&self) -> &GfxUniforms<ObjectUniforms> {
        &self.object
    }

    #[inline]
    pub fn descriptor_sets(&self) -> [vk::DescriptorSet; 2] {
        *self.sets.handles()
    }

    /// 同时拿到两块 uniforms 的可变引用，分别交给主线程和录制线程写入
    #[inline]
    pub fn split_mut(&mut self) -> (&mut GfxUniforms<GlobalUniforms>, &mut GfxUniforms<ObjectUniforms>) {
        (&mut self.global, &mut self.object)
    }

    pub fn flush(&self) -> GfxResult<()> {
        self.global.flush()?;
        self.object.flush()
    }
}

/// 录制一个视图时，主线程需要同时借用的部分
pub struct ViewRecordingParts<'a> {
    pub uniforms: &'a mut FrameUniforms,
    pub threads: &'a mut [ThreadResources],
}

/// 一个视图在一个 frame slot 中的资源
///
/// 线程资源的数量只增不减：视图需要的线程变少时，多出来的部分保留下来，只是不参与录制
pub struct ViewResources {
    threads: Vec<ThreadResources>,

    // drop 顺序：uniforms 先于 descriptor pool
    uniforms: FrameUniforms,
    descriptor_pool: GfxDescriptorPool,

    create_info: FrameCreateInfo,
    name: String,
}

// 创建与销毁
impl ViewResources {
    pub fn new(info: &FrameCreateInfo, num_objects: usize, num_threads: usize, name: &str) -> GfxResult<Self> {
        let descriptor_pool = GfxDescriptorPool::new(
            info.backend.clone(),
            &[
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: 1,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                    descriptor_count: 1,
                },
            ],
            2,
            name,
        )?;
        let mut uniforms = FrameUniforms::new(&descriptor_pool, info, name)?;
        uniforms.object.reserve(num_objects)?;

        let mut view = Self {
            threads: Vec::new(),
            uniforms,
            descriptor_pool,
            create_info: info.clone(),
            name: name.to_string(),
        };
        view.grow_threads(num_objects, num_threads)?;
        Ok(view)
    }

    fn grow_threads(&mut self, num_objects: usize, num_threads: usize) -> GfxResult<()> {
        let num_threads = num_threads.max(1);
        if num_threads <= self.threads.len() {
            return Ok(());
        }
        let per_thread = num_objects.div_ceil(num_threads);

        for thread_index in self.threads.len()..num_threads {
            let thread = ThreadResources::new(
                &self.create_info,
                per_thread,
                &format!("{}-thread-{}", self.name, thread_index),
            )?;
            self.threads.push(thread);
        }
        Ok(())
    }
}

// getters
impl ViewResources {
    #[inline]
    pub fn uniforms(&self) -> &FrameUniforms {
        &self.uniforms
    }

    #[inline]
    pub fn threads(&self) -> &[ThreadResources] {
        &self.threads
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn recording_parts(&mut self) -> ViewRecordingParts<'_> {
        ViewRecordingParts {
            uniforms: &mut self.uniforms,
            threads: &mut self.threads,
        }
    }
}

// tools
impl ViewResources {
    /// 为新的一帧准备资源
    ///
    /// 每个线程的 command pool 都在这里由主线程重置
    ///
    /// # 前置条件
    /// 这个 slot 的 fence 已经 signal，GPU 不再使用这里的 command buffer 和 uniforms
    pub fn prepare(
        &mut self,
        num_objects: usize,
        num_threads: usize,
        previous: &mut ResourcesCollection,
    ) -> GfxResult<()> {
        let _span = tracy_client::span!("ViewResources::prepare");

        self.uniforms.object.reserve(num_objects)?;

        let per_thread = num_objects.div_ceil(num_threads.max(1));
        for thread in &mut self.threads {
            thread.prepare(per_thread, previous)?;
        }
        self.grow_threads(num_objects, num_threads)
    }

    /// 把所有线程引用的资源交给 `previous`，用于视图被移除之前
    pub fn drain_into(&mut self, previous: &mut ResourcesCollection) {
        for thread in &mut self.threads {
            thread.drain_into(previous);
        }
    }
}

impl Drop for ViewResources {
    fn drop(&mut self) {
        log::info!("Destroying ViewResources: {}", self.name);
    }
}
