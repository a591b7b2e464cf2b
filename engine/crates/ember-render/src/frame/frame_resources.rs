use ash::vk;
use ember_gfx::{
    commands::{command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence, semaphore::GfxSemaphore},
    gfx_error::GfxResult,
};

use crate::{
    frame::view_resources::{FrameCreateInfo, ViewResources},
    render_key::RenderKey,
    resources::resources_collection::ResourcesCollection,
    view::render_view::ViewRenderingParameters,
};

/// 一个 frame slot 的全部资源
///
/// 同一个 slot 在 fence signal 之前不会被再次使用，因此 slot 内的资源不需要额外的同步
pub struct FrameResources {
    // drop 顺序：先等待 fence，再销毁 GPU 可能还在使用的资源
    fence: GfxFence,
    image_available_semaphore: GfxSemaphore,

    views: Vec<ViewResources>,
    /// 每个视图一个 primary command buffer，随 command pool 释放
    view_command_buffers: Vec<GfxCommandBuffer>,
    command_pool: GfxCommandPool,

    /// 最后一次使用这个 slot 的渲染操作
    last_render_key: RenderKey,

    create_info: FrameCreateInfo,
    name: String,
}

// 创建与销毁
impl FrameResources {
    pub fn new(create_info: &FrameCreateInfo, frame_label: &str) -> GfxResult<Self> {
        let backend = create_info.backend.clone();
        let fence = GfxFence::new(backend.clone(), true, &format!("{frame_label}-fence"))?;
        let image_available_semaphore = GfxSemaphore::new(backend.clone(), &format!("{frame_label}-image-available"))?;
        let command_pool = GfxCommandPool::new(backend, create_info.queue_family_index, frame_label)?;

        let view = ViewResources::new(create_info, 0, 1, &format!("{frame_label}-view-0"))?;
        let view_command_buffer = command_pool.create_buffer(vk::CommandBufferLevel::PRIMARY)?;

        Ok(Self {
            fence,
            image_available_semaphore,
            views: vec![view],
            view_command_buffers: vec![view_command_buffer],
            command_pool,
            last_render_key: RenderKey::INVALID,
            create_info: create_info.clone(),
            name: frame_label.to_string(),
        })
    }
}

// getters
impl FrameResources {
    #[inline]
    pub fn fence(&self) -> &GfxFence {
        &self.fence
    }

    #[inline]
    pub fn image_available_semaphore(&self) -> &GfxSemaphore {
        &self.image_available_semaphore
    }

    #[inline]
    pub fn views(&self) -> &[ViewResources] {
        &self.views
    }

    #[inline]
    pub fn views_mut(&mut self) -> &mut [ViewResources] {
        &mut self.views
    }

    #[inline]
    pub fn view_command_buffers(&self) -> &[GfxCommandBuffer] {
        &self.view_command_buffers
    }

    /// 录制时同时需要视图资源的可变引用和 primary command buffer
    #[inline]
    pub fn recording_parts(&mut self) -> (&mut [ViewResources], &[GfxCommandBuffer]) {
        (&mut self.views, &self.view_command_buffers)
    }

    #[inline]
    pub fn last_render_key(&self) -> RenderKey {
        self.last_render_key
    }

    #[inline]
    pub fn set_last_render_key(&mut self, key: RenderKey) {
        self.last_render_key = key;
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

// tools
impl FrameResources {
    /// 让视图资源的数量和 `view_params` 一致，并为每个视图准备这一帧的资源
    ///
    /// - 没有视图：保持现有资源不变
    /// - 数量相同：逐个 prepare
    /// - 视图变多：先 prepare 已有的，再创建新的视图资源和 primary command buffer
    /// - 视图变少：释放多出来的 primary command buffer，多出来的视图资源在交出引用的资源之后销毁
    ///
    /// # 前置条件
    /// fence 已经 signal
    pub fn prepare(&mut self, view_params: &[ViewRenderingParameters], previous: &mut ResourcesCollection) -> GfxResult<()> {
        let _span = tracy_client::span!("FrameResources::prepare");

        self.command_pool.reset()?;

        if view_params.is_empty() {
            return Ok(());
        }

        if view_params.len() < self.views.len() {
            let removed_buffers = self.view_command_buffers.split_off(view_params.len());
            self.command_pool.destroy_buffers(&removed_buffers);
            for mut view in self.views.drain(view_params.len()..) {
                view.drain_into(previous);
            }
        }

        for (view, params) in self.views.iter_mut().zip(view_params) {
            view.prepare(params.entities.len(), params.thread_count(), previous)?;
        }

        if view_params.len() > self.views.len() {
            let missing = view_params.len() - self.views.len();
            for params in &view_params[self.views.len()..] {
                let name = format!("{}-view-{}", self.name, self.views.len());
                self.views.push(ViewResources::new(
                    &self.create_info,
                    params.entities.len(),
                    params.thread_count(),
                    &name,
                )?);
            }
            let buffers = self.command_pool.create_buffers(missing as u32, vk::CommandBufferLevel::PRIMARY)?;
            self.view_command_buffers.extend(buffers);
        }

        Ok(())
    }
}

impl Drop for FrameResources {
    fn drop(&mut self) {
        log::info!("Destroying FrameResources: {}", self.name);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ember_gfx::foundation::mock_backend::{GfxMockEvent, GfxObjectKind};
    use glam::UVec2;
    use itertools::Itertools;

    use super::*;
    use crate::{
        testing::{make_create_info, make_entities, make_mesh, make_pipeline},
        view::render_view::View,
    };

    fn params_for<'a>(
        views: &[View],
        entities: &'a [crate::view::render_view::RenderEntity],
    ) -> Vec<ViewRenderingParameters<'a>> {
        views
            .iter()
            .map(|view| ViewRenderingParameters::new(view, UVec2::new(800, 600), entities))
            .collect_vec()
    }

    #[test]
    fn test_new_frame_has_one_view() {
        let (mock, info, _layouts) = make_create_info(3);
        let frame = FrameResources::new(&info, "frame-0").unwrap();

        assert_eq!(frame.views().len(), 1);
        assert_eq!(frame.view_command_buffers().len(), 1);
        assert!(mock.fence_signaled(frame.fence().handle()));
        assert!(!frame.last_render_key().is_valid());
    }

    #[test]
    fn test_empty_params_keep_views() {
        let (mock, info, _layouts) = make_create_info(3);
        let mut frame = FrameResources::new(&info, "frame-0").unwrap();
        let mut previous = ResourcesCollection::default();

        frame.prepare(&params_for(&[View::new("a"), View::new("b")], &[]), &mut previous).unwrap();
        mock.clear_events();
        frame.prepare(&[], &mut previous).unwrap();

        assert_eq!(frame.views().len(), 2);
        assert!(!mock.events().iter().any(|e| matches!(e, GfxMockEvent::Destroy(..))));
    }

    #[test]
    fn test_reconcile_is_idempotent_and_does_not_leak() {
        let (mock, info, _layouts) = make_create_info(3);
        let mut frame = FrameResources::new(&info, "frame-0").unwrap();
        let mut previous = ResourcesCollection::default();

        let pools = mock.live_count(GfxObjectKind::CommandPool);
        let descriptor_pools = mock.live_count(GfxObjectKind::DescriptorPool);
        let buffers = mock.live_count(GfxObjectKind::Buffer);
        let command_buffers = mock.live_count(GfxObjectKind::CommandBuffer);

        let three = [View::new("a"), View::new("b"), View::new("c")];
        frame.prepare(&params_for(&three, &[]), &mut previous).unwrap();
        assert_eq!(frame.views().len(), 3);
        assert_eq!(frame.view_command_buffers().len(), 3);

        // 相同的参数不会再创建任何对象
        mock.clear_events();
        frame.prepare(&params_for(&three, &[]), &mut previous).unwrap();
        assert!(!mock.events().iter().any(|e| matches!(e, GfxMockEvent::Create(..))));

        frame.prepare(&params_for(&[View::new("a")], &[]), &mut previous).unwrap();
        assert_eq!(frame.views().len(), 1);
        assert_eq!(frame.view_command_buffers().len(), 1);
        assert_eq!(mock.live_count(GfxObjectKind::CommandPool), pools);
        assert_eq!(mock.live_count(GfxObjectKind::DescriptorPool), descriptor_pools);
        assert_eq!(mock.live_count(GfxObjectKind::Buffer), buffers);
        assert_eq!(mock.live_count(GfxObjectKind::CommandBuffer), command_buffers);
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());
    }

    #[test]
    fn test_shrink_hands_over_thread_resources() {
        let (mock, info, _layouts) = make_create_info(3);
        let mut frame = FrameResources::new(&info, "frame-0").unwrap();
        let mut previous = ResourcesCollection::default();

        frame.prepare(&params_for(&[View::new("a"), View::new("b")], &[]), &mut previous).unwrap();
        let pipeline = Arc::new(make_pipeline(&mock, "p"));
        let mesh = Arc::new(make_mesh(&mock, "m"));
        frame.views_mut()[1].recording_parts().threads[0].push(pipeline.clone(), mesh.clone());

        frame.prepare(&params_for(&[View::new("a")], &[]), &mut previous).unwrap();
        assert_eq!(previous.len(), 2);
        assert_eq!(Arc::strong_count(&pipeline), 2);
    }

    #[test]
    fn test_views_grow_with_entities() {
        let (mock, info, _layouts) = make_create_info(3);
        let mut frame = FrameResources::new(&info, "frame-0").unwrap();
        let mut previous = ResourcesCollection::default();

        let pipeline = Arc::new(make_pipeline(&mock, "p"));
        let mesh = Arc::new(make_mesh(&mock, "m"));
        let entities = make_entities(600, &pipeline, &mesh);

        let views = [View::new("a"), View::new("b").with_threads(4)];
        frame.prepare(&params_for(&views, &entities), &mut previous).unwrap();

        assert_eq!(frame.views()[0].uniforms().object().num_elements(), 600);
        assert_eq!(frame.views()[1].uniforms().object().num_elements(), 600);
        assert_eq!(frame.views()[1].threads().len(), 4);
    }
}
