use ash::vk;
use ember_gfx::swapchain::gfx_swapchain::GfxSwapchain;

use crate::{
    render_target::{RenderPasses, RenderTarget},
    resources::{deferred::DeferredDestructionQueue, resources_collection::ResourcesCollection},
    view::render_view::RenderEntity,
};

/// 窗口对应的渲染目标
///
/// 在 [`RenderTarget`] 之上处理：
/// - 被替换下来的资源的延迟释放
/// - 连续跳帧的计数
/// - swapchain 重建
pub struct Surface {
    // drop 顺序：先等待所有 frame 的 fence，再释放延迟队列中的资源
    target: RenderTarget,
    deferred: DeferredDestructionQueue,

    /// 连续被跳过的帧数
    retry_count: u32,
    should_recreate_swapchain: bool,
}

// new & init
impl Surface {
    pub fn new(target: RenderTarget) -> Self {
        Self {
            target,
            deferred: DeferredDestructionQueue::new(),
            retry_count: 0,
            should_recreate_swapchain: false,
        }
    }
}

// getters
impl Surface {
    #[inline]
    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    #[inline]
    pub fn should_recreate_swapchain(&self) -> bool {
        self.should_recreate_swapchain
    }

    #[inline]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[inline]
    pub fn pending_destruction_count(&self) -> usize {
        self.deferred.pending_count()
    }
}

// tools
impl Surface {
    /// 渲染一帧
    ///
    /// 帧被跳过时仍然返回 `true`，只有连续 `max_retry_count` 帧都被跳过才返回 `false`
    pub fn render(&mut self, passes: &RenderPasses, entities: &[RenderEntity]) -> anyhow::Result<bool> {
        let _span = tracy_client::span!("Surface::render");

        let mut previous = ResourcesCollection::default();
        let rendered = self.target.render(passes, entities, &mut previous)?;

        let organizer = self.target.organizer();
        self.deferred.enqueue(organizer.last_retired_key(), previous);
        self.deferred.release_completed(organizer.completed_render_key());
        if organizer.needs_recreate() {
            self.should_recreate_swapchain = true;
        }

        if rendered {
            self.retry_count = 0;
            return Ok(true);
        }

        self.retry_count += 1;
        let max_retry_count = self.target.settings().max_retry_count;
        if self.retry_count >= max_retry_count {
            log::error!("Surface skipped {} frames in a row", self.retry_count);
            return Ok(false);
        }
        Ok(true)
    }

    /// 外部重建 swapchain 之后调用
    ///
    /// 先等待设备空闲，再释放所有延迟销毁的资源，最后重建帧资源
    pub fn recreate_swapchain(&mut self, swapchain: GfxSwapchain, framebuffers: Vec<vk::Framebuffer>) -> anyhow::Result<()> {
        let _span = tracy_client::span!("Surface::recreate_swapchain");
        log::info!(
            "Recreating surface: {}x{}, {} images",
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.image_count()
        );

        self.target.wait_idle()?;
        self.deferred.flush_all();
        self.target.recreate(swapchain, framebuffers)?;

        self.should_recreate_swapchain = false;
        self.retry_count = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ash::vk::Handle;
    use ember_gfx::{
        foundation::mock_backend::{GfxMockBackend, GfxObjectKind},
        swapchain::gfx_swapchain::GfxPresentResult,
    };

    use super::*;
    use crate::{
        frame::uniform_layouts::UniformLayouts,
        settings::{Buffering, RendererSettings},
        testing::{make_entities, make_framebuffers, make_mesh, make_pipeline, make_queues, make_swapchain},
        view::render_view::View,
    };

    fn make_surface(settings: RendererSettings) -> (Arc<GfxMockBackend>, Surface) {
        let mock = Arc::new(GfxMockBackend::new(3));
        let layouts = Arc::new(UniformLayouts::new(mock.clone()).unwrap());
        let target = RenderTarget::new(
            mock.clone(),
            make_queues(),
            make_swapchain(3),
            make_framebuffers(3),
            layouts,
            settings,
        )
        .unwrap();
        target.add_view(View::new("main").with_threads(2));
        (mock, Surface::new(target))
    }

    fn make_passes() -> RenderPasses {
        RenderPasses {
            surface: vk::RenderPass::from_raw(0x400),
            clear_values: vec![],
        }
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let (mock, mut surface) = make_surface(RendererSettings {
            max_retry_count: 3,
            ..Default::default()
        });
        let passes = make_passes();

        mock.set_gpu_stalled(true);
        assert!(surface.render(&passes, &[]).unwrap());
        assert!(surface.render(&passes, &[]).unwrap());

        assert!(surface.render(&passes, &[]).unwrap());
        assert!(surface.render(&passes, &[]).unwrap());
        assert_eq!(surface.retry_count(), 2);
        assert!(!surface.render(&passes, &[]).unwrap());

        mock.set_gpu_stalled(false);
        mock.complete_pending();
        assert!(surface.render(&passes, &[]).unwrap());
        assert_eq!(surface.retry_count(), 0);
    }

    #[test]
    fn test_retired_resources_are_released() {
        let (mock, mut surface) = make_surface(RendererSettings::default());
        let pipeline = Arc::new(make_pipeline(&mock, "pipeline"));
        let mesh = Arc::new(make_mesh(&mock, "mesh"));
        let entities = make_entities(5, &pipeline, &mesh);
        let passes = make_passes();

        for _ in 0..4 {
            assert!(surface.render(&passes, &entities).unwrap());
            assert_eq!(surface.pending_destruction_count(), 0);
        }
        // 自身 + 实体 + 两个 slot 各自引用的一份
        assert_eq!(Arc::strong_count(&pipeline), 1 + 5 + 5 + 5);
    }

    #[test]
    fn test_recreate_on_out_of_date() {
        let (mock, mut surface) = make_surface(RendererSettings {
            buffering: Buffering::Triple,
            ..Default::default()
        });
        let passes = make_passes();

        mock.push_present_result(GfxPresentResult::OutOfDate);
        assert!(surface.render(&passes, &[]).unwrap());
        assert!(surface.should_recreate_swapchain());

        surface.recreate_swapchain(make_swapchain(3), make_framebuffers(3)).unwrap();
        assert!(!surface.should_recreate_swapchain());
        assert_eq!(surface.target().organizer().num_frames(), 3);
        assert!(surface.render(&passes, &[]).unwrap());
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());
    }

    #[test]
    fn test_drop_releases_everything() {
        let (mock, mut surface) = make_surface(RendererSettings::default());
        let pipeline = Arc::new(make_pipeline(&mock, "pipeline"));
        let mesh = Arc::new(make_mesh(&mock, "mesh"));
        let entities = make_entities(100, &pipeline, &mesh);
        let passes = make_passes();
        for _ in 0..5 {
            surface.render(&passes, &entities).unwrap();
        }

        drop(surface);
        drop(entities);
        drop(pipeline);
        drop(mesh);

        for kind in [
            GfxObjectKind::Fence,
            GfxObjectKind::Semaphore,
            GfxObjectKind::CommandPool,
            GfxObjectKind::CommandBuffer,
            GfxObjectKind::DescriptorSetLayout,
            GfxObjectKind::DescriptorPool,
            GfxObjectKind::DescriptorSet,
            GfxObjectKind::Buffer,
            GfxObjectKind::Pipeline,
            GfxObjectKind::PipelineLayout,
        ] {
            assert_eq!(mock.live_count(kind), 0, "{kind:?}");
        }
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());
    }
}
