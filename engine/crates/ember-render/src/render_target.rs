use std::{
    sync::{Arc, PoisonError, RwLock, RwLockWriteGuard},
    time::Instant,
};

use anyhow::Context;
use ash::vk;
use ember_gfx::{
    commands::{
        command_buffer::{GfxCommandBuffer, GfxCommandInheritance, GfxCommandWriter, GfxRenderPassScope},
        command_queue::GfxSurfaceQueues,
    },
    foundation::backend::{GfxBackend, GfxRenderPassBegin},
    resources::uniforms::GfxUniformWriter,
    swapchain::gfx_swapchain::GfxSwapchain,
};
use glam::{Mat4, UVec2};
use itertools::Itertools;

use crate::{
    frame::{
        frame_organizer::{FrameOrganizer, PreparedFrame},
        thread_resources::ThreadResources,
        uniform_layouts::UniformLayouts,
        uniform_types::{GlobalUniforms, ObjectUniforms},
        view_resources::{ViewRecordingParts, ViewResources},
    },
    partition::thread_slices,
    resources::resources_collection::ResourcesCollection,
    settings::RendererSettings,
    view::{
        render_view::{MeshRenderer, RenderEntity, View, ViewRenderingParameters},
        view_rect::ViewRect,
    },
};

/// 渲染到 surface 时使用的 render pass
pub struct RenderPasses {
    pub surface: vk::RenderPass,
    /// 每个视图只清除自己的区域
    pub clear_values: Vec<vk::ClearValue>,
}

/// 一个录制线程负责的工作
struct ThreadRecording<'a> {
    command_buffer: GfxCommandBuffer,
    rect: ViewRect,
    view_projection: Mat4,
    descriptor_sets: [vk::DescriptorSet; 2],

    entities: &'a [&'a RenderEntity],
    /// `entities[0]` 在整个视图中的下标
    first_index: usize,
    uniforms: GfxUniformWriter<'a, ObjectUniforms>,
    resources: &'a mut ThreadResources,

    result: anyhow::Result<()>,
}

impl ThreadRecording<'_> {
    fn record(&mut self, backend: &dyn GfxBackend, inheritance: &GfxCommandInheritance) -> anyhow::Result<()> {
        let _span = tracy_client::span!("RenderTarget::record_thread");

        let writer = GfxCommandWriter::begin_secondary(backend, self.command_buffer, inheritance)?;
        writer.set_viewports(0, &[self.rect.to_vk_viewport()]);
        writer.set_scissors(0, &[self.rect.to_vk_rect()]);

        for (i, entity) in self.entities.iter().enumerate() {
            let Some(MeshRenderer {
                material: Some(material),
                mesh: Some(mesh),
            }) = &entity.renderer
            else {
                continue;
            };

            let index = self.first_index + i;
            let offset = self
                .uniforms
                .write(&ObjectUniforms::new(self.view_projection * entity.transform), index)?;

            writer.bind_graphics_pipeline(material.pipeline());
            writer.bind_graphics_descriptor_sets(material.pipeline_layout(), 0, &self.descriptor_sets, &[offset]);
            writer.bind_vertex_buffers(0, &[mesh.buffer().vk_buffer()], &[mesh.vertex_offset()])?;
            writer.bind_index_buffer(mesh.buffer().vk_buffer(), mesh.index_offset(), mesh.index_type());
            writer.draw_indexed(0, mesh.index_count(), 0, 1);

            self.resources.push(material.clone(), mesh.clone());
        }

        writer.end()?;
        Ok(())
    }
}

/// 一组视图以及渲染它们需要的帧资源
///
/// 视图列表可以在其他线程修改，每一帧开始时读取一次
pub struct RenderTarget {
    views: RwLock<Vec<View>>,

    organizer: FrameOrganizer,
    /// 和 swapchain image 一一对应
    framebuffers: Vec<vk::Framebuffer>,

    layouts: Arc<UniformLayouts>,
    queues: GfxSurfaceQueues,
    settings: RendererSettings,
    start_time: Instant,

    backend: Arc<dyn GfxBackend>,
}

// new & init
impl RenderTarget {
    pub fn new(
        backend: Arc<dyn GfxBackend>,
        queues: GfxSurfaceQueues,
        swapchain: GfxSwapchain,
        framebuffers: Vec<vk::Framebuffer>,
        layouts: Arc<UniformLayouts>,
        settings: RendererSettings,
    ) -> anyhow::Result<Self> {
        Self::check_framebuffers(&swapchain, &framebuffers)?;
        let organizer = FrameOrganizer::new(backend.clone(), queues, swapchain, &layouts, &settings)?;

        Ok(Self {
            views: RwLock::new(Vec::new()),
            organizer,
            framebuffers,
            layouts,
            queues,
            settings,
            start_time: Instant::now(),
            backend,
        })
    }

    fn check_framebuffers(swapchain: &GfxSwapchain, framebuffers: &[vk::Framebuffer]) -> anyhow::Result<()> {
        if framebuffers.len() != swapchain.image_count() {
            anyhow::bail!(
                "framebuffer count ({}) does not match swapchain image count ({})",
                framebuffers.len(),
                swapchain.image_count()
            );
        }
        Ok(())
    }
}

// getters
impl RenderTarget {
    #[inline]
    pub fn organizer(&self) -> &FrameOrganizer {
        &self.organizer
    }

    #[inline]
    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    #[inline]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn view_count(&self) -> usize {
        self.views.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// 视图管理
impl RenderTarget {
    pub fn add_view(&self, view: View) {
        log::info!("Adding view: {}", view.id);
        self.views.write().unwrap_or_else(PoisonError::into_inner).push(view);
    }

    /// 移除第一个 id 匹配的视图
    pub fn remove_view(&self, id: &str) -> Option<View> {
        let mut views = self.views.write().unwrap_or_else(PoisonError::into_inner);
        let index = views.iter().position(|view| view.id == id)?;
        log::info!("Removing view: {}", id);
        Some(views.remove(index))
    }

    /// 持有写锁期间，[`Self::render`] 会等待
    pub fn views_mut(&self) -> RwLockWriteGuard<'_, Vec<View>> {
        self.views.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// render
impl RenderTarget {
    /// 渲染并提交一帧
    ///
    /// 返回 `false` 表示这一帧被跳过。上一次使用同一个 slot 时引用的资源会被移动到 `previous`
    ///
    /// 没有注册任何视图时直接返回 `true`，不会 acquire、提交或者 present
    pub fn render(
        &mut self,
        passes: &RenderPasses,
        entities: &[RenderEntity],
        previous: &mut ResourcesCollection,
    ) -> anyhow::Result<bool> {
        let _span = tracy_client::span!("RenderTarget::render");

        let extent = self.organizer.swapchain().extent();
        let surface_extent = UVec2::new(extent.width, extent.height);
        let view_params = {
            let views = self.views.read().unwrap_or_else(PoisonError::into_inner);
            views
                .iter()
                .map(|view| ViewRenderingParameters::new(view, surface_extent, entities))
                .collect_vec()
        };
        // 没有视图时不 acquire，也就不会 present 一张没有写入过的 image
        if view_params.is_empty() {
            log::debug!("no view to render, skip acquire and present");
            return Ok(true);
        }
        let time = self.start_time.elapsed().as_secs_f32();
        let backend = self.backend.as_ref();

        let Some(PreparedFrame {
            image_index,
            views,
            view_command_buffers,
            ..
        }) = self.organizer.prepare_frame(&view_params, previous)?
        else {
            return Ok(false);
        };

        let framebuffer = self.framebuffers[image_index as usize];
        let inheritance = GfxCommandInheritance {
            render_pass: passes.surface,
            subpass: 0,
            framebuffer,
        };

        let num_views = view_params.len();
        let views = &mut views[..num_views];
        Self::record_views(backend, &inheritance, &view_params, views, time)?;

        // 每个视图一个 primary command buffer，在 render pass 内执行各线程录制的命令
        let primaries = view_command_buffers[..num_views].to_vec();
        for ((params, view), primary) in view_params.iter().zip(views.iter()).zip(&primaries) {
            let writer = GfxCommandWriter::begin_primary(backend, *primary)?;
            {
                let render_pass = GfxRenderPassScope::begin(
                    &writer,
                    &GfxRenderPassBegin {
                        render_pass: passes.surface,
                        framebuffer,
                        render_area: params.rect.to_vk_rect(),
                        clear_values: passes.clear_values.clone(),
                    },
                );
                let secondaries = view.threads()[..params.thread_count()]
                    .iter()
                    .map(ThreadResources::command_buffer)
                    .collect_vec();
                render_pass.writer().execute_commands(&secondaries);
            }
            writer.end()?;
        }

        self.organizer.submit(&primaries)?;
        Ok(true)
    }

    /// 每个视图按线程切分实体，并行录制 secondary command buffer
    ///
    /// 所有线程结束之后再检查错误
    fn record_views(
        backend: &dyn GfxBackend,
        inheritance: &GfxCommandInheritance,
        view_params: &[ViewRenderingParameters],
        views: &mut [ViewResources],
        time: f32,
    ) -> anyhow::Result<()> {
        let _span = tracy_client::span!("RenderTarget::record_views");

        let mut recordings = Vec::new();
        let mut globals = Vec::with_capacity(views.len());
        for (params, view) in view_params.iter().zip(views.iter_mut()) {
            let view_projection = params.camera.view_projection();
            let ViewRecordingParts { uniforms, threads } = view.recording_parts();
            let descriptor_sets = uniforms.descriptor_sets();
            let (global, object) = uniforms.split_mut();

            let slices = thread_slices(params.entities.len(), params.thread_count()).collect_vec();
            let writers = object.partition(&slices).context("切分 object uniforms 失败")?;
            globals.push((global, GlobalUniforms::new(view_projection, time)));

            // 每个线程只使用自己 pool 中的 command buffer
            for ((slice, writer), resources) in slices.into_iter().zip(writers).zip(threads.iter_mut()) {
                recordings.push(ThreadRecording {
                    command_buffer: resources.command_buffer(),
                    rect: params.rect,
                    view_projection,
                    descriptor_sets,
                    entities: &params.entities[slice.clone()],
                    first_index: slice.start,
                    uniforms: writer,
                    resources,
                    result: Ok(()),
                });
            }
        }

        let mut global_result = Ok(());
        rayon::scope(|scope| {
            for recording in recordings.iter_mut() {
                scope.spawn(move |_| recording.result = recording.record(backend, inheritance));
            }
            for (global, value) in globals.iter_mut() {
                if let Err(e) = global.write(value, 0) {
                    global_result = Err(e);
                }
            }
        });

        global_result.context("写入 global uniforms 失败")?;
        for recording in recordings {
            recording.result.context("录制视图命令失败")?;
        }
        Ok(())
    }

    /// 等待 GPU 空闲，之后所有已经提交的渲染操作都视为完成
    #[inline]
    pub fn wait_idle(&mut self) -> anyhow::Result<()> {
        self.organizer.wait_idle()
    }

    /// swapchain 重建之后调用，所有 frame slot 都会被重新创建
    pub fn recreate(&mut self, swapchain: GfxSwapchain, framebuffers: Vec<vk::Framebuffer>) -> anyhow::Result<()> {
        Self::check_framebuffers(&swapchain, &framebuffers)?;
        self.organizer.wait_idle()?;

        self.organizer = FrameOrganizer::new(self.backend.clone(), self.queues, swapchain, &self.layouts, &self.settings)?;
        self.framebuffers = framebuffers;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;
    use ember_gfx::foundation::mock_backend::{GfxMockBackend, GfxMockEvent};
    use glam::IVec2;

    use super::*;
    use crate::{
        render_key::RenderKey,
        settings::Buffering,
        testing::{
            make_entities, make_framebuffers, make_mesh, make_pipeline, make_queues, make_settings, make_swapchain,
        },
        view::{view_camera::ViewCamera, view_rect::FixedViewRectCalculator},
    };

    fn make_render_target(image_count: u32, buffering: Buffering) -> (Arc<GfxMockBackend>, RenderTarget) {
        let mock = Arc::new(GfxMockBackend::new(image_count));
        let layouts = Arc::new(UniformLayouts::new(mock.clone()).unwrap());
        let target = RenderTarget::new(
            mock.clone(),
            make_queues(),
            make_swapchain(image_count as usize),
            make_framebuffers(image_count as usize),
            layouts,
            make_settings(buffering),
        )
        .unwrap();
        (mock, target)
    }

    fn make_passes() -> RenderPasses {
        RenderPasses {
            surface: vk::RenderPass::from_raw(0x400),
            clear_values: vec![vk::ClearValue::default()],
        }
    }

    fn count(events: &[GfxMockEvent], pred: impl Fn(&GfxMockEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    #[test]
    fn test_render_with_growing_object_counts() {
        let (mock, mut target) = make_render_target(3, Buffering::Double);
        let pipeline = Arc::new(make_pipeline(&mock, "pipeline"));
        let mesh = Arc::new(make_mesh(&mock, "mesh"));
        target.add_view(View::new("main").with_threads(4));
        let passes = make_passes();

        for (frame, n) in [0, 1, 512].into_iter().enumerate() {
            let entities = make_entities(n, &pipeline, &mesh);
            mock.clear_events();

            let mut previous = ResourcesCollection::default();
            assert!(target.render(&passes, &entities, &mut previous).unwrap());
            assert_eq!(target.organizer().current_frame_index(), (frame + 1) % 2);

            let events = mock.events();
            assert_eq!(count(&events, |e| matches!(e, GfxMockEvent::DrawIndexed { .. })), n);
            assert!(events.iter().any(|e| matches!(
                e,
                GfxMockEvent::ExecuteCommands { secondary_command_buffers, .. } if secondary_command_buffers.len() == 4
            )));
            assert!(events.iter().any(|e| matches!(
                e,
                GfxMockEvent::Submit { command_buffers, .. } if command_buffers.len() == 1
            )));
            assert_eq!(count(&events, |e| matches!(e, GfxMockEvent::Present { .. })), 1);

            // 同一个视图的 secondary command buffer 来自不同的 command pool
            for event in &events {
                if let GfxMockEvent::ExecuteCommands {
                    secondary_command_buffers,
                    ..
                } = event
                {
                    let pools = secondary_command_buffers
                        .iter()
                        .map(|cmd| mock.command_buffer_pool(*cmd).unwrap())
                        .unique()
                        .count();
                    assert_eq!(pools, secondary_command_buffers.len());
                }
            }
        }
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());
    }

    #[test]
    fn test_object_uniforms_follow_entity_order() {
        let (mock, mut target) = make_render_target(3, Buffering::Double);
        let pipeline = Arc::new(make_pipeline(&mock, "pipeline"));
        let mesh = Arc::new(make_mesh(&mock, "mesh"));
        let entities = make_entities(10, &pipeline, &mesh);
        target.add_view(View::new("main").with_threads(3));

        mock.clear_events();
        let mut previous = ResourcesCollection::default();
        assert!(target.render(&make_passes(), &entities, &mut previous).unwrap());

        let view_projection = ViewCamera::default().view_projection();
        let view = &target.organizer().frame(0).unwrap().views()[0];
        let bytes = view.uniforms().object().buffer().mapped_bytes().unwrap();
        for (i, entity) in entities.iter().enumerate() {
            let expected = ObjectUniforms::new(view_projection * entity.transform);
            let stride = size_of::<ObjectUniforms>();
            assert_eq!(&bytes[i * stride..(i + 1) * stride], bytemuck::bytes_of(&expected), "object {i}");
        }

        let global = bytemuck::pod_read_unaligned::<GlobalUniforms>(
            &view.uniforms().global().buffer().mapped_bytes().unwrap()[..size_of::<GlobalUniforms>()],
        );
        assert_eq!(global.view_projection, view_projection);

        let mut offsets = mock
            .events()
            .into_iter()
            .filter_map(|e| match e {
                GfxMockEvent::BindDescriptorSets { dynamic_offsets, .. } => Some(dynamic_offsets),
                _ => None,
            })
            .flatten()
            .collect_vec();
        offsets.sort_unstable();
        assert_eq!(offsets, (0..10).map(|i| i * 256).collect_vec());
    }

    #[test]
    fn test_multiple_views() {
        let (mock, mut target) = make_render_target(3, Buffering::Triple);
        let pipeline = Arc::new(make_pipeline(&mock, "pipeline"));
        let mesh = Arc::new(make_mesh(&mock, "mesh"));
        let mut entities = make_entities(10, &pipeline, &mesh);
        entities.push(RenderEntity {
            transform: Mat4::IDENTITY,
            renderer: None,
        });
        entities.push(RenderEntity {
            transform: Mat4::IDENTITY,
            renderer: Some(MeshRenderer {
                material: None,
                mesh: Some(mesh.clone()),
            }),
        });

        target.add_view(View::new("main"));
        target.add_view(View::new("minimap").with_threads(3).with_rect(FixedViewRectCalculator {
            offset: IVec2::new(600, 400),
            extent: UVec2::new(200, 200),
        }));

        mock.clear_events();
        let mut previous = ResourcesCollection::default();
        assert!(target.render(&make_passes(), &entities, &mut previous).unwrap());

        let events = mock.events();
        assert_eq!(count(&events, |e| matches!(e, GfxMockEvent::DrawIndexed { .. })), 20);
        assert_eq!(count(&events, |e| matches!(e, GfxMockEvent::BeginRenderPass { .. })), 2);
        assert!(events.iter().any(|e| matches!(
            e,
            GfxMockEvent::Submit { command_buffers, .. } if command_buffers.len() == 2
        )));
        // renderer 为空的实体不参与，缺少材质的实体占用 uniform 但不绘制
        let view = &target.organizer().frame(0).unwrap().views()[1];
        assert_eq!(view.uniforms().object().num_elements(), 512);
        assert_eq!(view.threads().iter().map(|thread| thread.resources().len()).sum::<usize>(), 20);
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());

        target.views_mut()[0].num_threads = 2;
        assert!(target.remove_view("minimap").is_some());
        assert!(target.remove_view("minimap").is_none());
        assert_eq!(target.view_count(), 1);
    }

    #[test]
    fn test_stalled_gpu_never_resets_in_flight_pools() {
        let (mock, mut target) = make_render_target(3, Buffering::Double);
        let pipeline = Arc::new(make_pipeline(&mock, "pipeline"));
        let mesh = Arc::new(make_mesh(&mock, "mesh"));
        let entities = make_entities(64, &pipeline, &mesh);
        target.add_view(View::new("main").with_threads(2));
        let passes = make_passes();
        let mut previous = ResourcesCollection::default();

        mock.set_gpu_stalled(true);
        assert!(target.render(&passes, &entities, &mut previous).unwrap());
        assert!(target.render(&passes, &entities, &mut previous).unwrap());
        for _ in 0..3 {
            assert!(!target.render(&passes, &entities, &mut previous).unwrap());
        }
        assert!(previous.is_empty());
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());

        mock.set_gpu_stalled(false);
        mock.complete_pending();
        assert!(target.render(&passes, &entities, &mut previous).unwrap());
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());
    }

    #[test]
    fn test_no_views_skips_acquire_and_present() {
        let (mock, mut target) = make_render_target(3, Buffering::Double);
        let pipeline = Arc::new(make_pipeline(&mock, "pipeline"));
        let mesh = Arc::new(make_mesh(&mock, "mesh"));
        let entities = make_entities(4, &pipeline, &mesh);
        let passes = make_passes();

        mock.clear_events();
        let mut previous = ResourcesCollection::default();
        assert!(target.render(&passes, &entities, &mut previous).unwrap());

        let events = mock.events();
        assert!(!events.iter().any(|e| matches!(
            e,
            GfxMockEvent::Acquire(_) | GfxMockEvent::Submit { .. } | GfxMockEvent::Present { .. }
        )));
        assert_eq!(target.organizer().current_frame_index(), 0);
        assert!(previous.is_empty());

        // 添加视图之后恢复正常渲染
        target.add_view(View::new("main"));
        mock.clear_events();
        assert!(target.render(&passes, &entities, &mut previous).unwrap());
        assert_eq!(count(&mock.events(), |e| matches!(e, GfxMockEvent::Present { .. })), 1);
        assert_eq!(target.organizer().current_frame_index(), 1);
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());
    }

    #[test]
    fn test_reused_slot_hands_over_resources() {
        let (mock, mut target) = make_render_target(3, Buffering::Double);
        let pipeline = Arc::new(make_pipeline(&mock, "pipeline"));
        let mesh = Arc::new(make_mesh(&mock, "mesh"));
        let entities = make_entities(5, &pipeline, &mesh);
        target.add_view(View::new("main"));
        let passes = make_passes();

        let mut previous = ResourcesCollection::default();
        target.render(&passes, &entities, &mut previous).unwrap();
        target.render(&passes, &entities, &mut previous).unwrap();
        assert!(previous.is_empty());

        target.render(&passes, &entities, &mut previous).unwrap();
        assert_eq!(previous.pipelines().len(), 5);
        assert_eq!(previous.meshes().len(), 5);
        assert_eq!(target.organizer().last_retired_key(), RenderKey::INITIAL);
    }

    #[test]
    fn test_recreate() {
        let (mock, mut target) = make_render_target(3, Buffering::Double);
        target.add_view(View::new("main"));
        let mut previous = ResourcesCollection::default();
        target.render(&make_passes(), &[], &mut previous).unwrap();

        assert!(target.recreate(make_swapchain(2), make_framebuffers(3)).is_err());

        mock.clear_events();
        target.recreate(make_swapchain(2), make_framebuffers(2)).unwrap();
        assert!(mock.events().contains(&GfxMockEvent::DeviceWaitIdle));
        assert_eq!(target.organizer().current_frame_index(), 0);
        assert_eq!(target.organizer().image_fences().len(), 2);
        assert_eq!(target.framebuffers().len(), 2);
        assert_eq!(target.view_count(), 1);
        assert!(mock.violations().is_empty(), "{:?}", mock.violations());
    }
}
