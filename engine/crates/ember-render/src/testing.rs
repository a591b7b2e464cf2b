//! 测试共用的构造函数，以及按线程收集 warning 的 logger

use std::{
    cell::RefCell,
    sync::{Arc, Once, OnceLock},
};

use ash::vk::{self, Handle};
use ember_gfx::{
    commands::command_queue::{GfxGraphicsQueue, GfxPresentQueue, GfxQueueFamily, GfxSurfaceQueues},
    foundation::mock_backend::GfxMockBackend,
    resources::buffer::GfxBuffer,
    swapchain::gfx_swapchain::GfxSwapchain,
};
use glam::{Mat4, Vec3};

use crate::{
    frame::{frame_organizer::FrameOrganizer, uniform_layouts::UniformLayouts, view_resources::FrameCreateInfo},
    resources::render_objects::{GraphicsPipelineResources, MeshResources},
    settings::{Buffering, RendererSettings},
    view::render_view::{MeshRenderer, RenderEntity},
};

pub(crate) const SURFACE_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};

pub(crate) fn make_pipeline(mock: &Arc<GfxMockBackend>, name: &str) -> GraphicsPipelineResources {
    GraphicsPipelineResources::new(mock.clone(), mock.create_pipeline(), mock.create_pipeline_layout(), vec![], name)
}

pub(crate) fn make_mesh(mock: &Arc<GfxMockBackend>, name: &str) -> MeshResources {
    let buffer = GfxBuffer::new(
        mock.clone(),
        256,
        vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER,
        false,
        name,
    )
    .unwrap();
    MeshResources::new(buffer, 0, 128, 8, 36, vk::IndexType::UINT16)
}

/// `n` 个共享同一个材质和网格的实体，第 i 个实体平移到 (i, 0, 0)
pub(crate) fn make_entities(
    n: usize,
    pipeline: &Arc<GraphicsPipelineResources>,
    mesh: &Arc<MeshResources>,
) -> Vec<RenderEntity> {
    (0..n)
        .map(|i| RenderEntity {
            transform: Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)),
            renderer: Some(MeshRenderer {
                material: Some(pipeline.clone()),
                mesh: Some(mesh.clone()),
            }),
        })
        .collect()
}

pub(crate) fn make_queues() -> GfxSurfaceQueues {
    let family = GfxQueueFamily {
        name: "graphics".to_string(),
        queue_family_index: 0,
        queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        queue_count: 1,
    };
    let queue = vk::Queue::from_raw(0x100);
    GfxSurfaceQueues {
        graphics: GfxGraphicsQueue::from_family(queue, &family, 0).unwrap(),
        present: GfxPresentQueue::from_family(queue, &family, 0).unwrap(),
        transfer: None,
        compute: None,
    }
}

pub(crate) fn make_swapchain(image_count: usize) -> GfxSwapchain {
    GfxSwapchain::new(
        vk::SwapchainKHR::from_raw(0x200),
        image_count,
        SURFACE_EXTENT,
        vk::Format::B8G8R8A8_SRGB,
    )
}

pub(crate) fn make_framebuffers(image_count: usize) -> Vec<vk::Framebuffer> {
    (0..image_count).map(|i| vk::Framebuffer::from_raw(0x300 + i as u64)).collect()
}

pub(crate) fn make_create_info(image_count: u32) -> (Arc<GfxMockBackend>, FrameCreateInfo, UniformLayouts) {
    let mock = Arc::new(GfxMockBackend::new(image_count));
    let layouts = UniformLayouts::new(mock.clone()).unwrap();
    let info = FrameCreateInfo {
        backend: mock.clone(),
        queue_family_index: 0,
        global_layout: layouts.global(),
        object_layout: layouts.object(),
    };
    (mock, info, layouts)
}

pub(crate) fn make_settings(buffering: Buffering) -> RendererSettings {
    RendererSettings {
        buffering,
        ..Default::default()
    }
}

pub(crate) fn make_organizer(
    image_count: u32,
    buffering: Buffering,
) -> (Arc<GfxMockBackend>, UniformLayouts, FrameOrganizer) {
    let mock = Arc::new(GfxMockBackend::new(image_count));
    let layouts = UniformLayouts::new(mock.clone()).unwrap();
    let organizer = FrameOrganizer::new(
        mock.clone(),
        make_queues(),
        make_swapchain(image_count as usize),
        &layouts,
        &make_settings(buffering),
    )
    .unwrap();
    (mock, layouts, organizer)
}

// region warning capture
thread_local! {
    static CAPTURED_WARNINGS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// 记录当前线程的 warning，其余照常交给 env_logger 输出
struct CaptureLogger {
    inner: env_logger::Logger,
}

impl log::Log for CaptureLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() == log::Level::Warn || self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if record.level() == log::Level::Warn {
            CAPTURED_WARNINGS.with(|warnings| warnings.borrow_mut().push(record.args().to_string()));
        }
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

fn install_capture_logger() {
    static LOGGER: OnceLock<CaptureLogger> = OnceLock::new();
    static INSTALL: Once = Once::new();

    INSTALL.call_once(|| {
        let logger = LOGGER.get_or_init(|| CaptureLogger {
            inner: ember_crate_tools::init_log::log_builder(log::LevelFilter::Info).build(),
        });
        if log::set_logger(logger).is_ok() {
            log::set_max_level(log::LevelFilter::Info);
        }
    });
}

/// 执行 `f`，返回期间当前线程输出的所有 warning
pub(crate) fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, Vec<String>) {
    install_capture_logger();
    CAPTURED_WARNINGS.with(|warnings| warnings.borrow_mut().clear());
    let result = f();
    let warnings = CAPTURED_WARNINGS.with(|warnings| std::mem::take(&mut *warnings.borrow_mut()));
    (result, warnings)
}
// endregion
