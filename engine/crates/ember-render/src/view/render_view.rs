use std::sync::Arc;

use glam::{Mat4, UVec2};

use crate::{
    resources::render_objects::{GraphicsPipelineResources, MeshResources},
    view::{
        view_camera::{ViewCamera, ViewCameraCalculator},
        view_rect::{ViewRect, ViewRectCalculator},
    },
};

/// 绘制一个物体需要的资源，任意一个缺失时该物体会被跳过
#[derive(Clone, Default)]
pub struct MeshRenderer {
    pub material: Option<Arc<GraphicsPipelineResources>>,
    pub mesh: Option<Arc<MeshResources>>,
}

/// 场景中的一个实体，只有带有 renderer 的实体才会被渲染
#[derive(Clone)]
pub struct RenderEntity {
    pub transform: Mat4,
    pub renderer: Option<MeshRenderer>,
}

impl RenderEntity {
    #[inline]
    pub fn is_renderable(&self) -> bool {
        self.renderer.is_some()
    }
}

/// 视图：surface 中的一块区域，以及在这块区域中渲染什么
pub struct View {
    pub id: String,
    /// 录制这个视图的命令时使用的线程数，物体较多时应当使用更多的线程
    pub num_threads: u16,

    pub rect_calculator: Option<Box<dyn ViewRectCalculator>>,
    pub camera_calculator: Option<Box<dyn ViewCameraCalculator>>,
}

impl View {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            num_threads: 1,
            rect_calculator: None,
            camera_calculator: None,
        }
    }

    #[inline]
    pub fn with_threads(mut self, num_threads: u16) -> Self {
        self.num_threads = num_threads;
        self
    }

    #[inline]
    pub fn with_rect(mut self, calculator: impl ViewRectCalculator + 'static) -> Self {
        self.rect_calculator = Some(Box::new(calculator));
        self
    }

    #[inline]
    pub fn with_camera(mut self, calculator: impl ViewCameraCalculator + 'static) -> Self {
        self.camera_calculator = Some(Box::new(calculator));
        self
    }
}

/// 每一帧为视图收集的渲染参数
pub struct ViewRenderingParameters<'a> {
    pub rect: ViewRect,
    pub camera: ViewCamera,
    pub num_threads: usize,
    /// 需要渲染的实体
    pub entities: Vec<&'a RenderEntity>,
}

impl<'a> ViewRenderingParameters<'a> {
    pub fn new(view: &View, surface_extent: UVec2, entities: &'a [RenderEntity]) -> Self {
        let rect = view
            .rect_calculator
            .as_ref()
            .map_or_else(|| ViewRect::full(surface_extent), |calculator| calculator.calculate(surface_extent));
        let camera = view
            .camera_calculator
            .as_ref()
            .map_or_else(ViewCamera::default, |calculator| calculator.calculate(entities, rect.extent));

        Self {
            rect,
            camera,
            num_threads: usize::from(view.num_threads),
            entities: entities.iter().filter(|entity| entity.is_renderable()).collect(),
        }
    }

    /// 实际使用的线程数，至少为 1
    #[inline]
    pub fn thread_count(&self) -> usize {
        self.num_threads.max(1)
    }
}

#[cfg(test)]
mod tests {
    use glam::IVec2;

    use super::*;
    use crate::view::{view_camera::FixedViewCameraCalculator, view_rect::FixedViewRectCalculator};

    #[test]
    fn test_parameters_filter_renderables() {
        let entities = vec![
            RenderEntity {
                transform: Mat4::IDENTITY,
                renderer: Some(MeshRenderer::default()),
            },
            RenderEntity {
                transform: Mat4::IDENTITY,
                renderer: None,
            },
        ];
        let view = View::new("main").with_threads(0);
        let params = ViewRenderingParameters::new(&view, UVec2::new(640, 480), &entities);

        assert_eq!(params.rect, ViewRect::full(UVec2::new(640, 480)));
        assert_eq!(params.camera, ViewCamera::default());
        assert_eq!(params.entities.len(), 1);
        assert_eq!(params.thread_count(), 1);
    }

    #[test]
    fn test_parameters_use_calculators() {
        let view = View::new("inset")
            .with_rect(FixedViewRectCalculator {
                offset: IVec2::new(0, 0),
                extent: UVec2::new(200, 100),
            })
            .with_camera(FixedViewCameraCalculator::default());
        let params = ViewRenderingParameters::new(&view, UVec2::new(640, 480), &[]);

        assert_eq!(params.rect.extent, UVec2::new(200, 100));
        assert_eq!(params.camera.aspect, 2.0);
    }
}
