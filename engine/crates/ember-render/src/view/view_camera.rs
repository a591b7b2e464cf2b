use glam::{Mat4, UVec2};

use crate::view::render_view::RenderEntity;

/// 近、远裁剪面到相机的距离
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPlanes {
    pub near: f32,
    pub far: f32,
}

impl Default for ClipPlanes {
    fn default() -> Self {
        Self {
            near: 0.01,
            far: 10000.0,
        }
    }
}

/// 计算 view-projection 矩阵需要的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewCamera {
    /// 相机的 view 矩阵
    pub transform: Mat4,
    /// 垂直方向的视场角，单位是角度
    pub fov: f32,
    pub aspect: f32,
    pub clip: ClipPlanes,
}

impl Default for ViewCamera {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            fov: 90.0,
            aspect: 1.0,
            clip: ClipPlanes::default(),
        }
    }
}

impl ViewCamera {
    /// 右手系透视投影，Vulkan 的 Y 轴和 OpenGL 相反，因此翻转 Y
    pub fn projection(&self) -> Mat4 {
        let mut projection = Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.clip.near, self.clip.far);
        projection.y_axis.y *= -1.0;
        projection
    }

    #[inline]
    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.transform
    }
}

/// 每帧为视图计算相机参数
pub trait ViewCameraCalculator: Send + Sync {
    fn calculate(&self, entities: &[RenderEntity], draw_size: UVec2) -> ViewCamera;
}

/// 固定的相机，aspect 跟随绘制区域的大小
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedViewCameraCalculator {
    pub camera: ViewCamera,
}

impl ViewCameraCalculator for FixedViewCameraCalculator {
    fn calculate(&self, _entities: &[RenderEntity], draw_size: UVec2) -> ViewCamera {
        let mut camera = self.camera;
        if draw_size.x > 0 && draw_size.y > 0 {
            camera.aspect = draw_size.x as f32 / draw_size.y as f32;
        }
        camera
    }
}
