use glam::{IVec2, UVec2, Vec2};

/// 视图在 surface 中的绘制区域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewRect {
    pub offset: IVec2,
    pub extent: UVec2,
}

impl ViewRect {
    #[inline]
    pub fn full(extent: UVec2) -> Self {
        Self {
            offset: IVec2::ZERO,
            extent,
        }
    }

    #[inline]
    pub fn to_vk_rect(&self) -> ash::vk::Rect2D {
        ash::vk::Rect2D {
            offset: ash::vk::Offset2D {
                x: self.offset.x,
                y: self.offset.y,
            },
            extent: ash::vk::Extent2D {
                width: self.extent.x,
                height: self.extent.y,
            },
        }
    }

    #[inline]
    pub fn to_vk_viewport(&self) -> ash::vk::Viewport {
        ash::vk::Viewport {
            x: self.offset.x as f32,
            y: self.offset.y as f32,
            width: self.extent.x as f32,
            height: self.extent.y as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// 根据 surface 的大小计算视图的绘制区域
pub trait ViewRectCalculator: Send + Sync {
    fn calculate(&self, surface_extent: UVec2) -> ViewRect;
}

/// 占满整个 surface
#[derive(Debug, Clone, Copy, Default)]
pub struct FullViewRectCalculator;

impl ViewRectCalculator for FullViewRectCalculator {
    fn calculate(&self, surface_extent: UVec2) -> ViewRect {
        ViewRect::full(surface_extent)
    }
}

/// 固定的像素区域，超出 surface 的部分会被裁掉
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedViewRectCalculator {
    pub offset: IVec2,
    pub extent: UVec2,
}

impl ViewRectCalculator for FixedViewRectCalculator {
    fn calculate(&self, surface_extent: UVec2) -> ViewRect {
        let clamp_axis = |offset: i32, extent: u32, surface: u32| {
            let min = i64::from(offset).clamp(0, i64::from(surface));
            let max = (i64::from(offset) + i64::from(extent)).clamp(min, i64::from(surface));
            (min as i32, (max - min) as u32)
        };
        let (x, width) = clamp_axis(self.offset.x, self.extent.x, surface_extent.x);
        let (y, height) = clamp_axis(self.offset.y, self.extent.y, surface_extent.y);

        ViewRect {
            offset: IVec2::new(x, y),
            extent: UVec2::new(width, height),
        }
    }
}

/// 按照 surface 大小的比例计算
#[derive(Debug, Clone, Copy, Default)]
pub struct RelativeViewRectCalculator {
    pub relative_offset: Vec2,
    pub relative_extent: Vec2,
}

impl ViewRectCalculator for RelativeViewRectCalculator {
    fn calculate(&self, surface_extent: UVec2) -> ViewRect {
        let surface = surface_extent.as_vec2();
        ViewRect {
            offset: (self.relative_offset * surface).as_ivec2(),
            extent: (self.relative_extent * surface).as_uvec2(),
        }
    }
}
