use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_gfx::resources::uniforms::GfxUniformBlock;
use glam::{Mat4, Vec4};

/// 每个视图共享的数据
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GlobalUniforms {
    pub view_projection: Mat4,
    pub view_projection_inverse: Mat4,
    pub time: f32,
    _padding: [f32; 3],
}

impl GlobalUniforms {
    pub fn new(view_projection: Mat4, time: f32) -> Self {
        Self {
            view_projection,
            view_projection_inverse: view_projection.inverse(),
            time,
            _padding: [0.0; 3],
        }
    }
}

impl GfxUniformBlock for GlobalUniforms {
    const BINDING: u32 = 0;
    const DESCRIPTOR_TYPE: vk::DescriptorType = vk::DescriptorType::UNIFORM_BUFFER;
}

/// 每个物体的数据，通过 dynamic offset 访问
///
/// 填充到 256 字节，满足所有设备的 `minUniformBufferOffsetAlignment`
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub model_view_projection: Mat4,
    _padding: [Vec4; 12],
}

impl ObjectUniforms {
    pub fn new(model_view_projection: Mat4) -> Self {
        Self {
            model_view_projection,
            _padding: [Vec4::ZERO; 12],
        }
    }
}

impl GfxUniformBlock for ObjectUniforms {
    const BINDING: u32 = 0;
    const DESCRIPTOR_TYPE: vk::DescriptorType = vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC;
}

const _: () = assert!(size_of::<GlobalUniforms>() % 16 == 0);
const _: () = assert!(size_of::<ObjectUniforms>() == 256);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_inverse() {
        let view_projection = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let global = GlobalUniforms::new(view_projection, 0.5);
        assert!((global.view_projection * global.view_projection_inverse).abs_diff_eq(Mat4::IDENTITY, 1e-6));
        assert_eq!(global.time, 0.5);
    }
}
