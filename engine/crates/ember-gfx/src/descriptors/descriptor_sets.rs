use std::ops::Index;

use ash::vk;

use crate::{
    descriptors::descriptor_pool::GfxDescriptorPool,
    gfx_error::{GfxError, GfxResult},
};

/// 一次性从 pool 中分配的 N 个描述符集
///
/// # Destroy
///
/// 跟随 descriptor pool 一起销毁
#[derive(Debug, Clone, Copy)]
pub struct GfxDescriptorSets<const N: usize> {
    handles: [vk::DescriptorSet; N],
}

impl<const N: usize> GfxDescriptorSets<N> {
    /// 要么 N 个全部分配成功，要么返回错误
    pub fn new(pool: &GfxDescriptorPool, layouts: [vk::DescriptorSetLayout; N]) -> GfxResult<Self> {
        let sets = pool.backend().allocate_descriptor_sets(pool.handle(), &layouts)?;
        let len = sets.len();
        let handles: [vk::DescriptorSet; N] = sets.try_into().map_err(|_| {
            GfxError::InvalidArgument(format!("expected {} descriptor sets, got {}", N, len))
        })?;
        Ok(Self { handles })
    }

    #[inline]
    pub fn handles(&self) -> &[vk::DescriptorSet; N] {
        &self.handles
    }
}

impl<const N: usize> Index<usize> for GfxDescriptorSets<N> {
    type Output = vk::DescriptorSet;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.handles[index]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ash::vk::Handle;

    use super::*;
    use crate::foundation::mock_backend::{GfxMockBackend, GfxObjectKind};

    #[test]
    fn test_sets_follow_pool() {
        let mock = Arc::new(GfxMockBackend::new(2));
        {
            let pool = GfxDescriptorPool::new(
                mock.clone(),
                &[vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: 1,
                }],
                2,
                "test-pool",
            )
            .unwrap();
            let sets = GfxDescriptorSets::new(
                &pool,
                [vk::DescriptorSetLayout::from_raw(100), vk::DescriptorSetLayout::from_raw(101)],
            )
            .unwrap();

            assert_eq!(mock.live_count(GfxObjectKind::DescriptorSet), 2);
            assert_ne!(sets[0], sets[1]);
        }
        assert_eq!(mock.live_count(GfxObjectKind::DescriptorSet), 0);
        assert_eq!(mock.live_count(GfxObjectKind::DescriptorPool), 0);
    }
}
