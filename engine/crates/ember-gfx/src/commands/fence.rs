use std::{sync::Arc, time::Duration};

use ash::vk;

use crate::{foundation::backend::GfxBackend, gfx_error::GfxResult};

/// drop 时等待 fence 的最长时间
const DROP_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// GPU -> CPU 的同步原语
///
/// drop 时会先等待 fence（最多 [`DROP_WAIT_TIMEOUT`]），保证 GPU 不再使用它之后再销毁
pub struct GfxFence {
    fence: vk::Fence,
    backend: Arc<dyn GfxBackend>,
}

// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(backend: Arc<dyn GfxBackend>, signaled: bool, debug_name: &str) -> GfxResult<Self> {
        let fence = backend.create_fence(signaled, debug_name)?;
        Ok(Self { fence, backend })
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence
    ///
    /// 返回 `Ok(false)` 表示在 `timeout` 内没有被 signal
    #[inline]
    pub fn wait(&self, timeout: Duration) -> GfxResult<bool> {
        let _span = tracy_client::span!("GfxFence::wait");
        self.backend.wait_for_fence(self.fence, duration_to_ns(timeout))
    }

    #[inline]
    pub fn is_signalled(&self) -> GfxResult<bool> {
        self.backend.fence_status(self.fence)
    }

    #[inline]
    pub fn reset(&self) -> GfxResult<()> {
        self.backend.reset_fence(self.fence)
    }
}

impl Drop for GfxFence {
    fn drop(&mut self) {
        match self.backend.wait_for_fence(self.fence, duration_to_ns(DROP_WAIT_TIMEOUT)) {
            Ok(true) => {}
            Ok(false) => log::warn!("Timed out waiting for fence {:?} before destroying it", self.fence),
            Err(e) => log::error!("Failed to wait for fence {:?} before destroying it: {}", self.fence, e),
        }
        self.backend.destroy_fence(self.fence);
    }
}

#[inline]
pub fn duration_to_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::mock_backend::{GfxMockBackend, GfxObjectKind};

    #[test]
    fn test_signaled_on_create() {
        let mock = Arc::new(GfxMockBackend::new(2));
        let signaled = GfxFence::new(mock.clone(), true, "signaled").unwrap();
        let unsignaled = GfxFence::new(mock.clone(), false, "unsignaled").unwrap();

        assert!(signaled.is_signalled().unwrap());
        assert!(!unsignaled.is_signalled().unwrap());
        assert!(signaled.wait(Duration::from_millis(1)).unwrap());
    }

    #[test]
    fn test_wait_times_out_when_never_signalled() {
        let mock = Arc::new(GfxMockBackend::new(2));
        let fence = GfxFence::new(mock.clone(), true, "fence").unwrap();
        fence.reset().unwrap();

        assert!(!fence.wait(Duration::from_millis(1)).unwrap());
    }

    #[test]
    fn test_drop_destroys() {
        let mock = Arc::new(GfxMockBackend::new(2));
        drop(GfxFence::new(mock.clone(), true, "fence").unwrap());
        assert_eq!(mock.live_count(GfxObjectKind::Fence), 0);
    }

    #[test]
    fn test_duration_to_ns_saturates() {
        assert_eq!(duration_to_ns(Duration::from_secs(5)), 5_000_000_000);
        assert_eq!(duration_to_ns(Duration::MAX), u64::MAX);
    }
}
