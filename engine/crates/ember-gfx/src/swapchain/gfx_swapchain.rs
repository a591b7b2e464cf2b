use std::time::Duration;

use ash::vk;

use crate::{
    commands::{fence::duration_to_ns, semaphore::GfxSemaphore},
    foundation::backend::GfxBackend,
    gfx_error::GfxResult,
};

/// acquire next image 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxAcquireResult {
    Acquired { image_index: u32, suboptimal: bool },
    /// 在超时时间内没有可用的 image
    Timeout,
    /// swapchain 已经和 surface 不匹配，需要重建
    OutOfDate,
}

/// present 的结果，硬错误通过 `Err` 返回
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxPresentResult {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl GfxPresentResult {
    #[inline]
    pub fn need_recreate(self) -> bool {
        self != Self::Presented
    }
}

/// swapchain 的描述，不拥有 swapchain
///
/// swapchain 的创建和重建由外部的 surface 层负责，这里只记录帧组织需要的信息
#[derive(Debug, Clone, Copy)]
pub struct GfxSwapchain {
    handle: vk::SwapchainKHR,
    image_count: usize,
    extent: vk::Extent2D,
    format: vk::Format,
}

// new & init
impl GfxSwapchain {
    #[inline]
    pub fn new(handle: vk::SwapchainKHR, image_count: usize, extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            handle,
            image_count,
            extent,
            format,
        }
    }
}

// getters
impl GfxSwapchain {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.image_count
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

// tools
impl GfxSwapchain {
    /// 获取下一张可用的 image，image 可用时 signal `semaphore`
    pub fn acquire_next_image(
        &self,
        backend: &dyn GfxBackend,
        semaphore: &GfxSemaphore,
        timeout: Duration,
    ) -> GfxResult<GfxAcquireResult> {
        let _span = tracy_client::span!("GfxSwapchain::acquire_next_image");
        let result = backend.acquire_next_image(self.handle, duration_to_ns(timeout), semaphore.handle())?;
        match result {
            GfxAcquireResult::Acquired {
                image_index,
                suboptimal: true,
            } => {
                log::warn!("swapchain acquire image index {} is not optimal", image_index);
            }
            GfxAcquireResult::OutOfDate => {
                log::warn!("swapchain is out of date when acquire next image");
            }
            _ => {}
        }
        Ok(result)
    }
}
