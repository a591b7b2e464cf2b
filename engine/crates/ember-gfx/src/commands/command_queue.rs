use std::marker::PhantomData;

use ash::vk;

use crate::{
    commands::{fence::GfxFence, submit_info::GfxSubmitInfo},
    foundation::backend::GfxBackend,
    gfx_error::{GfxError, GfxResult},
    swapchain::gfx_swapchain::{GfxPresentResult, GfxSwapchain},
};

/// queue family 的元数据，由设备初始化阶段提供
#[derive(Debug, Clone)]
pub struct GfxQueueFamily {
    pub name: String,
    pub queue_family_index: u32,
    pub queue_flags: vk::QueueFlags,
    pub queue_count: u32,
}

/// queue 的用途标记
pub trait GfxQueueKind: Send + Sync + 'static {
    const NAME: &'static str;
    /// present 能力不体现在 queue flags 上，由 surface 查询决定
    const REQUIRED_FLAGS: vk::QueueFlags;
}

/// 可以提交 command buffer 的 queue
pub trait GfxSubmitQueueKind: GfxQueueKind {}

#[derive(Debug, Clone, Copy)]
pub struct GraphicsKind;
#[derive(Debug, Clone, Copy)]
pub struct PresentKind;
#[derive(Debug, Clone, Copy)]
pub struct TransferKind;
#[derive(Debug, Clone, Copy)]
pub struct ComputeKind;

impl GfxQueueKind for GraphicsKind {
    const NAME: &'static str = "graphics";
    const REQUIRED_FLAGS: vk::QueueFlags = vk::QueueFlags::GRAPHICS;
}
impl GfxQueueKind for PresentKind {
    const NAME: &'static str = "present";
    const REQUIRED_FLAGS: vk::QueueFlags = vk::QueueFlags::empty();
}
impl GfxQueueKind for TransferKind {
    const NAME: &'static str = "transfer";
    const REQUIRED_FLAGS: vk::QueueFlags = vk::QueueFlags::TRANSFER;
}
impl GfxQueueKind for ComputeKind {
    const NAME: &'static str = "compute";
    const REQUIRED_FLAGS: vk::QueueFlags = vk::QueueFlags::COMPUTE;
}
impl GfxSubmitQueueKind for GraphicsKind {}
impl GfxSubmitQueueKind for TransferKind {}
impl GfxSubmitQueueKind for ComputeKind {}

/// 不拥有资源的 queue handle，用类型区分用途
pub struct GfxQueue<K: GfxQueueKind> {
    handle: vk::Queue,
    queue_family_index: u32,
    _kind: PhantomData<K>,
}

pub type GfxGraphicsQueue = GfxQueue<GraphicsKind>;
pub type GfxPresentQueue = GfxQueue<PresentKind>;
pub type GfxTransferQueue = GfxQueue<TransferKind>;
pub type GfxComputeQueue = GfxQueue<ComputeKind>;

impl<K: GfxQueueKind> Clone for GfxQueue<K> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<K: GfxQueueKind> Copy for GfxQueue<K> {}

impl<K: GfxQueueKind> std::fmt::Debug for GfxQueue<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GfxQueue")
            .field("kind", &K::NAME)
            .field("handle", &self.handle)
            .field("queue_family_index", &self.queue_family_index)
            .finish()
    }
}

// new & init
impl<K: GfxQueueKind> GfxQueue<K> {
    #[inline]
    pub fn new(handle: vk::Queue, queue_family_index: u32) -> Self {
        Self {
            handle,
            queue_family_index,
            _kind: PhantomData,
        }
    }

    /// 从 queue family 中的第 `queue_index` 个 queue 构造，family 不支持该用途时返回错误
    pub fn from_family(handle: vk::Queue, family: &GfxQueueFamily, queue_index: u32) -> GfxResult<Self> {
        if queue_index >= family.queue_count {
            return Err(GfxError::OutOfRange {
                what: "queue index",
                index: queue_index as usize,
                len: family.queue_count as usize,
            });
        }
        if !family.queue_flags.contains(K::REQUIRED_FLAGS) {
            return Err(GfxError::InvalidArgument(format!(
                "queue family {} ({}) can not be used as {} queue",
                family.name,
                family.queue_family_index,
                K::NAME
            )));
        }
        Ok(Self::new(handle, family.queue_family_index))
    }
}

// getters
impl<K: GfxQueueKind> GfxQueue<K> {
    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    #[inline]
    pub fn wait_idle(&self, backend: &dyn GfxBackend) -> GfxResult<()> {
        backend.queue_wait_idle(self.handle)
    }
}

// submit
impl<K: GfxSubmitQueueKind> GfxQueue<K> {
    /// fence 会在这一批命令执行完成后被 signal
    pub fn submit(&self, backend: &dyn GfxBackend, submit_info: &GfxSubmitInfo, fence: Option<&GfxFence>) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxQueue::submit");
        backend.queue_submit(self.handle, submit_info, fence.map_or(vk::Fence::null(), |f| f.handle()))
    }

    /// 以独立的 slice 传入参数，wait semaphore 和 wait stage 的数量不一致时，不会调用 GPU
    pub fn submit_spans(
        &self,
        backend: &dyn GfxBackend,
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        command_buffers: &[vk::CommandBuffer],
        signal_semaphores: &[vk::Semaphore],
        fence: Option<&GfxFence>,
    ) -> GfxResult<()> {
        let submit_info = GfxSubmitInfo::from_spans(wait_semaphores, wait_stages, command_buffers, signal_semaphores)?;
        self.submit(backend, &submit_info, fence)
    }
}

// present
impl GfxQueue<PresentKind> {
    pub fn present(
        &self,
        backend: &dyn GfxBackend,
        swapchain: &GfxSwapchain,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> GfxResult<GfxPresentResult> {
        let _span = tracy_client::span!("GfxQueue::present");
        let result = backend.queue_present(self.handle, swapchain.handle(), image_index, wait_semaphores)?;
        match result {
            GfxPresentResult::Suboptimal => {
                log::warn!("swapchain present image index {} is not optimal", image_index);
            }
            GfxPresentResult::OutOfDate => {
                log::warn!("swapchain is out of date when present image");
            }
            GfxPresentResult::Presented => {}
        }
        Ok(result)
    }
}

/// 一个 surface 需要用到的全部 queue
#[derive(Debug, Clone, Copy)]
pub struct GfxSurfaceQueues {
    pub graphics: GfxGraphicsQueue,
    pub present: GfxPresentQueue,
    pub transfer: Option<GfxTransferQueue>,
    pub compute: Option<GfxComputeQueue>,
}
