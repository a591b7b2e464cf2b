use std::{sync::Arc, time::Duration};

use anyhow::Context;
use ash::vk;
use ember_gfx::{
    commands::{
        command_buffer::GfxCommandBuffer, command_queue::GfxSurfaceQueues, fence::duration_to_ns,
        semaphore::GfxSemaphore, submit_info::GfxSubmitInfo,
    },
    foundation::backend::GfxBackend,
    gfx_error::GfxError,
    swapchain::gfx_swapchain::{GfxAcquireResult, GfxPresentResult, GfxSwapchain},
};

use crate::{
    frame::{
        frame_resources::FrameResources,
        uniform_layouts::UniformLayouts,
        view_resources::{FrameCreateInfo, ViewResources},
    },
    render_key::RenderKey,
    resources::resources_collection::ResourcesCollection,
    settings::RendererSettings,
    view::render_view::ViewRenderingParameters,
};

/// [`FrameOrganizer::prepare_frame`] 成功之后可以录制的内容
pub struct PreparedFrame<'a> {
    pub frame_index: usize,
    pub image_index: u32,
    /// 这一帧提交时使用的 key
    pub render_key: RenderKey,
    /// 和传入的视图参数一一对应；传入的视图为空时，保留上一次的视图资源
    pub views: &'a mut [ViewResources],
    pub view_command_buffers: &'a [GfxCommandBuffer],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub render_key: RenderKey,
    pub present: GfxPresentResult,
}

/// 管理多个 frame slot，负责 CPU 和 GPU 之间的同步
///
/// 一帧的流程：
/// 1. [`Self::prepare_frame`]：等待 slot 的 fence，重置 slot 的资源，acquire swapchain image
/// 2. 调用方录制命令
/// 3. [`Self::submit`]：提交并 present，然后轮换到下一个 slot
///
/// 任何一步超时都会跳过这一帧，不会重置 GPU 可能还在使用的资源
pub struct FrameOrganizer {
    frames: Vec<FrameResources>,
    /// 每个 slot 已经 acquire 但还没有提交的 image
    ///
    /// 这时 slot 的 image-available semaphore 上还有一个未被等待的 signal，
    /// 下一次使用这个 slot 时直接沿用这张 image，不能再用同一个 semaphore acquire
    acquired_images: Vec<Option<u32>>,

    /// 每张 swapchain image 最后一次被哪个 slot 的 fence 保护
    image_fences: Vec<vk::Fence>,
    /// 每张 swapchain image 一个，提交完成后 signal，present 时等待
    render_finished_semaphores: Vec<GfxSemaphore>,

    current_frame_index: usize,
    current_image_index: u32,
    /// prepare 成功且还没有 submit
    prepared: bool,

    next_render_key: RenderKey,
    /// 已知已经完成的最大 key
    completed_render_key: RenderKey,
    /// 最近一次 prepare 时，被重置的 slot 上一次提交的 key
    last_retired_key: RenderKey,

    needs_recreate: bool,
    timeout: Duration,

    swapchain: GfxSwapchain,
    queues: GfxSurfaceQueues,
    backend: Arc<dyn GfxBackend>,
}

// new & init
impl FrameOrganizer {
    pub fn new(
        backend: Arc<dyn GfxBackend>,
        queues: GfxSurfaceQueues,
        swapchain: GfxSwapchain,
        layouts: &UniformLayouts,
        settings: &RendererSettings,
    ) -> anyhow::Result<Self> {
        let create_info = FrameCreateInfo {
            backend: backend.clone(),
            queue_family_index: queues.graphics.queue_family_index(),
            global_layout: layouts.global(),
            object_layout: layouts.object(),
        };

        let num_frames = settings.buffering.num_frames();
        let frames = (0..num_frames)
            .map(|i| FrameResources::new(&create_info, &format!("frame-{i}")))
            .collect::<Result<Vec<_>, _>>()
            .context("创建 frame slot 失败")?;

        let image_count = swapchain.image_count();
        let render_finished_semaphores = (0..image_count)
            .map(|i| GfxSemaphore::new(backend.clone(), &format!("render-finished-{i}")))
            .collect::<Result<Vec<_>, _>>()
            .context("创建 semaphore 失败")?;

        log::info!("FrameOrganizer created: {} frames, {} swapchain images", num_frames, image_count);

        Ok(Self {
            frames,
            acquired_images: vec![None; num_frames],
            image_fences: vec![vk::Fence::null(); image_count],
            render_finished_semaphores,
            current_frame_index: 0,
            current_image_index: 0,
            prepared: false,
            next_render_key: RenderKey::INITIAL,
            completed_render_key: RenderKey::INVALID,
            last_retired_key: RenderKey::INVALID,
            needs_recreate: false,
            timeout: settings.fence_timeout(),
            swapchain,
            queues,
            backend,
        })
    }
}

// getters
impl FrameOrganizer {
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn current_frame_index(&self) -> usize {
        self.current_frame_index
    }

    #[inline]
    pub fn current_image_index(&self) -> u32 {
        self.current_image_index
    }

    #[inline]
    pub fn frame(&self, index: usize) -> Option<&FrameResources> {
        self.frames.get(index)
    }

    #[inline]
    pub fn image_fences(&self) -> &[vk::Fence] {
        &self.image_fences
    }

    /// 这个 key 以及之前的渲染操作都已经完成
    #[inline]
    pub fn completed_render_key(&self) -> RenderKey {
        self.completed_render_key
    }

    /// 最近一次 prepare 收集到的资源最后被这个 key 使用
    #[inline]
    pub fn last_retired_key(&self) -> RenderKey {
        self.last_retired_key
    }

    #[inline]
    pub fn next_render_key(&self) -> RenderKey {
        self.next_render_key
    }

    /// acquire 或 present 报告 swapchain 需要重建
    #[inline]
    pub fn needs_recreate(&self) -> bool {
        self.needs_recreate
    }

    #[inline]
    pub fn swapchain(&self) -> &GfxSwapchain {
        &self.swapchain
    }

    /// slot 已经 acquire、还没有提交的 image
    #[inline]
    pub fn acquired_image(&self, frame_index: usize) -> Option<u32> {
        self.acquired_images.get(frame_index).copied().flatten()
    }
}

// tools
impl FrameOrganizer {
    /// 准备当前 slot
    ///
    /// 返回 `None` 表示这一帧需要跳过（fence 或 acquire 超时，或者 swapchain 已经过期），
    /// 此时不会重置任何资源。上一次使用这个 slot 时引用的资源会被移动到 `previous`。
    pub fn prepare_frame(
        &mut self,
        view_params: &[ViewRenderingParameters],
        previous: &mut ResourcesCollection,
    ) -> anyhow::Result<Option<PreparedFrame<'_>>> {
        let _span = tracy_client::span!("FrameOrganizer::prepare_frame");

        self.prepared = false;
        let frame_index = self.current_frame_index;
        let frame = &mut self.frames[frame_index];

        // 1. 等待这个 slot 上一次的提交完成
        let signaled = frame.fence().wait(self.timeout).context("等待 frame fence 失败")?;
        if !signaled {
            log::warn!("Timed out waiting for frame {} fence, skipping this frame", frame_index);
            return Ok(None);
        }
        let retired = frame.last_render_key();
        if retired > self.completed_render_key {
            self.completed_render_key = retired;
        }
        self.last_retired_key = retired;

        // 2. 重置 slot 内的资源，并和视图参数保持一致
        frame.prepare(view_params, previous).context("准备 frame 资源失败")?;

        // 3. acquire，上一次在这个 slot 上 acquire 的 image 没有提交时沿用它
        let acquired = match self.acquired_images[frame_index] {
            Some(image_index) => GfxAcquireResult::Acquired {
                image_index,
                suboptimal: false,
            },
            None => self
                .swapchain
                .acquire_next_image(self.backend.as_ref(), frame.image_available_semaphore(), self.timeout)
                .context("acquire swapchain image 失败")?,
        };
        let image_index = match acquired {
            GfxAcquireResult::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    self.needs_recreate = true;
                }
                image_index
            }
            GfxAcquireResult::Timeout => {
                log::warn!("Timed out waiting for next available swapchain image, skipping this frame");
                return Ok(None);
            }
            GfxAcquireResult::OutOfDate => {
                self.needs_recreate = true;
                return Ok(None);
            }
        };
        if image_index as usize >= self.image_fences.len() {
            return Err(GfxError::AcquireIndexOutOfRange {
                index: image_index,
                len: self.image_fences.len(),
            }
            .into());
        }
        self.acquired_images[frame_index] = Some(image_index);

        // 4. 这张 image 可能还在被另一个 slot 的提交使用
        let frame_fence = frame.fence().handle();
        let image_fence = self.image_fences[image_index as usize];
        if image_fence != vk::Fence::null() && image_fence != frame_fence {
            let signaled = self
                .backend
                .wait_for_fence(image_fence, duration_to_ns(self.timeout))
                .context("等待 image fence 失败")?;
            if !signaled {
                log::warn!("Timed out waiting for image {} fence, skipping this frame", image_index);
                return Ok(None);
            }
        }

        // 5. 这个 slot 的 fence 即将被重置，不再保护任何 image
        for fence in &mut self.image_fences {
            if *fence == frame_fence {
                *fence = vk::Fence::null();
            }
        }

        self.current_image_index = image_index;
        self.prepared = true;

        let (views, view_command_buffers) = frame.recording_parts();
        Ok(Some(PreparedFrame {
            frame_index,
            image_index,
            render_key: self.next_render_key,
            views,
            view_command_buffers,
        }))
    }
}

impl FrameOrganizer {
    /// 提交 prepare 之后录制好的命令，并 present 当前的 image
    ///
    /// 提交时 slot 的 fence 会被记录为当前 image 的 fence，之后轮换到下一个 slot
    pub fn submit(&mut self, command_buffers: &[GfxCommandBuffer]) -> anyhow::Result<SubmitOutcome> {
        let _span = tracy_client::span!("FrameOrganizer::submit");

        if !self.prepared {
            anyhow::bail!("submit is called without a prepared frame");
        }
        self.prepared = false;

        let frame_index = self.current_frame_index;
        let image_index = self.current_image_index;
        let frame = &mut self.frames[frame_index];

        for view in frame.views() {
            view.uniforms()
                .flush()
                .with_context(|| format!("flush uniforms of {} 失败", view.name()))?;
        }

        self.image_fences[image_index as usize] = frame.fence().handle();
        frame.fence().reset().context("重置 frame fence 失败")?;

        let render_finished = &self.render_finished_semaphores[image_index as usize];
        let submit_info = GfxSubmitInfo::new(command_buffers)
            .wait(frame.image_available_semaphore(), vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .signal(render_finished);
        self.queues
            .graphics
            .submit(self.backend.as_ref(), &submit_info, Some(frame.fence()))
            .context("提交 frame 失败")?;
        self.acquired_images[frame_index] = None;

        let render_key = self.next_render_key;
        frame.set_last_render_key(render_key);
        self.next_render_key.increment();
        self.current_frame_index = (frame_index + 1) % self.frames.len();

        let present = self
            .queues
            .present
            .present(self.backend.as_ref(), &self.swapchain, image_index, &[render_finished.handle()])
            .context("present 失败")?;
        if present.need_recreate() {
            self.needs_recreate = true;
        }

        Ok(SubmitOutcome { render_key, present })
    }

    /// 等待 GPU 完成所有已经提交的工作，之后所有 slot 的资源都可以安全释放
    pub fn wait_idle(&mut self) -> anyhow::Result<()> {
        self.backend.device_wait_idle().context("等待设备空闲失败")?;
        if let Some(last) = self.frames.iter().map(FrameResources::last_render_key).max() {
            self.completed_render_key = self.completed_render_key.max(last);
        }
        Ok(())
    }
}
