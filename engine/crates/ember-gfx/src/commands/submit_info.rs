use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{command_buffer::GfxCommandBuffer, semaphore::GfxSemaphore},
    gfx_error::{GfxError, GfxResult},
};

/// 一次 queue submit 的内容
///
/// wait semaphore 和 wait stage 总是成对出现：
/// - 通过 builder（`wait`）添加时，配对由类型保证
/// - 通过 [`GfxSubmitInfo::from_spans`] 传入两个独立的 slice 时，会先检查长度
#[derive(Default, Clone, Debug)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBuffer>,
    wait_semaphores: Vec<vk::Semaphore>,
    wait_stages: Vec<vk::PipelineStageFlags>,
    signal_semaphores: Vec<vk::Semaphore>,
}

// new & init
impl GfxSubmitInfo {
    pub fn new(commands: &[GfxCommandBuffer]) -> Self {
        Self::from_handles(&commands.iter().map(|cmd| cmd.vk_handle()).collect_vec())
    }

    pub fn from_handles(commands: &[vk::CommandBuffer]) -> Self {
        Self {
            command_buffers: commands.to_vec(),
            ..Default::default()
        }
    }

    /// # 参数
    /// * `wait_semaphores` 和 `wait_stages` 的长度必须一致，否则返回 [`GfxError::InvalidArgument`]
    pub fn from_spans(
        wait_semaphores: &[vk::Semaphore],
        wait_stages: &[vk::PipelineStageFlags],
        commands: &[vk::CommandBuffer],
        signal_semaphores: &[vk::Semaphore],
    ) -> GfxResult<Self> {
        if wait_semaphores.len() != wait_stages.len() {
            return Err(GfxError::InvalidArgument(format!(
                "number of wait semaphores ({}) must equal number of wait stages ({})",
                wait_semaphores.len(),
                wait_stages.len()
            )));
        }

        Ok(Self {
            command_buffers: commands.to_vec(),
            wait_semaphores: wait_semaphores.to_vec(),
            wait_stages: wait_stages.to_vec(),
            signal_semaphores: signal_semaphores.to_vec(),
        })
    }
}

// builder
impl GfxSubmitInfo {
    #[inline]
    pub fn wait(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags) -> Self {
        self.wait_semaphores.push(semaphore.handle());
        self.wait_stages.push(stage);
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: &GfxSemaphore) -> Self {
        self.signal_semaphores.push(semaphore.handle());
        self
    }
}

// getters
impl GfxSubmitInfo {
    #[inline]
    pub fn command_buffers(&self) -> &[vk::CommandBuffer] {
        &self.command_buffers
    }

    #[inline]
    pub fn wait_semaphores(&self) -> &[vk::Semaphore] {
        &self.wait_semaphores
    }

    #[inline]
    pub fn wait_stages(&self) -> &[vk::PipelineStageFlags] {
        &self.wait_stages
    }

    #[inline]
    pub fn signal_semaphores(&self) -> &[vk::Semaphore] {
        &self.signal_semaphores
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_mismatched_wait_spans() {
        let semaphores = [vk::Semaphore::from_raw(1), vk::Semaphore::from_raw(2)];
        let stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

        let result = GfxSubmitInfo::from_spans(&semaphores, &stages, &[], &[]);
        assert!(matches!(result, Err(GfxError::InvalidArgument(_))));
    }

    #[test]
    fn test_matched_wait_spans() {
        let semaphores = [vk::Semaphore::from_raw(1)];
        let stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let commands = [vk::CommandBuffer::from_raw(7)];
        let signal = [vk::Semaphore::from_raw(3)];

        let info = GfxSubmitInfo::from_spans(&semaphores, &stages, &commands, &signal).unwrap();
        assert_eq!(info.wait_semaphores(), &semaphores);
        assert_eq!(info.wait_stages(), &stages);
        assert_eq!(info.command_buffers(), &commands);
        assert_eq!(info.signal_semaphores(), &signal);
    }
}
