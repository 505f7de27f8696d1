use ash::vk;
use itertools::Itertools;

use crate::commands::{command_buffer::GfxCommandBuffer, semaphore::GfxSemaphore};

/// 一次 submit 中的一个 batch
///
/// 持有 `vk::SubmitInfo` 所需的所有数组，通过 [`GfxSubmitInfo::submit_info`] 借出。
#[derive(Default)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBuffer>,
    wait_semaphores: Vec<vk::Semaphore>,
    wait_stages: Vec<vk::PipelineStageFlags>,
    signal_semaphores: Vec<vk::Semaphore>,
}

impl GfxSubmitInfo {
    pub fn new(commands: &[&GfxCommandBuffer]) -> Self {
        Self {
            command_buffers: commands.iter().map(|cmd| cmd.handle()).collect_vec(),
            ..Default::default()
        }
    }

    /// 在 `stage` 处等待 semaphore
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

    #[inline]
    pub fn submit_info(&self) -> vk::SubmitInfo<'_> {
        vk::SubmitInfo::default()
            .command_buffers(&self.command_buffers)
            .wait_semaphores(&self.wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .signal_semaphores(&self.signal_semaphores)
    }

    #[inline]
    pub fn wait_stages(&self) -> &[vk::PipelineStageFlags] {
        &self.wait_stages
    }

    #[inline]
    pub fn command_buffer_count(&self) -> usize {
        self.command_buffers.len()
    }

    #[inline]
    pub fn signal_count(&self) -> usize {
        self.signal_semaphores.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_submit_info() {
        let info = GfxSubmitInfo::new(&[]);
        let raw = info.submit_info();
        assert_eq!(raw.command_buffer_count, 0);
        assert_eq!(raw.wait_semaphore_count, 0);
        assert_eq!(raw.signal_semaphore_count, 0);
    }
}
