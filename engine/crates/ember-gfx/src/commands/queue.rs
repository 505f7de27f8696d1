use std::{ffi::CString, rc::Rc};

use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{command_buffer::GfxCommandBuffer, fence::GfxFence, semaphore::GfxSemaphore, submit_info::GfxSubmitInfo},
    error::{GfxError, GfxResult},
    foundation::{debug_messenger::DebugType, device::GfxDevice, queue_family::QueueRole},
    swapchain::swapchain::GfxSwapchain,
    vk_check,
};

/// 设备上的一个队列
///
/// 很轻量，可以随时从 [`GfxDevice::queue`] 获得。
pub struct GfxQueue {
    device: Rc<GfxDevice>,
    handle: vk::Queue,
    family_index: u32,
    role: QueueRole,
}

// new & init
impl GfxQueue {
    pub(crate) fn new(device: Rc<GfxDevice>, handle: vk::Queue, family_index: u32, role: QueueRole) -> Self {
        Self {
            device,
            handle,
            family_index,
            role,
        }
    }
}

// getters
impl GfxQueue {
    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    #[inline]
    pub fn role(&self) -> QueueRole {
        self.role
    }

    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        &self.device
    }
}

// submit
impl GfxQueue {
    /// 将多个 command buffer 合并为一次提交
    ///
    /// `waits` 中的每一项是 semaphore 以及在哪个 stage 等待；fence 在所有 command buffer 执行完后 signal
    pub fn submit(
        &self,
        command_buffers: &[&GfxCommandBuffer],
        waits: &[(&GfxSemaphore, vk::PipelineStageFlags)],
        signals: &[&GfxSemaphore],
        fence: Option<&GfxFence>,
    ) -> GfxResult<()> {
        let submit_info = waits
            .iter()
            .fold(GfxSubmitInfo::new(command_buffers), |info, (semaphore, stage)| info.wait(semaphore, *stage));
        let submit_info = signals.iter().fold(submit_info, |info, semaphore| info.signal(semaphore));

        command_buffers.iter().for_each(|cmd| cmd.assert_submittable());
        self.submit_batches(&[submit_info], fence)?;
        // 提交失败时 command buffer 保持 Executable
        command_buffers.iter().for_each(|cmd| cmd.mark_pending());
        Ok(())
    }

    /// 底层的多 batch 提交，调用方负责 command buffer 的状态
    pub fn submit_batches(&self, batches: &[GfxSubmitInfo], fence: Option<&GfxFence>) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxQueue::submit");
        let submit_infos = batches.iter().map(|b| b.submit_info()).collect_vec();
        vk_check!(unsafe {
            self.device.queue_submit(self.handle, &submit_infos, fence.map_or(vk::Fence::null(), |f| f.handle()))
        })
    }

    /// 提交并阻塞等待执行完成，只用于一次性的传输
    pub fn submit_and_wait_for_completion(
        &self,
        command_buffers: &[&GfxCommandBuffer],
        waits: &[(&GfxSemaphore, vk::PipelineStageFlags)],
        signals: &[&GfxSemaphore],
    ) -> GfxResult<()> {
        let fence = GfxFence::new(&self.device, false, "one-time-submit")?;
        self.submit(command_buffers, waits, signals, Some(&fence))?;
        fence.wait_forever()?;
        command_buffers.iter().for_each(|cmd| cmd.mark_completed());
        Ok(())
    }

    #[inline]
    pub fn wait_idle(&self) -> GfxResult<()> {
        vk_check!(unsafe { self.device.queue_wait_idle(self.handle) })
    }
}

// present
impl GfxQueue {
    /// 一次 present 多个 swapchain
    ///
    /// 任意一个 swapchain 的结果为错误（例如 out-of-date）时返回 `Ok(false)`，调用方需要重建 swapchain
    pub fn present(
        &self,
        wait_semaphores: &[&GfxSemaphore],
        swapchains: &[&GfxSwapchain],
        image_indices: &[u32],
    ) -> GfxResult<bool> {
        assert_eq!(swapchains.len(), image_indices.len());

        let wait_handles = wait_semaphores.iter().map(|s| s.handle()).collect_vec();
        let swapchain_handles = swapchains.iter().map(|s| s.handle()).collect_vec();
        let mut results = vec![vk::Result::SUCCESS; swapchains.len()];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_handles)
            .swapchains(&swapchain_handles)
            .image_indices(image_indices)
            .results(&mut results);

        let call_result = unsafe { self.device.swapchain_loader().queue_present(self.handle, &present_info) };
        match present_outcome(call_result, &results) {
            Ok(ok) => {
                if !ok {
                    log::warn!("present failed: {:?}, per swapchain: {:?}", call_result, results);
                }
                Ok(ok)
            }
            Err(e) => {
                log::error!("queue present failed with {:?}", e);
                Err(GfxError::vk(e, "vkQueuePresentKHR"))
            }
        }
    }
}

// debug label
impl GfxQueue {
    pub fn begin_label(&self, label_name: &str, label_color: glam::Vec4) {
        let Some(debug_utils) = self.device.debug_utils() else {
            return;
        };
        let Ok(name) = CString::new(label_name) else {
            return;
        };
        unsafe {
            debug_utils.queue_begin_debug_utils_label(
                self.handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color.into()),
            );
        }
    }

    pub fn end_label(&self) {
        if let Some(debug_utils) = self.device.debug_utils() {
            unsafe {
                debug_utils.queue_end_debug_utils_label(self.handle);
            }
        }
    }
}

impl DebugType for GfxQueue {
    fn debug_type_name() -> &'static str {
        "GfxQueue"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

/// 设备级别的错误需要向上传递，其它错误表示 swapchain 需要重建
fn present_outcome(call_result: Result<bool, vk::Result>, per_swapchain: &[vk::Result]) -> Result<bool, vk::Result> {
    const FATAL: [vk::Result; 3] =
        [vk::Result::ERROR_DEVICE_LOST, vk::Result::ERROR_OUT_OF_HOST_MEMORY, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY];

    if let Err(e) = call_result {
        if FATAL.contains(&e) {
            return Err(e);
        }
        return Ok(false);
    }
    Ok(per_swapchain.iter().all(|r| r.as_raw() >= 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_success_and_suboptimal() {
        assert_eq!(present_outcome(Ok(false), &[vk::Result::SUCCESS]), Ok(true));
        assert_eq!(present_outcome(Ok(true), &[vk::Result::SUBOPTIMAL_KHR]), Ok(true));
    }

    #[test]
    fn test_present_out_of_date_is_false() {
        assert_eq!(
            present_outcome(
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
                &[vk::Result::SUCCESS, vk::Result::ERROR_OUT_OF_DATE_KHR]
            ),
            Ok(false)
        );
    }

    #[test]
    fn test_present_any_negative_is_false() {
        assert_eq!(present_outcome(Ok(false), &[vk::Result::SUCCESS, vk::Result::ERROR_SURFACE_LOST_KHR]), Ok(false));
    }

    #[test]
    fn test_present_device_lost_propagates() {
        assert_eq!(
            present_outcome(Err(vk::Result::ERROR_DEVICE_LOST), &[vk::Result::ERROR_DEVICE_LOST]),
            Err(vk::Result::ERROR_DEVICE_LOST)
        );
    }
}
