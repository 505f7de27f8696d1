use std::rc::Rc;

use ash::{prelude::VkResult, vk};

use crate::{error::GfxResult, foundation::debug_messenger::DebugType, foundation::device::GfxDevice, vk_check};

/// CPU 与 GPU 之间的同步
pub struct GfxFence {
    device: Rc<GfxDevice>,
    handle: vk::Fence,
}

impl DebugType for GfxFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(device: &Rc<GfxDevice>, signaled: bool, debug_name: &str) -> GfxResult<Self> {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let handle = vk_check!(unsafe { device.ash_device().create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None) })?;

        let fence = Self {
            device: device.clone(),
            handle,
        };
        device.set_debug_name(&fence, debug_name);
        Ok(fence)
    }
}

impl Drop for GfxFence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.handle, None);
        }
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }
}

/// 超时不算错误
#[inline]
fn wait_outcome(result: VkResult<()>) -> VkResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(vk::Result::TIMEOUT) => Ok(false),
        Err(e) => Err(e),
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence，超时返回 false
    pub fn wait(&self, timeout_ns: u64) -> GfxResult<bool> {
        vk_check!(wait_outcome(unsafe {
            self.device.wait_for_fences(std::slice::from_ref(&self.handle), true, timeout_ns)
        }))
    }

    #[inline]
    pub fn wait_forever(&self) -> GfxResult<()> {
        self.wait(u64::MAX).map(|_| ())
    }

    #[inline]
    pub fn reset(&self) -> GfxResult<()> {
        vk_check!(unsafe { self.device.reset_fences(std::slice::from_ref(&self.handle)) })
    }

    /// fence 是否已经 signaled，不会阻塞
    #[inline]
    pub fn status(&self) -> GfxResult<bool> {
        vk_check!(unsafe { self.device.get_fence_status(self.handle) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_outcome() {
        assert_eq!(wait_outcome(Ok(())), Ok(true));
        assert_eq!(wait_outcome(Err(vk::Result::TIMEOUT)), Ok(false));
        assert_eq!(wait_outcome(Err(vk::Result::ERROR_DEVICE_LOST)), Err(vk::Result::ERROR_DEVICE_LOST));
    }
}
