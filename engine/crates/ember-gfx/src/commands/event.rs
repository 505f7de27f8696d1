use std::rc::Rc;

use ash::vk;

use crate::{error::GfxResult, foundation::debug_messenger::DebugType, foundation::device::GfxDevice, vk_check};

/// 细粒度的同步，可以在 host 或 command buffer 中 set/reset
pub struct GfxEvent {
    device: Rc<GfxDevice>,
    handle: vk::Event,
}

impl GfxEvent {
    pub fn new(device: &Rc<GfxDevice>, debug_name: &str) -> GfxResult<Self> {
        let handle = vk_check!(unsafe { device.ash_device().create_event(&vk::EventCreateInfo::default(), None) })?;
        let event = Self {
            device: device.clone(),
            handle,
        };
        device.set_debug_name(&event, debug_name);
        Ok(event)
    }

    #[inline]
    pub fn handle(&self) -> vk::Event {
        self.handle
    }

    pub fn set(&self) -> GfxResult<()> {
        vk_check!(unsafe { self.device.set_event(self.handle) })
    }

    pub fn reset(&self) -> GfxResult<()> {
        vk_check!(unsafe { self.device.reset_event(self.handle) })
    }

    /// true 表示 event 处于 set 状态
    pub fn status(&self) -> GfxResult<bool> {
        vk_check!(unsafe { self.device.get_event_status(self.handle) })
    }
}

impl Drop for GfxEvent {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_event(self.handle, None);
        }
    }
}

impl DebugType for GfxEvent {
    fn debug_type_name() -> &'static str {
        "GfxEvent"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}
