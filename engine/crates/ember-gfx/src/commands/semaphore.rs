use std::rc::Rc;

use ash::vk;

use crate::{error::GfxResult, foundation::debug_messenger::DebugType, foundation::device::GfxDevice, vk_check};

/// GPU 队列之间的同步
///
/// 通过 [`GfxSemaphore::from_foreign_handle`] 包装的外部 semaphore 不会被销毁。
pub struct GfxSemaphore {
    device: Rc<GfxDevice>,
    handle: vk::Semaphore,
    timeline: bool,
    /// 是否由当前对象负责销毁
    managed: bool,
}

// 创建与销毁
impl GfxSemaphore {
    pub fn new(device: &Rc<GfxDevice>, debug_name: &str) -> GfxResult<Self> {
        let handle = vk_check!(unsafe { device.ash_device().create_semaphore(&vk::SemaphoreCreateInfo::default(), None) })?;

        let semaphore = Self {
            device: device.clone(),
            handle,
            timeline: false,
            managed: true,
        };
        device.set_debug_name(&semaphore, debug_name);
        Ok(semaphore)
    }

    pub fn new_timeline(device: &Rc<GfxDevice>, initial_value: u64, debug_name: &str) -> GfxResult<Self> {
        let mut timeline_type_ci = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let timeline_semaphore_ci = vk::SemaphoreCreateInfo::default().push_next(&mut timeline_type_ci);
        let handle = vk_check!(unsafe { device.ash_device().create_semaphore(&timeline_semaphore_ci, None) })?;

        let semaphore = Self {
            device: device.clone(),
            handle,
            timeline: true,
            managed: true,
        };
        device.set_debug_name(&semaphore, debug_name);
        Ok(semaphore)
    }

    /// 包装一个由外部创建的 semaphore，生命周期由外部负责
    pub fn from_foreign_handle(device: &Rc<GfxDevice>, handle: vk::Semaphore) -> Self {
        Self {
            device: device.clone(),
            handle,
            timeline: false,
            managed: false,
        }
    }
}

impl Drop for GfxSemaphore {
    fn drop(&mut self) {
        if self.managed {
            unsafe {
                self.device.destroy_semaphore(self.handle, None);
            }
        }
    }
}

// getters
impl GfxSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }

    #[inline]
    pub fn is_managed(&self) -> bool {
        self.managed
    }

    #[inline]
    pub fn is_timeline(&self) -> bool {
        self.timeline
    }
}

// tools
impl GfxSemaphore {
    pub fn wait_timeline(&self, timeline_value: u64, timeout_ns: u64) -> GfxResult<()> {
        debug_assert!(self.timeline);
        let wait_semaphore = [self.handle];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&wait_semaphore)
            .values(std::slice::from_ref(&timeline_value));
        vk_check!(unsafe { self.device.wait_semaphores(&wait_info, timeout_ns) })
    }

    /// 在 host 端 signal timeline semaphore
    pub fn signal_timeline(&self, timeline_value: u64) -> GfxResult<()> {
        debug_assert!(self.timeline);
        let signal_info = vk::SemaphoreSignalInfo::default().semaphore(self.handle).value(timeline_value);
        vk_check!(unsafe { self.device.signal_semaphore(&signal_info) })
    }

    pub fn timeline_value(&self) -> GfxResult<u64> {
        debug_assert!(self.timeline);
        vk_check!(unsafe { self.device.get_semaphore_counter_value(self.handle) })
    }
}

impl DebugType for GfxSemaphore {
    fn debug_type_name() -> &'static str {
        "GfxSemaphore"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}
