use std::rc::Rc;

use ash::vk;

use crate::{
    commands::command_buffer::GfxCommandBuffer,
    error::GfxResult,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    vk_check,
};

/// command pool 是和 queue family 绑定的，而不是和 queue 绑定的
///
/// 由 [`GfxDevice::transient_command_pool`] 得到的 pool 只是借用设备持有的 handle，不负责销毁。
pub struct GfxCommandPool {
    device: Rc<GfxDevice>,
    handle: vk::CommandPool,
    queue_family_index: u32,
    flags: vk::CommandPoolCreateFlags,

    /// 是否由当前对象负责销毁
    owned: bool,
}

// init & destroy
impl GfxCommandPool {
    pub fn new(
        device: &Rc<GfxDevice>,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let pool_ci = vk::CommandPoolCreateInfo::default().queue_family_index(queue_family_index).flags(flags);
        let handle = vk_check!(unsafe { device.ash_device().create_command_pool(&pool_ci, None) })?;

        let command_pool = Self {
            device: device.clone(),
            handle,
            queue_family_index,
            flags,
            owned: true,
        };
        device.set_debug_name(&command_pool, debug_name);
        Ok(command_pool)
    }

    /// 包装设备持有的 pool，不负责销毁
    pub(crate) fn borrowed(
        device: Rc<GfxDevice>,
        handle: vk::CommandPool,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Self {
        Self {
            device,
            handle,
            queue_family_index,
            flags,
            owned: false,
        }
    }
}

impl Drop for GfxCommandPool {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                self.device.destroy_command_pool(self.handle, None);
            }
        }
    }
}

// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    #[inline]
    pub fn flags(&self) -> vk::CommandPoolCreateFlags {
        self.flags
    }
}

/// 一次分配多个时加上序号
#[inline]
fn command_buffer_name(debug_name: &str, count: u32, idx: usize) -> String {
    if count == 1 { debug_name.to_string() } else { format!("{}-{}", debug_name, idx) }
}

// tools
impl GfxCommandPool {
    pub fn allocate(self: &Rc<Self>, level: vk::CommandBufferLevel, debug_name: &str) -> GfxResult<GfxCommandBuffer> {
        let mut buffers = self.allocate_many(level, 1, debug_name)?;
        Ok(buffers.remove(0))
    }

    /// 一次性分配多个 command buffer，debug name 会加上序号
    pub fn allocate_many(
        self: &Rc<Self>,
        level: vk::CommandBufferLevel,
        count: u32,
        debug_name: &str,
    ) -> GfxResult<Vec<GfxCommandBuffer>> {
        let info =
            vk::CommandBufferAllocateInfo::default().command_pool(self.handle).level(level).command_buffer_count(count);
        let handles = vk_check!(unsafe { self.device.allocate_command_buffers(&info) })?;

        let buffers = handles
            .into_iter()
            .enumerate()
            .map(|(idx, handle)| {
                GfxCommandBuffer::from_handle(self.clone(), handle, level, command_buffer_name(debug_name, count, idx))
            })
            .collect();
        Ok(buffers)
    }

    /// 这个调用并不会释放 command buffer，而是将 pool 内的 command buffer 设置到初始状态
    ///
    /// reset 之后，pool 内的 command buffer 又可以重新录制命令。
    /// 调用方需要保证 pool 内没有正在执行的 command buffer。
    pub fn reset(&self, release_resources: bool) -> GfxResult<()> {
        let flags = if release_resources {
            vk::CommandPoolResetFlags::RELEASE_RESOURCES
        } else {
            vk::CommandPoolResetFlags::empty()
        };
        vk_check!(unsafe { self.device.reset_command_pool(self.handle, flags) })
    }
}

impl DebugType for GfxCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_buffer_name() {
        assert_eq!(command_buffer_name("upload", 1, 0), "upload");
        assert_eq!(command_buffer_name("window-frame", 3, 0), "window-frame-0");
        assert_eq!(command_buffer_name("window-frame", 3, 2), "window-frame-2");
    }
}
