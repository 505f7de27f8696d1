use std::rc::Rc;

use ash::vk;

use crate::{
    error::GfxResult,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    resources::buffer::GfxBuffer,
    vk_check,
};

/// texel buffer 上的一段 view
pub struct GfxBufferView {
    buffer: Rc<GfxBuffer>,
    handle: vk::BufferView,

    format: vk::Format,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
}

// init & destroy
impl GfxBufferView {
    /// range 为 `vk::WHOLE_SIZE` 时覆盖 offset 之后的全部内容
    pub fn new(
        buffer: Rc<GfxBuffer>,
        format: vk::Format,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
        debug_name: &str,
    ) -> GfxResult<Self> {
        debug_assert!(
            buffer
                .usage()
                .intersects(vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER | vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER),
            "buffer {} is not a texel buffer",
            buffer.name()
        );
        assert!(range == vk::WHOLE_SIZE || offset + range <= buffer.size());

        let device: &Rc<GfxDevice> = buffer.device();
        let info = vk::BufferViewCreateInfo::default().buffer(buffer.handle()).format(format).offset(offset).range(range);
        let handle = vk_check!(unsafe { device.ash_device().create_buffer_view(&info, None) })?;

        let view = Self {
            buffer,
            handle,
            format,
            offset,
            range,
        };
        view.buffer.device().set_debug_name(&view, debug_name);
        Ok(view)
    }
}

impl Drop for GfxBufferView {
    fn drop(&mut self) {
        unsafe {
            self.buffer.device().destroy_buffer_view(self.handle, None);
        }
    }
}

// getters
impl GfxBufferView {
    #[inline]
    pub fn handle(&self) -> vk::BufferView {
        self.handle
    }

    #[inline]
    pub fn buffer(&self) -> &Rc<GfxBuffer> {
        &self.buffer
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    #[inline]
    pub fn range(&self) -> vk::DeviceSize {
        self.range
    }
}

impl DebugType for GfxBufferView {
    fn debug_type_name() -> &'static str {
        "GfxBufferView"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}
