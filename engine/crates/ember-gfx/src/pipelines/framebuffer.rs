use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    error::GfxResult,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    pipelines::render_pass::GfxRenderPass,
    resources::image_view::GfxImageView,
    vk_check,
};

/// framebuffer 持有 attachment view 的引用计数
pub struct GfxFramebuffer {
    device: Rc<GfxDevice>,
    handle: vk::Framebuffer,

    extent: vk::Extent2D,
    _attachments: Vec<Rc<GfxImageView>>,
}

impl GfxFramebuffer {
    pub fn new(
        device: &Rc<GfxDevice>,
        render_pass: &GfxRenderPass,
        attachments: &[Rc<GfxImageView>],
        extent: vk::Extent2D,
        debug_name: &str,
    ) -> GfxResult<Self> {
        debug_assert_eq!(attachments.len(), render_pass.attachment_formats().len());
        let views = attachments.iter().map(|v| v.handle()).collect_vec();
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let handle = vk_check!(unsafe { device.ash_device().create_framebuffer(&create_info, None) })?;

        let framebuffer = Self {
            device: device.clone(),
            handle,
            extent,
            _attachments: attachments.to_vec(),
        };
        device.set_debug_name(&framebuffer, debug_name);
        Ok(framebuffer)
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// 覆盖整个 framebuffer 的 render area
    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.extent,
        }
    }
}

impl Drop for GfxFramebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.handle, None);
        }
    }
}

impl DebugType for GfxFramebuffer {
    fn debug_type_name() -> &'static str {
        "GfxFramebuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}
