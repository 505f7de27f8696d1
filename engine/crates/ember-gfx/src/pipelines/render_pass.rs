use std::rc::Rc;

use ash::vk;

use crate::{
    error::GfxResult,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    vk_check,
};

pub struct GfxRenderPass {
    device: Rc<GfxDevice>,
    handle: vk::RenderPass,

    attachment_formats: Vec<vk::Format>,
    subpass_count: u32,
}

// new & init
impl GfxRenderPass {
    pub fn new(
        device: &Rc<GfxDevice>,
        attachments: &[vk::AttachmentDescription],
        subpasses: &[vk::SubpassDescription],
        dependencies: &[vk::SubpassDependency],
        debug_name: &str,
    ) -> GfxResult<Self> {
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(attachments)
            .subpasses(subpasses)
            .dependencies(dependencies);
        let handle = vk_check!(unsafe { device.ash_device().create_render_pass(&create_info, None) })?;

        let render_pass = Self {
            device: device.clone(),
            handle,
            attachment_formats: attachments.iter().map(|a| a.format).collect(),
            subpass_count: subpasses.len() as u32,
        };
        device.set_debug_name(&render_pass, debug_name);
        Ok(render_pass)
    }

    /// 一个 color attachment（用于 present）加一个 depth stencil attachment 的单 subpass render pass
    ///
    /// color: CLEAR / STORE，最终 layout 为 PRESENT_SRC；depth: CLEAR / DONT_CARE
    pub fn new_present(
        device: &Rc<GfxDevice>,
        color_format: vk::Format,
        depth_format: vk::Format,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let attachments = present_attachments(color_format, depth_format);
        let color_ref = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_ref)
            .depth_stencil_attachment(&depth_ref);

        Self::new(device, &attachments, std::slice::from_ref(&subpass), &present_dependencies(), debug_name)
    }
}

impl Drop for GfxRenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.handle, None);
        }
    }
}

// getters
impl GfxRenderPass {
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    #[inline]
    pub fn attachment_formats(&self) -> &[vk::Format] {
        &self.attachment_formats
    }

    #[inline]
    pub fn subpass_count(&self) -> u32 {
        self.subpass_count
    }
}

impl DebugType for GfxRenderPass {
    fn debug_type_name() -> &'static str {
        "GfxRenderPass"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

fn present_attachments(color_format: vk::Format, depth_format: vk::Format) -> [vk::AttachmentDescription; 2] {
    [
        vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: depth_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::CLEAR,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
    ]
}

/// 进入 subpass 之前等待上一帧对 attachment 的使用，离开之后让 attachment 的写入对后续可见
fn present_dependencies() -> [vk::SubpassDependency; 2] {
    let attachment_stages =
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let attachment_writes =
        vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    [
        vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: attachment_stages | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            dst_stage_mask: attachment_stages,
            src_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_access_mask: attachment_writes | vk::AccessFlags::COLOR_ATTACHMENT_READ,
            dependency_flags: vk::DependencyFlags::BY_REGION,
        },
        vk::SubpassDependency {
            src_subpass: 0,
            dst_subpass: vk::SUBPASS_EXTERNAL,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::MEMORY_READ,
            dependency_flags: vk::DependencyFlags::BY_REGION,
        },
    ]
}

/// color + depth stencil 两个 attachment 的 clear value，顺序与 [`GfxRenderPass::new_present`] 一致
pub fn present_clear_values(color: [f32; 4], depth: f32, stencil: u32) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_attachments() {
        let [color, depth] = present_attachments(vk::Format::B8G8R8A8_UNORM, vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(depth.format, vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(depth.final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_present_dependencies() {
        let [enter, leave] = present_dependencies();
        assert_eq!(enter.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(enter.dst_subpass, 0);
        assert!(enter.dst_stage_mask.contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        assert_eq!(leave.src_subpass, 0);
        assert_eq!(leave.dst_subpass, vk::SUBPASS_EXTERNAL);
    }

    #[test]
    fn test_present_clear_values() {
        let values = present_clear_values([0.1, 0.2, 0.3, 1.0], 1.0, 0);
        unsafe {
            assert_eq!(values[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
        }
    }
}
