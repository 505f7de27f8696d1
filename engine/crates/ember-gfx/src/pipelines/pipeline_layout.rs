use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    descriptors::descriptor_set_layout::GfxDescriptorSetLayout,
    error::GfxResult,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    vk_check,
};

pub struct GfxPipelineLayout {
    device: Rc<GfxDevice>,
    handle: vk::PipelineLayout,

    /// set layout 需要活得比 pipeline layout 久
    set_layouts: Vec<Rc<GfxDescriptorSetLayout>>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl GfxPipelineLayout {
    pub fn new(
        device: &Rc<GfxDevice>,
        set_layouts: &[Rc<GfxDescriptorSetLayout>],
        push_constant_ranges: &[vk::PushConstantRange],
        debug_name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let set_layout_handles = set_layouts.iter().map(|l| l.handle()).collect_vec();
        let pipeline_layout_create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layout_handles)
            .push_constant_ranges(push_constant_ranges);
        let handle = vk_check!(unsafe { device.ash_device().create_pipeline_layout(&pipeline_layout_create_info, None) })?;

        let layout = Self {
            device: device.clone(),
            handle,
            set_layouts: set_layouts.to_vec(),
            push_constant_ranges: push_constant_ranges.to_vec(),
        };
        device.set_debug_name(&layout, debug_name);
        Ok(layout)
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    #[inline]
    pub fn set_layouts(&self) -> &[Rc<GfxDescriptorSetLayout>] {
        &self.set_layouts
    }

    #[inline]
    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.push_constant_ranges
    }
}

impl Drop for GfxPipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.handle, None);
        }
    }
}

impl DebugType for GfxPipelineLayout {
    fn debug_type_name() -> &'static str {
        "GfxPipelineLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}
