use std::rc::Rc;

use ash::vk;

use crate::{
    error::GfxResult,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    vk_check,
};

/// 描述符集布局
///
/// 描述符集布局定义了描述符集的结构，包括：
/// - 绑定的数量
/// - 每个绑定的类型
/// - 每个绑定的着色器阶段
///
/// 布局需要由调用方手动给出，不会从 shader 反射得到。
pub struct GfxDescriptorSetLayout {
    device: Rc<GfxDevice>,
    handle: vk::DescriptorSetLayout,

    /// 创建时的绑定信息，用于校验写入
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl GfxDescriptorSetLayout {
    /// 创建新的描述符集布局
    ///
    /// # 参数
    /// - bindings: 每个 binding 的类型、数量与可见的 shader stage
    /// - flags: 创建标志，例如 PUSH_DESCRIPTOR_KHR
    pub fn new(
        device: &Rc<GfxDevice>,
        bindings: &[vk::DescriptorSetLayoutBinding<'static>],
        flags: vk::DescriptorSetLayoutCreateFlags,
        debug_name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().flags(flags).bindings(bindings);
        let handle = vk_check!(unsafe { device.ash_device().create_descriptor_set_layout(&create_info, None) })?;

        let layout = Self {
            device: device.clone(),
            handle,
            bindings: bindings.to_vec(),
        };
        device.set_debug_name(&layout, debug_name);
        Ok(layout)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    #[inline]
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }

    /// 指定 binding 的描述符类型，binding 不存在时返回 None
    pub fn descriptor_type(&self, binding: u32) -> Option<vk::DescriptorType> {
        self.bindings.iter().find(|b| b.binding == binding).map(|b| b.descriptor_type)
    }
}

impl Drop for GfxDescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.handle, None);
        }
    }
}

impl DebugType for GfxDescriptorSetLayout {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSetLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

/// 构造单个 binding 的便捷函数
#[inline]
pub fn layout_binding(
    binding: u32,
    descriptor_type: vk::DescriptorType,
    count: u32,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(descriptor_type)
        .descriptor_count(count)
        .stage_flags(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_binding() {
        let binding = layout_binding(3, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(binding.binding, 3);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(binding.descriptor_count, 2);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }
}
