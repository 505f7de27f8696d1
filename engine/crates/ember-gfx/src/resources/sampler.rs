use std::rc::Rc;

use ash::vk;

use crate::{
    error::GfxResult,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    vk_check,
};

// Sampler descriptor
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GfxSamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    /// 0 表示关闭各向异性过滤
    pub max_anisotropy: u32,
    pub compare_op: Option<vk::CompareOp>,
    pub mipmap_mode: vk::SamplerMipmapMode,
}

impl Default for GfxSamplerDesc {
    fn default() -> Self {
        Self::linear_repeat()
    }
}

impl GfxSamplerDesc {
    pub fn linear_repeat() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: 0,
            compare_op: None,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        }
    }

    pub fn nearest_clamp() -> Self {
        Self {
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            ..Self::linear_repeat()
        }
    }

    pub fn create_info(&self) -> vk::SamplerCreateInfo<'static> {
        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(self.mag_filter)
            .min_filter(self.min_filter)
            .address_mode_u(self.address_mode_u)
            .address_mode_v(self.address_mode_v)
            .address_mode_w(self.address_mode_w)
            .mipmap_mode(self.mipmap_mode)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

        if self.max_anisotropy > 0 {
            create_info = create_info.anisotropy_enable(true).max_anisotropy(self.max_anisotropy as f32);
        } else {
            create_info = create_info.anisotropy_enable(false);
        }

        if let Some(compare_op) = self.compare_op {
            create_info = create_info.compare_enable(true).compare_op(compare_op);
        } else {
            create_info = create_info.compare_enable(false);
        }
        create_info
    }
}

pub struct GfxSampler {
    device: Rc<GfxDevice>,
    handle: vk::Sampler,
}

// new & init
impl GfxSampler {
    pub fn new(device: &Rc<GfxDevice>, create_info: &vk::SamplerCreateInfo, name: impl AsRef<str>) -> GfxResult<Self> {
        let handle = vk_check!(unsafe { device.ash_device().create_sampler(create_info, None) })?;
        let sampler = Self {
            device: device.clone(),
            handle,
        };
        device.set_debug_name(&sampler, name);
        Ok(sampler)
    }

    #[inline]
    pub fn from_desc(device: &Rc<GfxDevice>, desc: &GfxSamplerDesc, name: impl AsRef<str>) -> GfxResult<Self> {
        Self::new(device, &desc.create_info(), name)
    }
}

// getters
impl GfxSampler {
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}

impl Drop for GfxSampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.handle, None);
        }
    }
}

impl DebugType for GfxSampler {
    fn debug_type_name() -> &'static str {
        "GfxSampler"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_create_info() {
        let info = GfxSamplerDesc::linear_repeat().create_info();
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.anisotropy_enable, vk::FALSE);
        assert_eq!(info.compare_enable, vk::FALSE);

        let shadow = GfxSamplerDesc {
            compare_op: Some(vk::CompareOp::LESS_OR_EQUAL),
            max_anisotropy: 8,
            ..GfxSamplerDesc::nearest_clamp()
        }
        .create_info();
        assert_eq!(shadow.compare_enable, vk::TRUE);
        assert_eq!(shadow.compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(shadow.max_anisotropy, 8.0);
        assert_eq!(shadow.address_mode_w, vk::SamplerAddressMode::CLAMP_TO_EDGE);
    }
}
