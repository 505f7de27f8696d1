use std::rc::Rc;

use ash::vk;

use crate::{
    basic::format::infer_image_aspect,
    error::GfxResult,
    foundation::{debug_messenger::DebugType, device::GfxDevice},
    resources::image::{GfxImage, default_view_type},
    vk_check,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxImageViewDesc {
    /// format 可以基于 vk::Image 重解释
    pub(crate) format: vk::Format,
    /// view type 可以基于 vk::Image 重解释
    pub(crate) view_type: vk::ImageViewType,
    /// aspect 可以基于 vk::Image 重解释
    pub(crate) aspect_mask: vk::ImageAspectFlags,
    /// base mip level 和 mip level count
    pub(crate) mip: (u32, u32),
    /// base layer 和 layer count
    pub(crate) layer: (u32, u32),
}

impl GfxImageViewDesc {
    pub fn new_2d(format: vk::Format, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            format,
            view_type: vk::ImageViewType::TYPE_2D,
            aspect_mask: aspect,
            mip: (0, 1),
            layer: (0, 1),
        }
    }

    /// 创建完整的视图描述
    ///
    /// # 参数
    /// - `mip_range`: (base_mip_level, level_count)
    /// - `layer_range`: (base_array_layer, layer_count)
    pub fn new(
        format: vk::Format,
        view_type: vk::ImageViewType,
        aspect_mask: vk::ImageAspectFlags,
        mip_range: (u32, u32),
        layer_range: (u32, u32),
    ) -> Self {
        Self {
            format,
            view_type,
            aspect_mask,
            mip: mip_range,
            layer: layer_range,
        }
    }

    /// 覆盖整个 image 的 view，view type 和 aspect 由 image 的属性推导
    pub fn whole_image(
        image_type: vk::ImageType,
        format: vk::Format,
        mip_levels: u32,
        array_layers: u32,
        flags: vk::ImageCreateFlags,
    ) -> Self {
        Self {
            format,
            view_type: default_view_type(image_type, array_layers, flags),
            aspect_mask: infer_image_aspect(format),
            mip: (0, mip_levels),
            layer: (0, array_layers),
        }
    }

    #[inline]
    pub fn mip(mut self, base: u32, count: u32) -> Self {
        self.mip = (base, count);
        self
    }

    #[inline]
    pub fn layer(mut self, base: u32, count: u32) -> Self {
        self.layer = (base, count);
        self
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn view_type(&self) -> vk::ImageViewType {
        self.view_type
    }

    #[inline]
    pub fn aspect_mask(&self) -> vk::ImageAspectFlags {
        self.aspect_mask
    }

    /// (base, count)
    #[inline]
    pub fn mip_range(&self) -> (u32, u32) {
        self.mip
    }

    /// (base, count)
    #[inline]
    pub fn layer_range(&self) -> (u32, u32) {
        self.layer
    }

    #[inline]
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect_mask,
            base_mip_level: self.mip.0,
            level_count: self.mip.1,
            base_array_layer: self.layer.0,
            layer_count: self.layer.1,
        }
    }
}

/// view 持有 image 的引用计数，image 不会先于 view 销毁
pub struct GfxImageView {
    image: Rc<GfxImage>,
    handle: vk::ImageView,

    desc: GfxImageViewDesc,

    name: String,
}

impl DebugType for GfxImageView {
    fn debug_type_name() -> &'static str {
        "GfxImageView"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

// new & init
impl GfxImageView {
    pub fn new(image: Rc<GfxImage>, desc: GfxImageViewDesc, name: impl AsRef<str>) -> GfxResult<Self> {
        let device = image.device().clone();
        let handle = Self::create_raw(&device, image.handle(), &desc)?;
        let image_view = Self {
            image,
            handle,
            desc,
            name: name.as_ref().to_string(),
        };
        device.set_debug_name(&image_view, &name);
        Ok(image_view)
    }

    /// 只创建 vk::ImageView，生命周期由调用方负责
    pub(crate) fn create_raw(
        device: &GfxDevice,
        image: vk::Image,
        desc: &GfxImageViewDesc,
    ) -> GfxResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(desc.view_type)
            .format(desc.format)
            .subresource_range(desc.subresource_range());
        vk_check!(unsafe { device.create_image_view(&info, None) })
    }
}

impl Drop for GfxImageView {
    fn drop(&mut self) {
        unsafe {
            self.image.device().destroy_image_view(self.handle, None);
        }
    }
}

// getters
impl GfxImageView {
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }

    #[inline]
    pub fn desc(&self) -> &GfxImageViewDesc {
        &self.desc
    }

    #[inline]
    pub fn image(&self) -> &Rc<GfxImage> {
        &self.image
    }
}

impl std::fmt::Display for GfxImageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ImageView({}, {:?})", self.name, self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_image_desc() {
        let desc = GfxImageViewDesc::whole_image(
            vk::ImageType::TYPE_2D,
            vk::Format::D24_UNORM_S8_UINT,
            4,
            1,
            vk::ImageCreateFlags::empty(),
        );
        assert_eq!(desc.view_type(), vk::ImageViewType::TYPE_2D);
        assert_eq!(desc.aspect_mask(), vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
        assert_eq!(desc.mip_range(), (0, 4));

        let range = desc.mip(1, 2).layer(0, 1).subresource_range();
        assert_eq!((range.base_mip_level, range.level_count), (1, 2));
        assert_eq!(range.layer_count, 1);
    }
}
