use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    descriptors::{descriptor_pool::GfxDescriptorPool, descriptor_set_layout::GfxDescriptorSetLayout},
    foundation::debug_messenger::DebugType,
    resources::{buffer::GfxBuffer, sampler::GfxSampler},
};

/// 描述符更新信息
///
/// 用于更新描述符集的内容，可以是：
/// - 缓冲区描述符：用于统一缓冲区和存储缓冲区
/// - 图像描述符：用于纹理、storage image 和采样器
/// - texel buffer 描述符
#[derive(Clone, Debug)]
pub enum GfxDescriptorWrite {
    Buffer {
        binding: u32,
        array_element: u32,
        descriptor_type: vk::DescriptorType,
        infos: Vec<vk::DescriptorBufferInfo>,
    },
    Image {
        binding: u32,
        array_element: u32,
        descriptor_type: vk::DescriptorType,
        infos: Vec<vk::DescriptorImageInfo>,
    },
    TexelBuffer {
        binding: u32,
        array_element: u32,
        descriptor_type: vk::DescriptorType,
        views: Vec<vk::BufferView>,
    },
}

impl GfxDescriptorWrite {
    #[inline]
    pub fn buffer(binding: u32, descriptor_type: vk::DescriptorType, infos: Vec<vk::DescriptorBufferInfo>) -> Self {
        Self::Buffer {
            binding,
            array_element: 0,
            descriptor_type,
            infos,
        }
    }

    #[inline]
    pub fn image(binding: u32, descriptor_type: vk::DescriptorType, infos: Vec<vk::DescriptorImageInfo>) -> Self {
        Self::Image {
            binding,
            array_element: 0,
            descriptor_type,
            infos,
        }
    }

    #[inline]
    pub fn texel_buffer(binding: u32, descriptor_type: vk::DescriptorType, views: Vec<vk::BufferView>) -> Self {
        Self::TexelBuffer {
            binding,
            array_element: 0,
            descriptor_type,
            views,
        }
    }

    /// 整个 buffer 作为 uniform buffer
    pub fn uniform_buffer(binding: u32, buffer: &GfxBuffer) -> Self {
        Self::buffer(
            binding,
            vk::DescriptorType::UNIFORM_BUFFER,
            vec![vk::DescriptorBufferInfo {
                buffer: buffer.handle(),
                offset: 0,
                range: vk::WHOLE_SIZE,
            }],
        )
    }

    /// 整个 buffer 作为 storage buffer
    pub fn storage_buffer(binding: u32, buffer: &GfxBuffer) -> Self {
        Self::buffer(
            binding,
            vk::DescriptorType::STORAGE_BUFFER,
            vec![vk::DescriptorBufferInfo {
                buffer: buffer.handle(),
                offset: 0,
                range: vk::WHOLE_SIZE,
            }],
        )
    }

    /// image 需要处于 SHADER_READ_ONLY_OPTIMAL
    pub fn combined_image_sampler(binding: u32, image_view: vk::ImageView, sampler: &GfxSampler) -> Self {
        Self::image(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vec![vk::DescriptorImageInfo {
                sampler: sampler.handle(),
                image_view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }],
        )
    }

    /// image 需要处于 GENERAL
    pub fn storage_image(binding: u32, image_view: vk::ImageView) -> Self {
        Self::image(
            binding,
            vk::DescriptorType::STORAGE_IMAGE,
            vec![vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view,
                image_layout: vk::ImageLayout::GENERAL,
            }],
        )
    }

    #[inline]
    pub fn array_element(mut self, element: u32) -> Self {
        match &mut self {
            Self::Buffer { array_element, .. }
            | Self::Image { array_element, .. }
            | Self::TexelBuffer { array_element, .. } => *array_element = element,
        }
        self
    }

    #[inline]
    pub fn binding(&self) -> u32 {
        match self {
            Self::Buffer { binding, .. } | Self::Image { binding, .. } | Self::TexelBuffer { binding, .. } => *binding,
        }
    }

    /// 写入的 vk 结构体，引用 self 中的数组
    pub fn to_vk(&self, dst_set: vk::DescriptorSet) -> vk::WriteDescriptorSet<'_> {
        let write = vk::WriteDescriptorSet::default().dst_set(dst_set);
        match self {
            Self::Buffer {
                binding,
                array_element,
                descriptor_type,
                infos,
            } => write
                .dst_binding(*binding)
                .dst_array_element(*array_element)
                .descriptor_type(*descriptor_type)
                .buffer_info(infos),
            Self::Image {
                binding,
                array_element,
                descriptor_type,
                infos,
            } => write
                .dst_binding(*binding)
                .dst_array_element(*array_element)
                .descriptor_type(*descriptor_type)
                .image_info(infos),
            Self::TexelBuffer {
                binding,
                array_element,
                descriptor_type,
                views,
            } => write
                .dst_binding(*binding)
                .dst_array_element(*array_element)
                .descriptor_type(*descriptor_type)
                .texel_buffer_view(views),
        }
    }
}

/// 描述符集
///
/// 持有 pool 和 layout 的引用计数；Drop 时归还给 pool。
/// 调用方需要保证没有 pending 的 command buffer 还在使用这个描述符集。
pub struct GfxDescriptorSet {
    pool: Rc<GfxDescriptorPool>,
    layout: Rc<GfxDescriptorSetLayout>,
    handle: vk::DescriptorSet,
}

impl GfxDescriptorSet {
    pub(crate) fn from_handle(
        pool: Rc<GfxDescriptorPool>,
        layout: Rc<GfxDescriptorSetLayout>,
        handle: vk::DescriptorSet,
    ) -> Self {
        Self { pool, layout, handle }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    #[inline]
    pub fn layout(&self) -> &Rc<GfxDescriptorSetLayout> {
        &self.layout
    }

    /// 不能在 render pass 内部调用
    pub fn update(&self, writes: &[GfxDescriptorWrite]) {
        if cfg!(debug_assertions) {
            for write in writes {
                debug_assert!(
                    self.layout.descriptor_type(write.binding()).is_some(),
                    "binding {} does not exist in the layout",
                    write.binding()
                );
            }
        }
        let vk_writes = writes.iter().map(|w| w.to_vk(self.handle)).collect_vec();
        unsafe {
            self.pool.device().update_descriptor_sets(&vk_writes, &[]);
        }
    }

    /// 从 binding 0 开始依次写入 buffer
    pub fn update_buffers(&self, descriptor_type: vk::DescriptorType, buffers: &[&GfxBuffer]) {
        let writes = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| {
                GfxDescriptorWrite::buffer(
                    binding as u32,
                    descriptor_type,
                    vec![vk::DescriptorBufferInfo {
                        buffer: buffer.handle(),
                        offset: 0,
                        range: vk::WHOLE_SIZE,
                    }],
                )
            })
            .collect_vec();
        self.update(&writes);
    }

    /// 从 binding 0 开始依次写入 image
    pub fn update_images(&self, descriptor_type: vk::DescriptorType, images: &[vk::DescriptorImageInfo]) {
        let writes = images
            .iter()
            .enumerate()
            .map(|(binding, info)| GfxDescriptorWrite::image(binding as u32, descriptor_type, vec![*info]))
            .collect_vec();
        self.update(&writes);
    }
}

impl Drop for GfxDescriptorSet {
    fn drop(&mut self) {
        let result = unsafe { self.pool.device().free_descriptor_sets(self.pool.handle(), &[self.handle]) };
        if let Err(e) = result {
            log::error!("failed to free descriptor set: {:?}", e);
        }
    }
}

impl DebugType for GfxDescriptorSet {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSet"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_to_vk() {
        let infos = vec![
            vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: vk::ImageView::null(),
                image_layout: vk::ImageLayout::GENERAL,
            };
            3
        ];
        let write = GfxDescriptorWrite::image(2, vk::DescriptorType::STORAGE_IMAGE, infos).array_element(1);
        let vk_write = write.to_vk(vk::DescriptorSet::null());
        assert_eq!(vk_write.dst_binding, 2);
        assert_eq!(vk_write.dst_array_element, 1);
        assert_eq!(vk_write.descriptor_count, 3);
        assert_eq!(vk_write.descriptor_type, vk::DescriptorType::STORAGE_IMAGE);
        assert!(vk_write.p_buffer_info.is_null());
    }

    #[test]
    fn test_texel_write() {
        let write = GfxDescriptorWrite::texel_buffer(
            0,
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            vec![vk::BufferView::null(); 2],
        );
        assert_eq!(write.binding(), 0);
        let vk_write = write.to_vk(vk::DescriptorSet::null());
        assert_eq!(vk_write.descriptor_count, 2);
        assert!(!vk_write.p_texel_buffer_view.is_null());
    }
}
