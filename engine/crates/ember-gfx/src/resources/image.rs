use std::{path::Path, rc::Rc};

use ash::vk;
use itertools::Itertools;
use vk_mem::Alloc;

use crate::{
    basic::format::{format_size, infer_image_aspect},
    commands::{barrier::GfxImageBarrierRecipe, command_buffer::GfxCommandBuffer},
    error::{GfxError, GfxResult},
    foundation::{debug_messenger::DebugType, device::GfxDevice, queue_family::QueueRole},
    resources::{
        buffer::GfxBuffer,
        image_view::{GfxImageView, GfxImageViewDesc},
    },
    vk_check,
};

/// Image 来源枚举
pub enum ImageSource {
    /// 由 VMA 分配的 Image
    Allocated(vk_mem::Allocation),
    /// 外部 Image（例如 Swapchain Image），不管理其内存生命周期
    External,
}

/// 完整 mip chain 的层数：floor(log2(max(w, h, d))) + 1
#[inline]
pub fn max_mip_levels(width: u32, height: u32, depth: u32) -> u32 {
    let max = width.max(height).max(depth);
    if max == 0 { 1 } else { u32::BITS - max.leading_zeros() }
}

/// 根据 image type、layer 数量以及 cube flag 推导默认的 view type
pub fn default_view_type(
    image_type: vk::ImageType,
    array_layers: u32,
    flags: vk::ImageCreateFlags,
) -> vk::ImageViewType {
    match image_type {
        vk::ImageType::TYPE_1D if array_layers > 1 => vk::ImageViewType::TYPE_1D_ARRAY,
        vk::ImageType::TYPE_1D => vk::ImageViewType::TYPE_1D,
        vk::ImageType::TYPE_3D => vk::ImageViewType::TYPE_3D,
        _ => {
            let is_cube = flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE) && array_layers % 6 == 0;
            match (is_cube, array_layers) {
                (true, 6) => vk::ImageViewType::CUBE,
                (true, _) => vk::ImageViewType::CUBE_ARRAY,
                (false, 1) => vk::ImageViewType::TYPE_2D,
                (false, _) => vk::ImageViewType::TYPE_2D_ARRAY,
            }
        }
    }
}

/// 每个 mip 一个 copy region
///
/// `mip_offsets[i]` 是第 i 层 mip 数据在 buffer 中的起始位置，所有 layer 紧密排列
pub fn mip_copy_regions(
    extent: vk::Extent3D,
    aspect: vk::ImageAspectFlags,
    array_layers: u32,
    mip_offsets: &[vk::DeviceSize],
) -> Vec<vk::BufferImageCopy> {
    mip_offsets
        .iter()
        .enumerate()
        .map(|(mip, offset)| {
            let mip = mip as u32;
            vk::BufferImageCopy {
                buffer_offset: *offset,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: aspect,
                    mip_level: mip,
                    base_array_layer: 0,
                    layer_count: array_layers,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width: (extent.width >> mip).max(1),
                    height: (extent.height >> mip).max(1),
                    depth: (extent.depth >> mip).max(1),
                },
            }
        })
        .collect_vec()
}

/// 第 mip 层所有 layer 的字节数，格式大小未知时为 None
pub fn mip_byte_size(format: vk::Format, extent: vk::Extent3D, array_layers: u32, mip: u32) -> Option<vk::DeviceSize> {
    let texel = format_size(format)? as vk::DeviceSize;
    let dim = |d: u32| (d >> mip).max(1) as vk::DeviceSize;
    Some(texel * dim(extent.width) * dim(extent.height) * dim(extent.depth) * array_layers as vk::DeviceSize)
}

/// 检查 `data_len` 字节的数据能够覆盖 `mip_offsets` 描述的每一层 mip，然后生成 copy region
///
/// buffer 与 image 之间的拷贝每个 region 只能有一个 aspect，因此不支持 depth + stencil 的组合格式
pub fn mip_upload_regions(
    format: vk::Format,
    extent: vk::Extent3D,
    array_layers: u32,
    mip_levels: u32,
    data_len: usize,
    mip_offsets: &[vk::DeviceSize],
) -> GfxResult<Vec<vk::BufferImageCopy>> {
    if mip_offsets.is_empty() || mip_offsets.len() as u32 > mip_levels {
        return Err(GfxError::InvalidUsage(format!(
            "image has {} mips, got {} mip offsets",
            mip_levels,
            mip_offsets.len()
        )));
    }

    let aspect = infer_image_aspect(format);
    if aspect == vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL {
        return Err(GfxError::InvalidUsage(format!("can not upload combined depth stencil format {:?}", format)));
    }

    for (mip, offset) in mip_offsets.iter().enumerate() {
        let size = mip_byte_size(format, extent, array_layers, mip as u32)
            .ok_or_else(|| GfxError::InvalidUsage(format!("unknown texel size of format {:?}", format)))?;
        if !offset.checked_add(size).is_some_and(|end| end <= data_len as vk::DeviceSize) {
            return Err(GfxError::InvalidUsage(format!(
                "mip {} needs bytes [{}, {}), but only {} bytes are provided",
                mip,
                offset,
                offset.saturating_add(size),
                data_len
            )));
        }
    }

    Ok(mip_copy_regions(extent, aspect, array_layers, mip_offsets))
}

/// 从 `src_mip` 缩小一半 blit 到 `src_mip + 1`，只用于 2D color image 的第一个 layer
pub fn mip_blit(extent: vk::Extent2D, src_mip: u32) -> vk::ImageBlit {
    let corner = |mip: u32| vk::Offset3D {
        x: (extent.width >> mip).max(1) as i32,
        y: (extent.height >> mip).max(1) as i32,
        z: 1,
    };
    let layers = |mip: u32| vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: mip,
        base_array_layer: 0,
        layer_count: 1,
    };
    vk::ImageBlit {
        src_subresource: layers(src_mip),
        src_offsets: [vk::Offset3D::default(), corner(src_mip)],
        dst_subresource: layers(src_mip + 1),
        dst_offsets: [vk::Offset3D::default(), corner(src_mip + 1)],
    }
}

pub struct GfxImageCreateInfo {
    inner: vk::ImageCreateInfo<'static>,

    queue_family_indices: Vec<u32>,
}

impl GfxImageCreateInfo {
    #[inline]
    pub fn new_image_2d_info(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            inner: vk::ImageCreateInfo {
                image_type: vk::ImageType::TYPE_2D,
                format,
                extent: extent.into(),
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                // 这里只能是 UNDEFINED 或者 PREINITIALIZED
                initial_layout: vk::ImageLayout::UNDEFINED,
                ..Default::default()
            },
            queue_family_indices: Vec::new(),
        }
    }

    /// 用于采样的 2D 纹理，可以作为 blit 的源和目标（生成 mipmap）
    #[inline]
    pub fn texture_2d(extent: vk::Extent2D, format: vk::Format, mip_levels: u32) -> Self {
        Self::new_image_2d_info(
            extent,
            format,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
        )
        .mip_levels(mip_levels)
    }

    #[inline]
    pub fn depth_stencil(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self::new_image_2d_info(
            extent,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
        )
    }

    /// 6 个 layer 的 cube map
    #[inline]
    pub fn cube(size: u32, format: vk::Format, mip_levels: u32) -> Self {
        Self::texture_2d(vk::Extent2D { width: size, height: size }, format, mip_levels)
            .array_layers(6)
            .flags(vk::ImageCreateFlags::CUBE_COMPATIBLE)
    }

    #[inline]
    pub fn as_info(&self) -> vk::ImageCreateInfo<'_> {
        self.inner.queue_family_indices(&self.queue_family_indices)
    }

    #[inline]
    pub fn inner(&self) -> &vk::ImageCreateInfo<'static> {
        &self.inner
    }

    // builder
    #[inline]
    pub fn image_type(mut self, image_type: vk::ImageType) -> Self {
        self.inner.image_type = image_type;
        self
    }

    #[inline]
    pub fn extent(mut self, extent: vk::Extent3D) -> Self {
        self.inner.extent = extent;
        self
    }

    #[inline]
    pub fn mip_levels(mut self, mip_levels: u32) -> Self {
        self.inner.mip_levels = mip_levels;
        self
    }

    #[inline]
    pub fn array_layers(mut self, array_layers: u32) -> Self {
        self.inner.array_layers = array_layers;
        self
    }

    #[inline]
    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.inner.samples = samples;
        self
    }

    #[inline]
    pub fn tiling(mut self, tiling: vk::ImageTiling) -> Self {
        self.inner.tiling = tiling;
        self
    }

    #[inline]
    pub fn flags(mut self, flags: vk::ImageCreateFlags) -> Self {
        self.inner.flags |= flags;
        self
    }

    #[inline]
    pub fn queue_family_indices(mut self, queue_family_indices: &[u32]) -> Self {
        self.inner.sharing_mode = vk::SharingMode::CONCURRENT;
        self.queue_family_indices = queue_family_indices.into();
        self
    }
}

pub struct GfxImage {
    device: Rc<GfxDevice>,

    handle: vk::Image,
    source: ImageSource,

    image_type: vk::ImageType,
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
    samples: vk::SampleCountFlags,
    tiling: vk::ImageTiling,
    usage: vk::ImageUsageFlags,
    flags: vk::ImageCreateFlags,
    memory_flags: vk::MemoryPropertyFlags,

    /// 覆盖整个 image 的 view，随 image 一起销毁
    default_view: vk::ImageView,

    name: String,
}

impl DebugType for GfxImage {
    fn debug_type_name() -> &'static str {
        "GfxImage"
    }

    fn vk_handle(&self) -> impl vk::Handle + Copy {
        self.handle
    }
}

// new & init
impl GfxImage {
    pub fn new(
        device: &Rc<GfxDevice>,
        image_info: &GfxImageCreateInfo,
        alloc_info: &vk_mem::AllocationCreateInfo,
        debug_name: &str,
    ) -> GfxResult<Rc<Self>> {
        let _span = tracy_client::span!("GfxImage::new");
        let allocator = device.allocator();
        let (handle, mut allocation) = vk_check!(unsafe { allocator.create_image(&image_info.as_info(), alloc_info) })?;
        let memory_flags = device.memory_type_flags(allocator.get_allocation_info(&allocation).memory_type);

        let info = image_info.inner();
        let view_desc = GfxImageViewDesc::whole_image(info.image_type, info.format, info.mip_levels, info.array_layers, info.flags);
        let default_view = match GfxImageView::create_raw(device, handle, &view_desc) {
            Ok(view) => view,
            Err(e) => {
                unsafe { allocator.destroy_image(handle, &mut allocation) };
                return Err(e);
            }
        };

        let image = Self {
            device: device.clone(),
            handle,
            source: ImageSource::Allocated(allocation),
            image_type: info.image_type,
            format: info.format,
            extent: info.extent,
            mip_levels: info.mip_levels,
            array_layers: info.array_layers,
            samples: info.samples,
            tiling: info.tiling,
            usage: info.usage,
            flags: info.flags,
            memory_flags,
            default_view,
            name: debug_name.to_string(),
        };
        device.set_debug_name(&image, debug_name);
        device.set_object_debug_name(default_view, format!("GfxImageView::{}-default", debug_name));
        Ok(Rc::new(image))
    }

    /// 优先使用 device local 的内存
    #[inline]
    pub fn new_device_local(
        device: &Rc<GfxDevice>,
        image_info: &GfxImageCreateInfo,
        debug_name: &str,
    ) -> GfxResult<Rc<Self>> {
        Self::new(
            device,
            image_info,
            &vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            debug_name,
        )
    }

    /// 包装外部创建的 image（例如 swapchain image），不负责释放 image 本身
    pub fn from_external(
        device: &Rc<GfxDevice>,
        handle: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        debug_name: &str,
    ) -> GfxResult<Rc<Self>> {
        let view_desc =
            GfxImageViewDesc::whole_image(vk::ImageType::TYPE_2D, format, 1, 1, vk::ImageCreateFlags::empty());
        let default_view = GfxImageView::create_raw(device, handle, &view_desc)?;

        let image = Self {
            device: device.clone(),
            handle,
            source: ImageSource::External,
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: extent.into(),
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            flags: vk::ImageCreateFlags::empty(),
            memory_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            default_view,
            name: debug_name.to_string(),
        };
        device.set_debug_name(&image, debug_name);
        device.set_object_debug_name(default_view, format!("GfxImageView::{}-default", debug_name));
        Ok(Rc::new(image))
    }

    /// 根据 RGBA8_UNORM 的 data 创建只有一层 mip 的纹理
    pub fn from_rgba8(
        device: &Rc<GfxDevice>,
        width: u32,
        height: u32,
        data: &[u8],
        debug_name: &str,
    ) -> GfxResult<Rc<Self>> {
        let image_info = GfxImageCreateInfo::texture_2d(vk::Extent2D { width, height }, vk::Format::R8G8B8A8_UNORM, 1);
        let image = Self::new_device_local(device, &image_info, debug_name)?;
        image.write_2d(data, &[0])?;
        Ok(image)
    }

    /// 从图片文件创建 RGBA8_UNORM 的纹理，`generate_mips` 时通过逐层 blit 生成完整的 mip chain
    pub fn from_file(device: &Rc<GfxDevice>, path: &Path, generate_mips: bool) -> GfxResult<Rc<Self>> {
        let _span = tracy_client::span!("GfxImage::from_file");
        let pixels = image::ImageReader::open(path)?.decode()?.to_rgba8();
        let (width, height) = pixels.dimensions();
        let name = path.to_string_lossy();
        log::info!("load image {}: {}x{}, generate mips: {}", name, width, height, generate_mips);

        if !generate_mips {
            return Self::from_rgba8(device, width, height, pixels.as_raw(), &name);
        }

        let format = vk::Format::R8G8B8A8_UNORM;
        let blit_features = vk::FormatFeatureFlags::BLIT_SRC
            | vk::FormatFeatureFlags::BLIT_DST
            | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR;
        if device.physical_device().find_format(&[format], vk::ImageTiling::OPTIMAL, blit_features)
            == vk::Format::UNDEFINED
        {
            return Err(GfxError::NoSuitableFormat("linear blit for mip generation"));
        }

        let image_info =
            GfxImageCreateInfo::texture_2d(vk::Extent2D { width, height }, format, max_mip_levels(width, height, 1));
        let image = Self::new_device_local(device, &image_info, &name)?;
        image.write_2d_generate_mips(pixels.as_raw())?;
        Ok(image)
    }
}

impl Drop for GfxImage {
    fn drop(&mut self) {
        log::debug!("destroying image: {}", self.name);
        unsafe {
            self.device.destroy_image_view(self.default_view, None);
            match &mut self.source {
                ImageSource::External => (),
                ImageSource::Allocated(allocation) => self.device.allocator().destroy_image(self.handle, allocation),
            }
        }
    }
}

// getters
impl GfxImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn image_type(&self) -> vk::ImageType {
        self.image_type
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    #[inline]
    pub fn tiling(&self) -> vk::ImageTiling {
        self.tiling
    }

    #[inline]
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }

    #[inline]
    pub fn memory_flags(&self) -> vk::MemoryPropertyFlags {
        self.memory_flags
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        matches!(self.source, ImageSource::External)
    }

    #[inline]
    pub fn default_view(&self) -> vk::ImageView {
        self.default_view
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 所有 mip 和 layer，aspect 由格式推导
    #[inline]
    pub fn full_subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: infer_image_aspect(self.format),
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }

    /// 第一个 layer 上的 [base_mip, base_mip + mip_count)
    #[inline]
    pub fn mip_range(&self, base_mip: u32, mip_count: u32) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            base_mip_level: base_mip,
            level_count: mip_count,
            layer_count: 1,
            ..self.full_subresource_range()
        }
    }

    #[inline]
    pub fn default_view_type(&self) -> vk::ImageViewType {
        default_view_type(self.image_type, self.array_layers, self.flags)
    }
}

// views
impl GfxImage {
    pub fn create_image_view(self: &Rc<Self>, desc: GfxImageViewDesc, debug_name: &str) -> GfxResult<Rc<GfxImageView>> {
        GfxImageView::new(self.clone(), desc, debug_name).map(Rc::new)
    }

    /// 2D view，覆盖第一个 layer 的 [base_mip, base_mip + mip_count)
    pub fn create_image_view_2d(
        self: &Rc<Self>,
        base_mip: u32,
        mip_count: u32,
        debug_name: &str,
    ) -> GfxResult<Rc<GfxImageView>> {
        let desc = GfxImageViewDesc::new_2d(self.format, infer_image_aspect(self.format)).mip(base_mip, mip_count);
        self.create_image_view(desc, debug_name)
    }
}

// tools
impl GfxImage {
    /// 将 buffer 的数据拷贝到 image，并转换为 shader 可读的 layout
    ///
    /// 拷贝之前 image 的内容会被丢弃（UNDEFINED -> TRANSFER_DST）
    pub fn copy_from_buffer(&self, cmd: &GfxCommandBuffer, buffer: &GfxBuffer, regions: &[vk::BufferImageCopy]) {
        cmd.transit_layout_by_recipe(self, GfxImageBarrierRecipe::UNDEFINED_TO_TRANSFER_DST, None);
        cmd.copy_buffer_to_image(buffer, self, vk::ImageLayout::TRANSFER_DST_OPTIMAL, regions);
        cmd.transit_layout_by_recipe(self, GfxImageBarrierRecipe::TRANSFER_DST_TO_SHADER_READ, None);
    }

    /// 同步上传 2D image 的 mip chain，会阻塞
    ///
    /// `mip_offsets[i]` 是第 i 层 mip 在 data 中的起始位置
    pub fn write_2d(&self, data: &[u8], mip_offsets: &[vk::DeviceSize]) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxImage::write_2d");
        let regions =
            mip_upload_regions(self.format, self.extent, self.array_layers, self.mip_levels, data.len(), mip_offsets)?;

        let stage_buffer = GfxBuffer::new_staging_buffer(
            &self.device,
            data.len() as vk::DeviceSize,
            format!("{}-stage-buffer", self.name),
        )?;
        stage_buffer.write(data, 0)?;

        self.device.one_time_exec(
            QueueRole::Universal,
            |cmd| self.copy_from_buffer(cmd, &stage_buffer, &regions),
            &format!("{}-upload", self.name),
        )
    }

    /// 上传第 0 层 mip，其余的 mip 由上一层 blit 得到，会阻塞
    ///
    /// 结束后所有 mip 都处于 SHADER_READ_ONLY_OPTIMAL
    fn write_2d_generate_mips(&self, data: &[u8]) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxImage::write_2d_generate_mips");
        let regions = mip_upload_regions(self.format, self.extent, 1, self.mip_levels, data.len(), &[0])?;

        let stage_buffer = GfxBuffer::new_staging_buffer(
            &self.device,
            data.len() as vk::DeviceSize,
            format!("{}-stage-buffer", self.name),
        )?;
        stage_buffer.write(data, 0)?;

        let extent = self.extent_2d();
        let last_mip = self.mip_levels - 1;
        self.device.one_time_exec(
            QueueRole::Universal,
            |cmd| {
                cmd.transit_layout_by_recipe(self, GfxImageBarrierRecipe::UNDEFINED_TO_TRANSFER_DST, None);
                cmd.copy_buffer_to_image(&stage_buffer, self, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &regions);

                for mip in 1..self.mip_levels {
                    cmd.transit_layout_by_recipe(
                        self,
                        GfxImageBarrierRecipe::TRANSFER_DST_TO_TRANSFER_SRC,
                        Some(self.mip_range(mip - 1, 1)),
                    );
                    cmd.blit_image(
                        self,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        self,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[mip_blit(extent, mip - 1)],
                        vk::Filter::LINEAR,
                    );
                }

                // 最后一层只被写入过，仍然是 TRANSFER_DST
                if last_mip > 0 {
                    cmd.transit_layout_by_recipe(
                        self,
                        GfxImageBarrierRecipe::TRANSFER_SRC_TO_SHADER_READ,
                        Some(self.mip_range(0, last_mip)),
                    );
                }
                cmd.transit_layout_by_recipe(
                    self,
                    GfxImageBarrierRecipe::TRANSFER_DST_TO_SHADER_READ,
                    Some(self.mip_range(last_mip, 1)),
                );
            },
            &format!("{}-upload-mips", self.name),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_mip_levels() {
        assert_eq!(max_mip_levels(1, 1, 1), 1);
        assert_eq!(max_mip_levels(2, 1, 1), 2);
        assert_eq!(max_mip_levels(1024, 512, 1), 11);
        assert_eq!(max_mip_levels(1000, 1, 1), 10);
        assert_eq!(max_mip_levels(1, 1, 300), 9);
    }

    #[test]
    fn test_default_view_type() {
        let none = vk::ImageCreateFlags::empty();
        let cube = vk::ImageCreateFlags::CUBE_COMPATIBLE;
        assert_eq!(default_view_type(vk::ImageType::TYPE_1D, 1, none), vk::ImageViewType::TYPE_1D);
        assert_eq!(default_view_type(vk::ImageType::TYPE_1D, 4, none), vk::ImageViewType::TYPE_1D_ARRAY);
        assert_eq!(default_view_type(vk::ImageType::TYPE_2D, 1, none), vk::ImageViewType::TYPE_2D);
        assert_eq!(default_view_type(vk::ImageType::TYPE_2D, 6, none), vk::ImageViewType::TYPE_2D_ARRAY);
        assert_eq!(default_view_type(vk::ImageType::TYPE_2D, 6, cube), vk::ImageViewType::CUBE);
        assert_eq!(default_view_type(vk::ImageType::TYPE_2D, 12, cube), vk::ImageViewType::CUBE_ARRAY);
        assert_eq!(default_view_type(vk::ImageType::TYPE_3D, 1, none), vk::ImageViewType::TYPE_3D);
    }

    #[test]
    fn test_mip_copy_regions() {
        let extent = vk::Extent3D {
            width: 8,
            height: 2,
            depth: 1,
        };
        let regions = mip_copy_regions(extent, vk::ImageAspectFlags::COLOR, 1, &[0, 64, 80, 84]);
        assert_eq!(regions.len(), 4);
        assert_eq!(regions[1].buffer_offset, 64);
        assert_eq!(regions[1].image_subresource.mip_level, 1);
        assert_eq!((regions[1].image_extent.width, regions[1].image_extent.height), (4, 1));
        assert_eq!((regions[3].image_extent.width, regions[3].image_extent.height), (1, 1));
        assert!(regions.iter().all(|r| r.image_extent.depth == 1));
    }

    #[test]
    fn test_mip_byte_size() {
        let extent = vk::Extent3D {
            width: 8,
            height: 2,
            depth: 1,
        };
        assert_eq!(mip_byte_size(vk::Format::R8G8B8A8_UNORM, extent, 1, 0), Some(64));
        assert_eq!(mip_byte_size(vk::Format::R8G8B8A8_UNORM, extent, 1, 1), Some(16));
        assert_eq!(mip_byte_size(vk::Format::R8G8B8A8_UNORM, extent, 1, 3), Some(4));
        assert_eq!(mip_byte_size(vk::Format::R32_SFLOAT, extent, 6, 0), Some(384));
        assert_eq!(mip_byte_size(vk::Format::BC7_UNORM_BLOCK, extent, 1, 0), None);
    }

    #[test]
    fn test_mip_upload_regions_checks_data_size() {
        let extent = vk::Extent3D {
            width: 8,
            height: 2,
            depth: 1,
        };
        let rgba = vk::Format::R8G8B8A8_UNORM;
        let offsets = [0, 64, 80, 88];

        let regions = mip_upload_regions(rgba, extent, 1, 4, 92, &offsets).unwrap();
        assert_eq!(regions.len(), 4);
        assert_eq!(regions[2].buffer_offset, 80);
        assert_eq!(regions[0].image_subresource.aspect_mask, vk::ImageAspectFlags::COLOR);

        // 最后一层 mip 少了一个字节
        assert!(matches!(mip_upload_regions(rgba, extent, 1, 4, 91, &offsets), Err(GfxError::InvalidUsage(_))));
        // 单层 mip 的数据不完整
        assert!(mip_upload_regions(rgba, extent, 1, 1, 63, &[0]).is_err());
        assert!(mip_upload_regions(rgba, extent, 1, 1, 64, &[u64::MAX]).is_err());
    }

    #[test]
    fn test_mip_upload_regions_rejects_bad_layouts() {
        let extent = vk::Extent3D {
            width: 4,
            height: 4,
            depth: 1,
        };
        let rgba = vk::Format::R8G8B8A8_UNORM;
        assert!(mip_upload_regions(rgba, extent, 1, 1, 64, &[]).is_err());
        assert!(mip_upload_regions(rgba, extent, 1, 1, 1024, &[0, 64]).is_err());
        assert!(mip_upload_regions(vk::Format::D24_UNORM_S8_UINT, extent, 1, 1, 1024, &[0]).is_err());
        assert!(mip_upload_regions(vk::Format::BC7_UNORM_BLOCK, extent, 1, 1, 1024, &[0]).is_err());

        let depth = mip_upload_regions(vk::Format::D32_SFLOAT, extent, 1, 1, 64, &[0]).unwrap();
        assert_eq!(depth[0].image_subresource.aspect_mask, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn test_mip_blit() {
        let extent = vk::Extent2D { width: 16, height: 4 };
        let first = mip_blit(extent, 0);
        assert_eq!(first.src_subresource.mip_level, 0);
        assert_eq!(first.dst_subresource.mip_level, 1);
        assert_eq!((first.src_offsets[1].x, first.src_offsets[1].y, first.src_offsets[1].z), (16, 4, 1));
        assert_eq!((first.dst_offsets[1].x, first.dst_offsets[1].y), (8, 2));

        // 高度先缩小到 1，之后保持为 1
        let tail = mip_blit(extent, 3);
        assert_eq!((tail.src_offsets[1].x, tail.src_offsets[1].y), (2, 1));
        assert_eq!((tail.dst_offsets[1].x, tail.dst_offsets[1].y), (1, 1));
        assert_eq!(max_mip_levels(extent.width, extent.height, 1), 5);
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let err = image::ImageReader::open(Path::new("definitely/missing/texture.png"))
            .map_err(GfxError::from)
            .err();
        assert!(matches!(err, Some(GfxError::Io(_))));
    }

    #[test]
    fn test_image_create_info_presets() {
        let extent = vk::Extent2D { width: 256, height: 128 };
        let texture = GfxImageCreateInfo::texture_2d(extent, vk::Format::R8G8B8A8_UNORM, 9);
        assert_eq!(texture.inner().mip_levels, 9);
        assert!(texture.inner().usage.contains(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST));
        assert_eq!(texture.inner().initial_layout, vk::ImageLayout::UNDEFINED);

        let depth = GfxImageCreateInfo::depth_stencil(extent, vk::Format::D32_SFLOAT_S8_UINT);
        assert!(depth.inner().usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));

        let cube = GfxImageCreateInfo::cube(64, vk::Format::R16G16B16A16_SFLOAT, 1);
        assert_eq!(cube.inner().array_layers, 6);
        assert!(cube.inner().flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));

        let shared = GfxImageCreateInfo::new_image_2d_info(extent, vk::Format::R8_UNORM, vk::ImageUsageFlags::STORAGE)
            .queue_family_indices(&[0, 2]);
        assert_eq!(shared.as_info().sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(shared.as_info().queue_family_index_count, 2);
    }
}
